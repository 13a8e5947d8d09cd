//! Read access by table

use crate::builder::{build_find_by_id, build_select_all, Key};
use crate::entity::Entity;
use crate::scan::{self, FieldsIndex};
use crate::schema::{schema_of, Schema};
use crate::session::SessionProvider;
use crate::statement::Statement;
use crate::{FieldMap, MapperResult};
use std::sync::Arc;
use tracing::debug;

/// Conversion hooks between the stored form of a model and the form the
/// application works with
pub trait Mapper<T>: Send + Sync {
    /// Applied to a copy of the model before it is written
    fn model_to_db(&self, model: &mut T) -> MapperResult<()>;

    /// Applied to every model after it is read
    fn db_to_model(&self, model: &mut T) -> MapperResult<()>;

    /// Applied to patch maps before the statement is built
    fn patch_to_db(&self, _patch: &mut FieldMap) -> MapperResult<()> {
        Ok(())
    }
}

/// Loads records of `T` from one table
pub struct Loader<T: Entity> {
    provider: Arc<dyn SessionProvider>,
    table: String,
    schema: Arc<Schema>,
    fields_index: FieldsIndex,
    query: String,
    mapper: Option<Arc<dyn Mapper<T>>>,
}

impl<T: Entity> Loader<T> {
    pub fn new(provider: Arc<dyn SessionProvider>, table: &str) -> MapperResult<Self> {
        let schema = schema_of::<T>()?;
        let query = build_select_all(table, &schema);
        Ok(Self {
            provider,
            table: table.to_string(),
            fields_index: schema.fields_index(),
            schema,
            query,
            mapper: None,
        })
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper<T>>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn provider(&self) -> &Arc<dyn SessionProvider> {
        &self.provider
    }

    pub(crate) fn mapper(&self) -> Option<&Arc<dyn Mapper<T>>> {
        self.mapper.as_ref()
    }

    /// Key column names
    pub fn keys(&self) -> Vec<&str> {
        self.schema.key_columns()
    }

    pub fn all(&self) -> MapperResult<Vec<T>> {
        let models = scan::query(
            self.provider.as_ref(),
            &Statement::text(self.query.as_str()),
            Some(&self.fields_index),
        )?;
        self.map_models(models)
    }

    pub fn load(&self, key: &Key) -> MapperResult<Option<T>> {
        let statement = build_find_by_id(&self.query, &self.schema, key)?;
        debug!(table = %self.table, query = %statement.query, "Loading by key");
        let models: Vec<T> =
            scan::query(self.provider.as_ref(), &statement, Some(&self.fields_index))?;
        models
            .into_iter()
            .next()
            .map(|model| self.map_model(model))
            .transpose()
    }

    pub fn exists(&self, key: &Key) -> MapperResult<bool> {
        let prefix = format!("select {} from {}", self.keys().join(","), self.table);
        let statement = build_find_by_id(&prefix, &self.schema, key)?;
        let found = scan::query_map(
            self.provider.as_ref(),
            &statement,
            &scan::MapScan::default(),
        )?;
        Ok(!found.is_empty())
    }

    fn map_model(&self, mut model: T) -> MapperResult<T> {
        if let Some(mapper) = &self.mapper {
            mapper.db_to_model(&mut model)?;
        }
        Ok(model)
    }

    pub(crate) fn map_models(&self, models: Vec<T>) -> MapperResult<Vec<T>> {
        models.into_iter().map(|m| self.map_model(m)).collect()
    }
}

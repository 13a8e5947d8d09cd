//! Filtered, paged search

use crate::config::PagingConfig;
use crate::cursor::{paged_scan, Page};
use crate::entity::Entity;
use crate::loader::Mapper;
use crate::scan::FieldsIndex;
use crate::schema::{schema_of, Schema};
use crate::session::SessionProvider;
use crate::statement::Statement;
use crate::MapperResult;
use std::sync::Arc;
use tracing::debug;

pub use crate::builder::build_sort;

type QueryFn<F> = Box<dyn Fn(&F) -> MapperResult<Statement> + Send + Sync>;

/// Pages through the rows a filter selects.
///
/// The query function turns a caller filter into a statement; the builder
/// adds the page size and cursor.
pub struct SearchBuilder<T: Entity, F> {
    provider: Arc<dyn SessionProvider>,
    schema: Arc<Schema>,
    fields_index: FieldsIndex,
    query: QueryFn<F>,
    paging: PagingConfig,
    mapper: Option<Arc<dyn Mapper<T>>>,
}

impl<T: Entity, F> SearchBuilder<T, F> {
    pub fn new<Q>(provider: Arc<dyn SessionProvider>, query: Q) -> MapperResult<Self>
    where
        Q: Fn(&F) -> MapperResult<Statement> + Send + Sync + 'static,
    {
        let schema = schema_of::<T>()?;
        Ok(Self {
            provider,
            fields_index: schema.fields_index(),
            schema,
            query: Box::new(query),
            paging: PagingConfig::default(),
            mapper: None,
        })
    }

    pub fn with_paging(mut self, paging: PagingConfig) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper<T>>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// One page of matches. `page_size` 0 uses the configured default;
    /// larger than the configured maximum is clamped.
    pub fn search(&self, filter: &F, page_size: u32, cursor: &str) -> MapperResult<Page<T>> {
        let statement = (self.query)(filter)?;
        let page_size = self.paging.effective_page_size(page_size);
        debug!(query = %statement.query, page_size, "Searching");

        let mut page: Page<T> = paged_scan(
            self.provider.as_ref(),
            &statement,
            Some(&self.fields_index),
            page_size,
            cursor,
        )?;
        if let Some(mapper) = &self.mapper {
            for item in &mut page.items {
                mapper.db_to_model(item)?;
            }
        }
        Ok(page)
    }
}

/// Append the order clause for `sort` (e.g. `"-name,id"`) to `statement`
pub fn sorted(mut statement: Statement, sort: &str, schema: &Schema) -> Statement {
    statement.query.push_str(&build_sort(sort, schema));
    statement
}

//! Streaming export of query results

use crate::entity::Entity;
use crate::scan::{FieldsIndex, ScanIter};
use crate::schema::{schema_of, Schema};
use crate::session::{SessionGuard, SessionProvider};
use crate::statement::Statement;
use crate::MapperResult;
use std::io::Write;
use std::sync::Arc;
use tracing::info;

type Transform<T> = Box<dyn Fn(&T) -> MapperResult<String> + Send + Sync>;

/// Writes one line per result row, produced by a transform, without
/// collecting the result set
pub struct Exporter<T: Entity, W: Write> {
    provider: Arc<dyn SessionProvider>,
    statement: Statement,
    fields_index: FieldsIndex,
    transform: Transform<T>,
    out: W,
}

impl<T: Entity, W: Write> Exporter<T, W> {
    pub fn new<F>(
        provider: Arc<dyn SessionProvider>,
        statement: Statement,
        out: W,
        transform: F,
    ) -> MapperResult<Self>
    where
        F: Fn(&T) -> MapperResult<String> + Send + Sync + 'static,
    {
        Ok(Self {
            provider,
            statement,
            fields_index: schema_of::<T>()?.fields_index(),
            transform: Box::new(transform),
            out,
        })
    }

    /// Exporter writing each row as a JSON object keyed by wire names
    pub fn json_lines(provider: Arc<dyn SessionProvider>, statement: Statement, out: W) -> MapperResult<Self> {
        let schema = schema_of::<T>()?;
        Self::new(provider, statement, out, move |model| to_json_line(&schema, model))
    }

    /// Run the statement and write every row; returns the row count
    pub fn export(&mut self) -> MapperResult<u64> {
        let mut session = SessionGuard::acquire(self.provider.as_ref())?;
        let mut rows = session.query(&self.statement.query, &self.statement.params, None)?;

        let mut count = 0u64;
        for model in ScanIter::<T>::new(rows.as_mut(), Some(&self.fields_index)) {
            let line = (self.transform)(&model?)?;
            writeln!(self.out, "{line}")?;
            count += 1;
        }
        self.out.flush()?;

        info!(query = %self.statement.query, rows = count, "Export finished");
        Ok(count)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Render `model` as a single-line JSON object keyed by wire names
pub fn to_json_line<T: Entity>(schema: &Schema, model: &T) -> MapperResult<String> {
    let mut object = serde_json::Map::new();
    for field in schema.fields() {
        object.insert(field.json.clone(), model.get(field.index).to_json()?);
    }
    Ok(serde_json::Value::Object(object).to_string())
}

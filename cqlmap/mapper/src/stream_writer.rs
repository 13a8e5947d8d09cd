//! Buffered multi-row saves

use crate::builder::build_to_save_batch;
use crate::config::BatchConfig;
use crate::entity::Entity;
use crate::loader::Mapper;
use crate::schema::{schema_of, Schema};
use crate::session::{self, SessionProvider};
use crate::{MapperError, MapperResult};
use std::sync::Arc;
use tracing::debug;

/// Buffers models and writes them as one multi-row save when the buffer
/// reaches `batch_size`.
///
/// A failed flush keeps the buffer intact so the caller can retry. Nothing
/// is flushed on drop; call [`StreamWriter::flush`] or
/// [`StreamWriter::finish`] when done.
pub struct StreamWriter<T: Entity> {
    provider: Arc<dyn SessionProvider>,
    table: String,
    schema: Arc<Schema>,
    batch_size: usize,
    buffer: Vec<T>,
    mapper: Option<Arc<dyn Mapper<T>>>,
}

impl<T: Entity> StreamWriter<T> {
    pub fn new(provider: Arc<dyn SessionProvider>, table: &str, batch_size: usize) -> MapperResult<Self> {
        if batch_size == 0 {
            return Err(MapperError::Configuration(
                "stream writer batch size must be positive".to_string(),
            ));
        }
        Ok(Self {
            provider,
            table: table.to_string(),
            schema: schema_of::<T>()?,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            mapper: None,
        })
    }

    /// Writer flushing every `config.batch_size` records
    pub fn from_config(provider: Arc<dyn SessionProvider>, table: &str, config: &BatchConfig) -> MapperResult<Self> {
        Self::new(provider, table, config.batch_size)
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper<T>>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Models waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer `model`, flushing when the batch is full. Returns rows
    /// affected by the flush, 0 when none happened.
    pub fn write(&mut self, mut model: T) -> MapperResult<u64> {
        if let Some(mapper) = &self.mapper {
            mapper.model_to_db(&mut model)?;
        }
        self.buffer.push(model);
        if self.buffer.len() >= self.batch_size {
            return self.flush();
        }
        Ok(0)
    }

    pub fn flush(&mut self) -> MapperResult<u64> {
        let Some(statement) = build_to_save_batch(&self.table, &self.schema, &self.buffer) else {
            return Ok(0);
        };
        let affected = session::execute(self.provider.as_ref(), &statement)?;
        debug!(table = %self.table, rows = self.buffer.len(), "Flushed stream buffer");
        self.buffer.clear();
        Ok(affected)
    }

    /// Flush whatever is left
    pub fn finish(mut self) -> MapperResult<u64> {
        self.flush()
    }
}

//! Bulk writes with per-index outcome tracking
//!
//! Each input model is mapped and built independently; a model whose mapping
//! or statement build fails is recorded as failed and left out of the
//! dispatch. The remaining statements are dispatched either as one batch
//! (every built index shares its outcome) or one by one on a single session.

use crate::builder::{build_to_insert, build_to_save, build_to_save_batch, build_to_update};
use crate::config::BatchConfig;
use crate::entity::Entity;
use crate::loader::Mapper;
use crate::schema::{schema_of, Schema};
use crate::session::{SessionGuard, SessionProvider};
use crate::statement::Statement;
use crate::{BatchDispatch, MapperError, MapperResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Statement kind built for every model of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    Insert,
    Update,
    /// Upsert; combined dispatch uses one multi-row statement
    Save,
}

/// Result of a batch in which every index succeeded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: Vec<usize>,
    pub affected: u64,
}

#[derive(Default)]
struct Tally {
    succeeded: Vec<usize>,
    failed: Vec<usize>,
    cause: Option<MapperError>,
    affected: u64,
}

impl Tally {
    fn fail(&mut self, index: usize, err: MapperError) {
        warn!(index, error = %err, "Batch item failed");
        self.failed.push(index);
        self.cause.get_or_insert(err);
    }

    fn fail_all(&mut self, indices: impl IntoIterator<Item = usize>, err: MapperError) {
        warn!(error = %err, "Batch dispatch failed");
        self.failed.extend(indices);
        self.cause.get_or_insert(err);
    }

    fn finish(mut self) -> MapperResult<BatchOutcome> {
        self.succeeded.sort_unstable();
        match self.cause {
            None => Ok(BatchOutcome {
                succeeded: self.succeeded,
                affected: self.affected,
            }),
            Some(cause) => {
                self.failed.sort_unstable();
                Err(MapperError::PartialBatchFailure {
                    succeeded: self.succeeded,
                    failed: self.failed,
                    cause: Box::new(cause),
                })
            }
        }
    }
}

pub struct BatchWriter<T: Entity> {
    provider: Arc<dyn SessionProvider>,
    table: String,
    schema: Arc<Schema>,
    version: Option<usize>,
    dispatch: BatchDispatch,
    mapper: Option<Arc<dyn Mapper<T>>>,
}

impl<T: Entity + Clone> BatchWriter<T> {
    pub fn new(provider: Arc<dyn SessionProvider>, table: &str) -> MapperResult<Self> {
        let schema = schema_of::<T>()?;
        Ok(Self {
            provider,
            table: table.to_string(),
            version: schema.version_index(),
            schema,
            dispatch: BatchDispatch::default(),
            mapper: None,
        })
    }

    /// Apply the dispatch mode; `batch_size` only drives [`crate::StreamWriter`]
    pub fn with_config(mut self, config: &BatchConfig) -> Self {
        self.dispatch = config.dispatch;
        self
    }

    pub fn with_dispatch(mut self, dispatch: BatchDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper<T>>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Ignore the schema's version field
    pub fn unversioned(mut self) -> Self {
        self.version = None;
        self
    }

    pub fn insert(&self, models: &[T]) -> MapperResult<BatchOutcome> {
        self.write(BatchMode::Insert, models)
    }

    pub fn update(&self, models: &[T]) -> MapperResult<BatchOutcome> {
        self.write(BatchMode::Update, models)
    }

    pub fn save(&self, models: &[T]) -> MapperResult<BatchOutcome> {
        self.write(BatchMode::Save, models)
    }

    /// Write `models`; any failed index turns the result into
    /// [`MapperError::PartialBatchFailure`] carrying the first error
    pub fn write(&self, mode: BatchMode, models: &[T]) -> MapperResult<BatchOutcome> {
        let mut tally = Tally::default();
        let mut prepared = Vec::with_capacity(models.len());

        for (index, model) in models.iter().enumerate() {
            match self.to_db(model) {
                Ok(model) => prepared.push((index, model)),
                Err(err) => tally.fail(index, err),
            }
        }

        if !prepared.is_empty() {
            match self.dispatch {
                BatchDispatch::Combined => self.dispatch_combined(mode, &prepared, &mut tally),
                BatchDispatch::Individual => self.dispatch_individual(mode, &prepared, &mut tally),
            }
        }

        debug!(
            table = %self.table,
            ?mode,
            succeeded = tally.succeeded.len(),
            failed = tally.failed.len(),
            "Batch finished"
        );
        tally.finish()
    }

    fn to_db(&self, model: &T) -> MapperResult<T> {
        let mut model = model.clone();
        if let Some(mapper) = &self.mapper {
            mapper.model_to_db(&mut model)?;
        }
        Ok(model)
    }

    fn build(&self, mode: BatchMode, model: &T) -> MapperResult<Statement> {
        match mode {
            BatchMode::Insert => Ok(build_to_insert(&self.table, &self.schema, model, self.version, false)),
            BatchMode::Update => build_to_update(&self.table, &self.schema, model, self.version),
            BatchMode::Save => Ok(build_to_save(&self.table, &self.schema, model, None)),
        }
    }

    fn dispatch_combined(&self, mode: BatchMode, prepared: &[(usize, T)], tally: &mut Tally) {
        let built: Vec<usize>;
        let statements: Vec<Statement>;

        if mode == BatchMode::Save {
            let models: Vec<T> = prepared.iter().map(|(_, m)| m.clone()).collect();
            built = prepared.iter().map(|(i, _)| *i).collect();
            statements = build_to_save_batch(&self.table, &self.schema, &models)
                .into_iter()
                .collect();
        } else {
            let mut indices = Vec::with_capacity(prepared.len());
            let mut stmts = Vec::with_capacity(prepared.len());
            for (index, model) in prepared {
                match self.build(mode, model) {
                    Ok(statement) => {
                        indices.push(*index);
                        stmts.push(statement);
                    }
                    Err(err) => tally.fail(*index, err),
                }
            }
            built = indices;
            statements = stmts;
        }

        if statements.is_empty() {
            return;
        }

        let result = SessionGuard::acquire(self.provider.as_ref()).and_then(|mut session| {
            if let [statement] = statements.as_slice() {
                session.execute(&statement.query, &statement.params)
            } else {
                session.execute_batch(&statements)
            }
        });

        match result {
            Ok(affected) => {
                tally.affected += affected;
                tally.succeeded.extend(built);
            }
            Err(err) => tally.fail_all(built, err),
        }
    }

    fn dispatch_individual(&self, mode: BatchMode, prepared: &[(usize, T)], tally: &mut Tally) {
        let mut built = Vec::with_capacity(prepared.len());
        for (index, model) in prepared {
            match self.build(mode, model) {
                Ok(statement) => built.push((*index, statement)),
                Err(err) => tally.fail(*index, err),
            }
        }
        if built.is_empty() {
            return;
        }

        let mut session = match SessionGuard::acquire(self.provider.as_ref()) {
            Ok(session) => session,
            Err(err) => {
                tally.fail_all(built.into_iter().map(|(i, _)| i), err);
                return;
            }
        };

        for (index, statement) in built {
            match session.execute(&statement.query, &statement.params) {
                Ok(affected) => {
                    tally.affected += affected;
                    tally.succeeded.push(index);
                }
                Err(err) => tally.fail(index, err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::FieldMap;

    crate::entity! {
        #[derive(Debug, Clone, Default, PartialEq)]
        struct Item {
            sku: String => "primary_key",
            qty: i32,
        }
    }

    struct RejectNegative;

    impl Mapper<Item> for RejectNegative {
        fn model_to_db(&self, model: &mut Item) -> MapperResult<()> {
            if model.qty < 0 {
                return Err(MapperError::conversion("negative quantity").in_field("qty"));
            }
            Ok(())
        }

        fn db_to_model(&self, _model: &mut Item) -> MapperResult<()> {
            Ok(())
        }

        fn patch_to_db(&self, _patch: &mut FieldMap) -> MapperResult<()> {
            Ok(())
        }
    }

    fn item(sku: &str, qty: i32) -> Item {
        Item {
            sku: sku.into(),
            qty,
        }
    }

    fn setup() -> (MemoryStore, Arc<dyn SessionProvider>) {
        let store = MemoryStore::new();
        store.create_table("items", &["sku"]);
        let provider: Arc<dyn SessionProvider> = Arc::new(store.clone());
        (store, provider)
    }

    #[test]
    fn test_empty_batch_acquires_nothing() {
        let (store, provider) = setup();
        let writer = BatchWriter::<Item>::new(provider, "items").unwrap();
        assert_eq!(writer.insert(&[]).unwrap(), BatchOutcome::default());
        assert_eq!(store.acquired(), 0);
    }

    #[test]
    fn test_combined_insert() {
        let (store, provider) = setup();
        let writer = BatchWriter::<Item>::new(provider, "items").unwrap();
        let outcome = writer.insert(&[item("a", 1), item("b", 2), item("c", 3)]).unwrap();
        assert_eq!(outcome.succeeded, vec![0, 1, 2]);
        assert_eq!(outcome.affected, 3);
        assert_eq!(store.row_count("items"), 3);
        assert_eq!(store.open_sessions(), 0);
    }

    #[test]
    fn test_mapper_failure_excludes_index() {
        let (store, provider) = setup();
        let writer = BatchWriter::<Item>::new(provider, "items")
            .unwrap()
            .with_mapper(Arc::new(RejectNegative));

        let err = writer.save(&[item("a", 1), item("b", -1), item("c", 3)]).unwrap_err();
        match err {
            MapperError::PartialBatchFailure {
                succeeded,
                failed,
                cause,
            } => {
                assert_eq!(succeeded, vec![0, 2]);
                assert_eq!(failed, vec![1]);
                assert!(matches!(*cause, MapperError::Conversion { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.row_count("items"), 2);
    }

    #[test]
    fn test_combined_failure_fails_every_built_index() {
        let (store, provider) = setup();
        store.fail_on("insert into items");
        let writer = BatchWriter::<Item>::new(provider, "items")
            .unwrap()
            .with_mapper(Arc::new(RejectNegative));

        let err = writer.insert(&[item("a", 1), item("b", -1), item("c", 3)]).unwrap_err();
        assert_eq!(err.failed_indices(), &[0, 1, 2]);
        assert_eq!(store.row_count("items"), 0);
        assert_eq!(store.open_sessions(), 0);
    }

    #[test]
    fn test_individual_dispatch_isolates_failures() {
        let (store, provider) = setup();
        store.fail_on("values(?,2)");
        let writer = BatchWriter::<Item>::new(provider, "items")
            .unwrap()
            .with_dispatch(BatchDispatch::Individual);

        let err = writer.insert(&[item("a", 1), item("b", 2), item("c", 3)]).unwrap_err();
        match err {
            MapperError::PartialBatchFailure {
                succeeded, failed, ..
            } => {
                assert_eq!(succeeded, vec![0, 2]);
                assert_eq!(failed, vec![1]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.row_count("items"), 2);
        assert_eq!(store.acquired(), 1);
    }

    #[test]
    fn test_acquire_failure_fails_all() {
        let (store, provider) = setup();
        store.fail_acquire(true);
        let writer = BatchWriter::<Item>::new(provider, "items")
            .unwrap()
            .with_dispatch(BatchDispatch::Individual);
        let err = writer.update(&[item("a", 1), item("b", 2)]).unwrap_err();
        assert_eq!(err.failed_indices(), &[0, 1]);
    }
}

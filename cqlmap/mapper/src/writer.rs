//! Write access by table, with optional optimistic versioning

use crate::builder::{
    build_to_delete, build_to_insert, build_to_patch, build_to_save, build_to_update, Key,
};
use crate::entity::Entity;
use crate::loader::{Loader, Mapper};
use crate::session::{self, SessionProvider};
use crate::statement::Statement;
use crate::{FieldMap, MapperConfig, MapperError, MapperResult, VersionCheck};
use std::sync::Arc;
use tracing::{debug, warn};

/// Loader plus insert, update, save, patch and delete for one table.
///
/// Every method returns the rows affected as reported by the store. Under
/// [`VersionCheck::Trust`] a versioned update that lost a race reports
/// whatever the store reports for a conditional miss; under
/// [`VersionCheck::VerifyRead`] a write that reports no affected row, or
/// whose row does not read back at `current + 1`, fails with
/// [`MapperError::VersionConflict`]. A store that reports every write as
/// applied can still hide a lost race whose winner wrote the same version.
pub struct Writer<T: Entity> {
    loader: Loader<T>,
    version: Option<usize>,
    version_check: VersionCheck,
}

impl<T: Entity + Clone> Writer<T> {
    /// Writer that versions through the schema's version field, if any
    pub fn new(provider: Arc<dyn SessionProvider>, table: &str) -> MapperResult<Self> {
        let loader = Loader::new(provider, table)?;
        let version = loader.schema().version_index();
        Ok(Self {
            loader,
            version,
            version_check: VersionCheck::default(),
        })
    }

    /// Writer that versions through the named field
    pub fn with_version(
        provider: Arc<dyn SessionProvider>,
        table: &str,
        version_field: &str,
    ) -> MapperResult<Self> {
        let mut writer = Self::new(provider, table)?;
        let index = writer.loader.schema().find_field(version_field).ok_or_else(|| {
            MapperError::schema_mismatch(format!(
                "{} has no persisted field '{version_field}'",
                writer.loader.schema().type_name()
            ))
        })?;
        writer.version = Some(index);
        Ok(writer)
    }

    /// Writer that never versions, even when the schema declares a field
    pub fn unversioned(provider: Arc<dyn SessionProvider>, table: &str) -> MapperResult<Self> {
        let mut writer = Self::new(provider, table)?;
        writer.version = None;
        Ok(writer)
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper<T>>) -> Self {
        self.loader = self.loader.with_mapper(mapper);
        self
    }

    pub fn with_version_check(mut self, check: VersionCheck) -> Self {
        self.version_check = check;
        self
    }

    /// Apply the `versioning` setting
    pub fn with_config(self, config: &MapperConfig) -> Self {
        self.with_version_check(config.versioning)
    }

    pub fn loader(&self) -> &Loader<T> {
        &self.loader
    }

    /// Record field index of the version field in use
    pub fn version_index(&self) -> Option<usize> {
        self.version
    }

    fn to_db(&self, model: &T) -> MapperResult<T> {
        let mut model = model.clone();
        if let Some(mapper) = self.loader.mapper() {
            mapper.model_to_db(&mut model)?;
        }
        Ok(model)
    }

    fn run(&self, statement: &Statement) -> MapperResult<u64> {
        debug!(table = %self.loader.table(), query = %statement.query, "Executing write");
        session::execute(self.loader.provider().as_ref(), statement)
    }

    pub fn insert(&self, model: &T) -> MapperResult<u64> {
        let model = self.to_db(model)?;
        let statement = build_to_insert(
            self.loader.table(),
            self.loader.schema(),
            &model,
            self.version,
            false,
        );
        self.run(&statement)
    }

    pub fn update(&self, model: &T) -> MapperResult<u64> {
        let model = self.to_db(model)?;
        let schema = self.loader.schema();
        let statement = build_to_update(self.loader.table(), schema, &model, self.version)?;
        let affected = self.run(&statement)?;

        if let (Some(index), VersionCheck::VerifyRead) = (self.version, self.version_check) {
            let current = model
                .get(index)
                .as_i64()
                .ok_or_else(|| MapperError::conversion("version must be an integer"))?;
            self.verify_version(&Key::of(schema, &model)?, index, current, affected)?;
        }
        Ok(affected)
    }

    /// Upsert: null fields are written explicitly
    pub fn save(&self, model: &T) -> MapperResult<u64> {
        let model = self.to_db(model)?;
        let statement = build_to_save(self.loader.table(), self.loader.schema(), &model, None);
        self.run(&statement)
    }

    /// Update only the entries present in `patch`
    pub fn patch(&self, patch: &FieldMap) -> MapperResult<u64> {
        let mut patch = patch.clone();
        if let Some(mapper) = self.loader.mapper() {
            mapper.patch_to_db(&mut patch)?;
        }
        let schema = self.loader.schema();
        let version = self.version.and_then(|i| schema.field_at(i));
        let statement = build_to_patch(
            self.loader.table(),
            schema,
            &patch,
            version.map(|f| f.json.as_str()),
        )?;
        let affected = self.run(&statement)?;

        if let (Some(field), VersionCheck::VerifyRead) = (version, self.version_check) {
            let current = patch
                .get(&field.json)
                .or_else(|| patch.get(&field.column))
                .and_then(|v| v.as_i64());
            if let Some(current) = current {
                self.verify_version(&Key::Fields(patch), field.index, current, affected)?;
            }
        }
        Ok(affected)
    }

    pub fn delete(&self, key: &Key) -> MapperResult<u64> {
        let statement = build_to_delete(self.loader.table(), self.loader.schema(), key)?;
        self.run(&statement)
    }

    /// Read the row back after a write conditioned on version `current`
    fn verify_version(&self, key: &Key, index: usize, current: i64, affected: u64) -> MapperResult<()> {
        let stored = self.loader.load(key)?;
        let found = stored.as_ref().and_then(|m| m.get(index).as_i64());
        if affected > 0 && found.is_some() && found == current.checked_add(1) {
            return Ok(());
        }
        warn!(table = %self.loader.table(), expected = current, ?found, affected, "Version check failed");
        Err(MapperError::VersionConflict {
            table: self.loader.table().to_string(),
            expected: current,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::CqlValue;

    crate::entity! {
        #[derive(Debug, Clone, Default, PartialEq)]
        struct Note {
            id: String => "primary_key",
            body: String,
            rev: i32 => "version",
        }
    }

    fn setup() -> (MemoryStore, Writer<Note>) {
        let store = MemoryStore::new();
        store.create_table("notes", &["id"]);
        let writer = Writer::<Note>::new(Arc::new(store.clone()), "notes").unwrap();
        (store, writer)
    }

    fn note(body: &str, rev: i32) -> Note {
        Note {
            id: "n1".into(),
            body: body.into(),
            rev,
        }
    }

    #[test]
    fn test_insert_starts_version_chain() {
        let (_, writer) = setup();
        writer.insert(&note("hello", 42)).unwrap();
        let loaded = writer.loader().load(&Key::from("n1")).unwrap().unwrap();
        assert_eq!(loaded.rev, 1);
    }

    #[test]
    fn test_stale_update_reports_zero_under_trust() {
        let (_, writer) = setup();
        writer.insert(&note("hello", 0)).unwrap();
        assert_eq!(writer.update(&note("second", 1)).unwrap(), 1);
        assert_eq!(writer.update(&note("stale", 1)).unwrap(), 0);

        let loaded = writer.loader().load(&Key::from("n1")).unwrap().unwrap();
        assert_eq!(loaded, note("second", 2));
    }

    #[test]
    fn test_stale_update_conflicts_under_verify_read() {
        let (_, writer) = setup();
        let writer = writer.with_version_check(VersionCheck::VerifyRead);
        writer.insert(&note("hello", 0)).unwrap();
        writer.update(&note("second", 1)).unwrap();

        let err = writer.update(&note("stale", 1)).unwrap_err();
        match err {
            MapperError::VersionConflict {
                expected, found, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(found, Some(2));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_config_selects_verify_read() {
        let config = MapperConfig::from_toml_str("versioning = \"verify_read\"").unwrap();
        let (_, writer) = setup();
        let writer = writer.with_config(&config);
        writer.insert(&note("hello", 0)).unwrap();
        writer.update(&note("second", 1)).unwrap();

        assert!(matches!(
            writer.update(&note("stale", 1)),
            Err(MapperError::VersionConflict { .. })
        ));
    }

    #[test]
    fn test_conflict_when_row_vanished() {
        let (_, writer) = setup();
        let writer = writer.with_version_check(VersionCheck::VerifyRead);
        let err = writer.update(&note("ghost", 5)).unwrap_err();
        assert!(matches!(err, MapperError::VersionConflict { found: None, .. }));
    }

    #[test]
    fn test_patch_advances_version() {
        let (_, writer) = setup();
        writer.insert(&note("hello", 0)).unwrap();

        let mut patch = FieldMap::new();
        patch.insert("id".into(), CqlValue::from("n1"));
        patch.insert("body".into(), CqlValue::from("patched"));
        patch.insert("rev".into(), CqlValue::Int(1));
        patch.insert("unknown".into(), CqlValue::from("dropped"));
        assert_eq!(writer.patch(&patch).unwrap(), 1);

        let loaded = writer.loader().load(&Key::from("n1")).unwrap().unwrap();
        assert_eq!(loaded, note("patched", 2));
    }

    #[test]
    fn test_unknown_version_field() {
        let store = MemoryStore::new();
        let result = Writer::<Note>::with_version(Arc::new(store), "notes", "nope");
        assert!(matches!(result, Err(MapperError::SchemaMismatch(_))));
    }

    #[test]
    fn test_save_and_delete() {
        let (store, writer) = setup();
        let unversioned = Writer::<Note>::unversioned(Arc::new(store.clone()), "notes").unwrap();
        unversioned.save(&note("saved", 9)).unwrap();
        assert_eq!(writer.loader().load(&Key::from("n1")).unwrap().unwrap().rev, 9);

        assert_eq!(writer.delete(&Key::from("n1")).unwrap(), 1);
        assert_eq!(store.row_count("notes"), 0);
        assert!(!writer.loader().exists(&Key::from("n1")).unwrap());
    }
}

//! Typed repository facade

use crate::builder::Key;
use crate::entity::Entity;
use crate::loader::Mapper;
use crate::session::SessionProvider;
use crate::writer::Writer;
use crate::{CqlValue, FieldMap, MapperConfig, MapperError, MapperResult, VersionCheck};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// A type usable as a row identifier
pub trait Identifier {
    /// Whether the type can carry a composite key
    const COMPOSITE: bool;

    fn to_key(&self) -> MapperResult<Key>;
}

macro_rules! scalar_identifier {
    ($($ty:ty),*) => {
        $(
            impl Identifier for $ty {
                const COMPOSITE: bool = false;

                fn to_key(&self) -> MapperResult<Key> {
                    Ok(Key::Value(CqlValue::from(self.clone())))
                }
            }
        )*
    };
}

scalar_identifier!(String, i32, i64, Uuid);

impl Identifier for FieldMap {
    const COMPOSITE: bool = true;

    fn to_key(&self) -> MapperResult<Key> {
        Ok(Key::Fields(self.clone()))
    }
}

impl Identifier for Key {
    const COMPOSITE: bool = true;

    fn to_key(&self) -> MapperResult<Key> {
        Ok(self.clone())
    }
}

/// A record-shaped identifier whose field names match the key fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordKey<K>(pub K);

impl<K: Entity> Identifier for RecordKey<K> {
    const COMPOSITE: bool = true;

    fn to_key(&self) -> MapperResult<Key> {
        Key::from_record(&self.0)
    }
}

/// Loader and writer for `T`, addressed by `K`
pub struct Dao<T: Entity, K> {
    writer: Writer<T>,
    _key: PhantomData<fn(&K)>,
}

impl<T: Entity + Clone, K: Identifier> Dao<T, K> {
    /// Fails with `SchemaMismatch` when `T` has a composite key and `K`
    /// cannot carry one
    pub fn new(provider: Arc<dyn SessionProvider>, table: &str) -> MapperResult<Self> {
        Self::from_writer(Writer::new(provider, table)?)
    }

    pub fn from_writer(writer: Writer<T>) -> MapperResult<Self> {
        let schema = writer.loader().schema();
        if schema.has_composite_key() && !K::COMPOSITE {
            return Err(MapperError::schema_mismatch(format!(
                "{} has a composite key ({}); {} cannot identify its rows",
                schema.type_name(),
                schema.key_columns().join(","),
                std::any::type_name::<K>()
            )));
        }
        Ok(Self {
            writer,
            _key: PhantomData,
        })
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper<T>>) -> Self {
        self.writer = self.writer.with_mapper(mapper);
        self
    }

    pub fn with_version_check(mut self, check: VersionCheck) -> Self {
        self.writer = self.writer.with_version_check(check);
        self
    }

    pub fn with_config(mut self, config: &MapperConfig) -> Self {
        self.writer = self.writer.with_config(config);
        self
    }

    pub fn writer(&self) -> &Writer<T> {
        &self.writer
    }

    pub fn all(&self) -> MapperResult<Vec<T>> {
        self.writer.loader().all()
    }

    pub fn load(&self, id: &K) -> MapperResult<Option<T>> {
        self.writer.loader().load(&id.to_key()?)
    }

    pub fn exists(&self, id: &K) -> MapperResult<bool> {
        self.writer.loader().exists(&id.to_key()?)
    }

    pub fn insert(&self, model: &T) -> MapperResult<u64> {
        self.writer.insert(model)
    }

    pub fn update(&self, model: &T) -> MapperResult<u64> {
        self.writer.update(model)
    }

    pub fn save(&self, model: &T) -> MapperResult<u64> {
        self.writer.save(model)
    }

    pub fn patch(&self, patch: &FieldMap) -> MapperResult<u64> {
        self.writer.patch(patch)
    }

    pub fn delete(&self, id: &K) -> MapperResult<u64> {
        self.writer.delete(&id.to_key()?)
    }
}

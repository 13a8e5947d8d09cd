//! Schema extraction and the per-type schema cache

use crate::entity::{Entity, TypeDescriptor};
use crate::{MapperError, MapperResult};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

/// Storage description of one persisted field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    /// Rust field name
    pub name: String,
    /// Wire (JSON) name
    pub json: String,
    /// Physical column, lower case
    pub column: String,
    /// Position in the record's described field list
    pub index: usize,
    pub is_key: bool,
    pub is_version: bool,
    pub insertable: bool,
    pub updatable: bool,
    /// Patch replacement for `true`, from the `true:<v>` tag
    pub true_value: Option<String>,
    /// Patch replacement for `false`, from the `false:<v>` tag
    pub false_value: Option<String>,
}

/// Column, key and version metadata for one record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    type_name: String,
    fields: Vec<FieldMeta>,
    keys: Vec<usize>,
    version: Option<usize>,
    by_column: HashMap<String, usize>,
    by_json: HashMap<String, usize>,
}

/// Build a schema from a type description
pub fn extract_schema(descriptor: &TypeDescriptor) -> MapperResult<Schema> {
    let described = descriptor.fields().ok_or_else(|| {
        MapperError::invalid_type(&descriptor.name, "schema source must be a record type")
    })?;

    let mut fields = Vec::with_capacity(described.len());
    let mut keys = Vec::new();
    let mut version = None;
    let mut by_column = HashMap::new();
    let mut by_json = HashMap::new();

    for (index, field) in described.iter().enumerate() {
        if field.ignore {
            continue;
        }
        let column = field
            .column
            .as_deref()
            .unwrap_or(&field.name)
            .to_lowercase();
        let json = field.json.clone().unwrap_or_else(|| field.name.clone());
        let position = fields.len();

        if by_column.insert(column.clone(), position).is_some() {
            return Err(MapperError::invalid_type(
                &descriptor.name,
                format!("column '{column}' is declared more than once"),
            ));
        }
        if by_json.insert(json.clone(), position).is_some() {
            return Err(MapperError::invalid_type(
                &descriptor.name,
                format!("json name '{json}' is declared more than once"),
            ));
        }

        if field.primary_key {
            keys.push(position);
        }
        if field.version {
            if version.is_some() {
                return Err(MapperError::invalid_type(
                    &descriptor.name,
                    "more than one version field",
                ));
            }
            version = Some(position);
        }

        fields.push(FieldMeta {
            name: field.name.clone(),
            json,
            column,
            index,
            is_key: field.primary_key,
            is_version: field.version,
            insertable: field.insertable,
            updatable: field.updatable,
            true_value: field.true_value.clone(),
            false_value: field.false_value.clone(),
        });
    }

    Ok(Schema {
        type_name: descriptor.name.clone(),
        fields,
        keys,
        version,
        by_column,
        by_json,
    })
}

impl Schema {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// All persisted fields in declaration order
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldMeta> + '_ {
        self.keys.iter().map(|&i| &self.fields[i])
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn has_composite_key(&self) -> bool {
        self.keys.len() > 1
    }

    pub fn key_columns(&self) -> Vec<&str> {
        self.keys().map(|f| f.column.as_str()).collect()
    }

    pub fn insert_fields(&self) -> impl Iterator<Item = &FieldMeta> + '_ {
        self.fields.iter().filter(|f| f.insertable)
    }

    pub fn update_fields(&self) -> impl Iterator<Item = &FieldMeta> + '_ {
        self.fields.iter().filter(|f| f.updatable && !f.is_key)
    }

    /// Field for a physical column; matching ignores case
    pub fn field_by_column(&self, column: &str) -> Option<&FieldMeta> {
        self.by_column
            .get(column)
            .or_else(|| self.by_column.get(&column.to_lowercase()))
            .map(|&i| &self.fields[i])
    }

    pub fn field_by_json(&self, name: &str) -> Option<&FieldMeta> {
        self.by_json.get(name).map(|&i| &self.fields[i])
    }

    /// Resolve a wire name, falling back to a column name
    pub fn resolve(&self, name: &str) -> Option<&FieldMeta> {
        self.field_by_json(name).or_else(|| self.field_by_column(name))
    }

    /// `(wire name, column)` pair for building filter predicates
    pub fn json_column(&self, name: &str) -> Option<(&str, &str)> {
        self.field_by_json(name)
            .map(|f| (f.json.as_str(), f.column.as_str()))
    }

    /// Column to record field index, as consumed by the scanner
    pub fn fields_index(&self) -> HashMap<String, usize> {
        self.fields
            .iter()
            .map(|f| (f.column.clone(), f.index))
            .collect()
    }

    /// Comma-joined column list for `select` statements
    pub fn select_fields(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.column.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Record field index for a Rust field name
    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.index)
    }

    pub fn version(&self) -> Option<&FieldMeta> {
        self.version.map(|i| &self.fields[i])
    }

    /// Record field index of the version field
    pub fn version_index(&self) -> Option<usize> {
        self.version().map(|f| f.index)
    }

    /// Schema field for a record field index
    pub fn field_at(&self, index: usize) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.index == index)
    }
}

type SchemaCache = RwLock<HashMap<TypeId, Arc<Schema>>>;

static SCHEMAS: OnceLock<SchemaCache> = OnceLock::new();

/// Cached schema for `T`, extracted on first use
pub fn schema_of<T: Entity>() -> MapperResult<Arc<Schema>> {
    let cache = SCHEMAS.get_or_init(|| RwLock::new(HashMap::new()));
    let id = TypeId::of::<T>();

    if let Some(schema) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
    {
        return Ok(Arc::clone(schema));
    }

    let schema = Arc::new(extract_schema(&T::describe())?);
    let mut schemas = cache.write().unwrap_or_else(PoisonError::into_inner);
    let entry = schemas.entry(id).or_insert_with(|| {
        debug!(type_name = schema.type_name(), columns = schema.fields().len(), "Extracted schema");
        Arc::clone(&schema)
    });
    Ok(Arc::clone(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldDescriptor;
    use crate::CqlValue;
    use proptest::prelude::*;

    crate::entity! {
        #[derive(Debug, Clone, Default)]
        struct Order {
            customer: String => "column:Customer_Id;primary_key;json:customerId",
            number: i64 => "primary_key",
            total: f64,
            note: Option<String> => "update:false",
            cache: String => "-",
            created: String => "insert:false",
            version: i32 => "version",
        }
    }

    #[derive(Default)]
    struct Opaque;

    impl Entity for Opaque {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::scalar("Opaque")
        }

        fn get(&self, _index: usize) -> CqlValue {
            CqlValue::Null
        }

        fn set(&mut self, _index: usize, _value: CqlValue) -> MapperResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_extract_schema() {
        let schema = extract_schema(&Order::describe()).unwrap();
        assert_eq!(schema.type_name(), "Order");
        assert_eq!(schema.fields().len(), 6);
        assert_eq!(schema.key_columns(), vec!["customer_id", "number"]);
        assert!(schema.has_composite_key());
        assert_eq!(
            schema.select_fields(),
            "customer_id,number,total,note,created,version"
        );

        let created = schema.field_by_column("created").unwrap();
        assert_eq!(created.index, 5);
        assert!(!created.insertable);

        let update: Vec<_> = schema.update_fields().map(|f| f.column.as_str()).collect();
        assert_eq!(update, vec!["total", "created", "version"]);

        assert_eq!(schema.version_index(), Some(6));
        assert_eq!(schema.find_field("cache"), None);
        assert_eq!(schema.find_field("total"), Some(2));
    }

    #[test]
    fn test_lookups() {
        let schema = extract_schema(&Order::describe()).unwrap();
        assert_eq!(schema.json_column("customerId"), Some(("customerId", "customer_id")));
        assert_eq!(schema.json_column("customer_id"), None);
        assert_eq!(schema.field_by_column("CUSTOMER_ID").unwrap().name, "customer");
        assert_eq!(schema.resolve("customer_id").unwrap().name, "customer");
        assert_eq!(schema.fields_index().get("version"), Some(&6));
    }

    #[test]
    fn test_zero_keys_is_valid() {
        let desc = TypeDescriptor::record("Log", vec![FieldDescriptor::new("line")]);
        let schema = extract_schema(&desc).unwrap();
        assert_eq!(schema.key_count(), 0);
        assert!(schema.version().is_none());
    }

    #[test]
    fn test_non_record_is_invalid_type() {
        let err = schema_of::<Opaque>().unwrap_err();
        assert!(matches!(err, MapperError::InvalidType { .. }));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let desc = TypeDescriptor::record(
            "Dup",
            vec![
                FieldDescriptor::new("a").column("x"),
                FieldDescriptor::new("X"),
            ],
        );
        assert!(matches!(
            extract_schema(&desc),
            Err(MapperError::InvalidType { .. })
        ));
    }

    #[test]
    fn test_duplicate_json_name_rejected() {
        let desc = TypeDescriptor::record(
            "Clash",
            vec![
                FieldDescriptor::new("user_name").json("name"),
                FieldDescriptor::new("name"),
            ],
        );
        match extract_schema(&desc) {
            Err(MapperError::InvalidType { reason, .. }) => assert!(reason.contains("'name'")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_two_version_fields_rejected() {
        let desc = TypeDescriptor::record(
            "Twice",
            vec![
                FieldDescriptor::new("a").version(),
                FieldDescriptor::new("b").version(),
            ],
        );
        assert!(extract_schema(&desc).is_err());
    }

    #[test]
    fn test_cache_returns_same_arc() {
        let first = schema_of::<Order>().unwrap();
        let second = schema_of::<Order>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    fn descriptor_strategy() -> impl Strategy<Value = TypeDescriptor> {
        prop::collection::btree_set("[a-z]{1,8}", 1..8).prop_flat_map(|names| {
            let names: Vec<String> = names.into_iter().collect();
            let len = names.len();
            (
                Just(names),
                prop::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), len),
                0..len,
            )
                .prop_map(|(names, flags, version)| {
                    let fields = names
                        .into_iter()
                        .zip(flags)
                        .enumerate()
                        .map(|(i, (name, (key, insert, update)))| {
                            let mut field = FieldDescriptor::new(name);
                            field.primary_key = key;
                            field.insertable = insert;
                            field.updatable = update;
                            field.version = i == version;
                            field
                        })
                        .collect();
                    TypeDescriptor::record("Generated", fields)
                })
        })
    }

    proptest! {
        #[test]
        fn prop_extraction_is_idempotent(desc in descriptor_strategy()) {
            let first = extract_schema(&desc).unwrap();
            let second = extract_schema(&desc).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}

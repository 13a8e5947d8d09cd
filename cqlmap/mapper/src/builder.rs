//! Statement builder
//!
//! Pure functions from a table name, a [`Schema`] and a model (or a sparse
//! field map) to a [`Statement`]. Values that have a literal form are inlined;
//! everything else is bound with `?` in order of appearance.

use crate::coercion::literal_or_bind;
use crate::entity::Entity;
use crate::schema::{schema_of, FieldMeta, Schema};
use crate::statement::{Statement, PARAM};
use crate::{CqlValue, FieldMap, MapperError, MapperResult};
use std::collections::BTreeMap;
use tracing::debug;

/// Identifier of a single row
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Value of a single-column key
    Value(CqlValue),
    /// Values of a composite key, by wire name or column name
    Fields(FieldMap),
}

impl Key {
    /// Key from a record whose fields are named like the target's key fields
    pub fn from_record<K: Entity>(record: &K) -> MapperResult<Key> {
        let schema = schema_of::<K>()?;
        let fields = schema
            .fields()
            .iter()
            .map(|f| (f.column.clone(), record.get(f.index)))
            .collect();
        Ok(Key::Fields(fields))
    }

    /// Key of `model` under `schema`
    pub fn of<T: Entity>(schema: &Schema, model: &T) -> MapperResult<Key> {
        ensure_keyed(schema)?;
        if schema.has_composite_key() {
            Ok(Key::Fields(
                schema
                    .keys()
                    .map(|f| (f.column.clone(), model.get(f.index)))
                    .collect(),
            ))
        } else {
            let key = schema.keys().next().map(|f| model.get(f.index));
            Ok(Key::Value(key.unwrap_or(CqlValue::Null)))
        }
    }
}

impl From<CqlValue> for Key {
    fn from(value: CqlValue) -> Self {
        Key::Value(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Value(CqlValue::from(value))
    }
}

impl From<FieldMap> for Key {
    fn from(fields: FieldMap) -> Self {
        Key::Fields(fields)
    }
}

fn ensure_keyed(schema: &Schema) -> MapperResult<()> {
    if schema.key_count() == 0 {
        return Err(MapperError::schema_mismatch(format!(
            "{} declares no primary key",
            schema.type_name()
        )));
    }
    Ok(())
}

/// Pair every key column of `schema` with its value from `key`
pub fn resolve_key<'a>(schema: &'a Schema, key: &Key) -> MapperResult<Vec<(&'a FieldMeta, CqlValue)>> {
    ensure_keyed(schema)?;
    match key {
        Key::Value(value) => {
            if schema.has_composite_key() {
                return Err(MapperError::schema_mismatch(format!(
                    "{} has a composite key ({}); a single value cannot identify a row",
                    schema.type_name(),
                    schema.key_columns().join(",")
                )));
            }
            Ok(schema.keys().map(|f| (f, value.clone())).collect())
        }
        Key::Fields(fields) => schema
            .keys()
            .map(|f| {
                fields
                    .get(&f.json)
                    .or_else(|| fields.get(&f.column))
                    .or_else(|| fields.get(&f.name))
                    .map(|v| (f, v.clone()))
                    .ok_or_else(|| {
                        MapperError::schema_mismatch(format!(
                            "key field '{}' missing for {}",
                            f.json,
                            schema.type_name()
                        ))
                    })
            })
            .collect(),
    }
}

/// Inline `value` if it has a literal form, otherwise bind it
fn render(value: CqlValue, params: &mut Vec<CqlValue>) -> String {
    if value.is_null() {
        return "null".to_string();
    }
    match literal_or_bind(&value) {
        Some(literal) => literal,
        None => {
            params.push(value);
            PARAM.to_string()
        }
    }
}

/// Replace a patched boolean with the field's `true:`/`false:` tag value.
/// Integer-looking tag values are stored as integers.
fn stored_bool(field: &FieldMeta, value: &CqlValue) -> CqlValue {
    let mapped = match value {
        CqlValue::Boolean(true) => field.true_value.as_deref(),
        CqlValue::Boolean(false) => field.false_value.as_deref(),
        _ => None,
    };
    match mapped {
        None => value.clone(),
        Some(text) => match text.parse::<i32>() {
            Ok(n) => CqlValue::Int(n),
            Err(_) => match text.parse::<i64>() {
                Ok(n) => CqlValue::Bigint(n),
                Err(_) => CqlValue::Text(text.to_string()),
            },
        },
    }
}

fn version_number(value: &CqlValue, field: &str) -> MapperResult<(i64, i64)> {
    let current = value.as_i64().ok_or_else(|| {
        MapperError::conversion(format!(
            "version must be an integer, found {}",
            value.type_name()
        ))
        .in_field(field)
    })?;
    let next = current
        .checked_add(1)
        .ok_or_else(|| MapperError::conversion("version overflow").in_field(field))?;
    Ok((current, next))
}

/// `insert into T(cols) values(vals)`.
///
/// A version field, when given, is always written as `1`. Null optional
/// fields are omitted unless `upsert` is set, in which case they are written
/// as `null`.
pub fn build_to_insert<T: Entity>(
    table: &str,
    schema: &Schema,
    model: &T,
    version: Option<usize>,
    upsert: bool,
) -> Statement {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    let mut params = Vec::new();

    for field in schema.fields() {
        if Some(field.index) == version {
            columns.push(field.column.as_str());
            values.push("1".to_string());
            continue;
        }
        if !field.insertable {
            continue;
        }
        let value = model.get(field.index);
        if value.is_null() && !upsert {
            continue;
        }
        columns.push(field.column.as_str());
        values.push(render(value, &mut params));
    }

    Statement::new(
        format!(
            "insert into {}({}) values({})",
            table,
            columns.join(","),
            values.join(",")
        ),
        params,
    )
}

/// Insert that writes null fields explicitly
pub fn build_to_save<T: Entity>(
    table: &str,
    schema: &Schema,
    model: &T,
    version: Option<usize>,
) -> Statement {
    build_to_insert(table, schema, model, version, true)
}

/// `update T set ... where keys [and version=current]`.
///
/// With a version field index the SET clause writes `current + 1` and the
/// WHERE clause requires `current`, so a concurrent writer that already
/// advanced the version makes this statement match nothing.
pub fn build_to_update<T: Entity>(
    table: &str,
    schema: &Schema,
    model: &T,
    version: Option<usize>,
) -> MapperResult<Statement> {
    ensure_keyed(schema)?;
    if let Some(index) = version {
        if schema.field_at(index).is_none() {
            return Err(MapperError::schema_mismatch(format!(
                "{} has no persisted field at index {index}",
                schema.type_name()
            )));
        }
    }

    let mut sets = Vec::new();
    let mut params = Vec::new();
    let mut version_predicate = None;

    for field in schema.fields() {
        if field.is_key {
            continue;
        }
        if Some(field.index) == version {
            let (current, next) = version_number(&model.get(field.index), &field.name)?;
            sets.push(format!("{}={next}", field.column));
            version_predicate = Some(format!("{}={current}", field.column));
            continue;
        }
        if !field.updatable {
            continue;
        }
        let value = model.get(field.index);
        sets.push(format!("{}={}", field.column, render(value, &mut params)));
    }

    if sets.is_empty() {
        return Err(MapperError::schema_mismatch(format!(
            "{} has no updatable columns",
            schema.type_name()
        )));
    }

    let mut predicates: Vec<String> = schema
        .keys()
        .map(|f| format!("{}={}", f.column, render(model.get(f.index), &mut params)))
        .collect();
    predicates.extend(version_predicate);

    Ok(Statement::new(
        format!(
            "update {} set {} where {}",
            table,
            sets.join(","),
            predicates.join(" and ")
        ),
        params,
    ))
}

/// Update over the entries of a sparse field map.
///
/// Entry names are wire names or column names; entries the schema does not
/// know are dropped. Every key field must be present. When `version` names a
/// field that is present in the patch, it is advanced the same way
/// [`build_to_update`] does.
pub fn build_to_patch(
    table: &str,
    schema: &Schema,
    patch: &FieldMap,
    version: Option<&str>,
) -> MapperResult<Statement> {
    ensure_keyed(schema)?;

    let mut entries: BTreeMap<usize, &CqlValue> = BTreeMap::new();
    for (name, value) in patch {
        match schema.resolve(name) {
            Some(field) => {
                entries.insert(field.index, value);
            }
            None => debug!(field = %name, table, "Dropping unmapped patch field"),
        }
    }

    let version_field = version.and_then(|name| schema.resolve(name));
    let mut sets = Vec::new();
    let mut params = Vec::new();

    for field in schema.fields() {
        if field.is_key || !field.updatable {
            continue;
        }
        if version_field.is_some_and(|v| v.index == field.index) {
            continue;
        }
        if let Some(value) = entries.get(&field.index) {
            sets.push(format!("{}={}", field.column, render(stored_bool(field, value), &mut params)));
        }
    }

    let mut version_predicate = None;
    if let Some(field) = version_field {
        if let Some(value) = entries.get(&field.index) {
            let (current, next) = version_number(value, &field.name)?;
            sets.push(format!("{}={next}", field.column));
            version_predicate = Some(format!("{}={current}", field.column));
        }
    }

    if sets.is_empty() {
        return Err(MapperError::schema_mismatch(format!(
            "patch for {table} assigns no columns"
        )));
    }

    let mut predicates = Vec::new();
    for field in schema.keys() {
        let value = entries.get(&field.index).ok_or_else(|| {
            MapperError::schema_mismatch(format!("patch for {table} is missing key '{}'", field.json))
        })?;
        predicates.push(format!("{}={}", field.column, render((*value).clone(), &mut params)));
    }
    predicates.extend(version_predicate);

    Ok(Statement::new(
        format!(
            "update {} set {} where {}",
            table,
            sets.join(","),
            predicates.join(" and ")
        ),
        params,
    ))
}

/// `delete from T where c1=? and c2=?`
pub fn build_to_delete(table: &str, schema: &Schema, key: &Key) -> MapperResult<Statement> {
    let resolved = resolve_key(schema, key)?;
    let predicates: Vec<String> = resolved
        .iter()
        .map(|(f, _)| format!("{}={PARAM}", f.column))
        .collect();
    Ok(Statement::new(
        format!("delete from {} where {}", table, predicates.join(" and ")),
        resolved.into_iter().map(|(_, v)| v).collect(),
    ))
}

/// Append `where c1 = ? and c2 = ?` to `prefix`
pub fn build_find_by_id(prefix: &str, schema: &Schema, key: &Key) -> MapperResult<Statement> {
    let resolved = resolve_key(schema, key)?;
    let predicates: Vec<String> = resolved
        .iter()
        .map(|(f, _)| format!("{} = {PARAM}", f.column))
        .collect();
    Ok(Statement::new(
        format!("{} where {}", prefix, predicates.join(" and ")),
        resolved.into_iter().map(|(_, v)| v).collect(),
    ))
}

/// `select <fields> from T`
pub fn build_select_all(table: &str, schema: &Schema) -> String {
    format!("select {} from {}", schema.select_fields(), table)
}

/// Translate `"-name,+id"` into ` order by name desc,id asc`.
///
/// Names resolve through wire names then columns; unknown names are dropped.
/// Returns an empty string when nothing resolves.
pub fn build_sort(sort: &str, schema: &Schema) -> String {
    let clauses: Vec<String> = sort
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|item| {
            let (name, direction) = match item.as_bytes()[0] {
                b'-' => (&item[1..], "desc"),
                b'+' => (&item[1..], "asc"),
                _ => (item, "asc"),
            };
            schema
                .resolve(name.trim())
                .map(|f| format!("{} {direction}", f.column))
        })
        .collect();

    if clauses.is_empty() {
        String::new()
    } else {
        format!(" order by {}", clauses.join(","))
    }
}

pub fn build_to_insert_batch<T: Entity>(
    table: &str,
    schema: &Schema,
    models: &[T],
    version: Option<usize>,
    upsert: bool,
) -> Vec<Statement> {
    models
        .iter()
        .map(|m| build_to_insert(table, schema, m, version, upsert))
        .collect()
}

pub fn build_to_update_batch<T: Entity>(
    table: &str,
    schema: &Schema,
    models: &[T],
    version: Option<usize>,
) -> MapperResult<Vec<Statement>> {
    models
        .iter()
        .map(|m| build_to_update(table, schema, m, version))
        .collect()
}

/// One multi-row insert sharing the insertable column list.
///
/// Null fields are written as `null` in their row. Returns `None` for an
/// empty input.
pub fn build_to_save_batch<T: Entity>(table: &str, schema: &Schema, models: &[T]) -> Option<Statement> {
    if models.is_empty() {
        return None;
    }

    let fields: Vec<&FieldMeta> = schema.insert_fields().collect();
    let columns: Vec<&str> = fields.iter().map(|f| f.column.as_str()).collect();
    let mut params = Vec::new();
    let rows: Vec<String> = models
        .iter()
        .map(|model| {
            let values: Vec<String> = fields
                .iter()
                .map(|f| render(model.get(f.index), &mut params))
                .collect();
            format!("({})", values.join(","))
        })
        .collect();

    Some(Statement::new(
        format!(
            "insert into {}({}) values{}",
            table,
            columns.join(","),
            rows.join(",")
        ),
        params,
    ))
}

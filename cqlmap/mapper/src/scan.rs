//! Row scanning
//!
//! Maps result columns onto record fields through a column index, or onto
//! field maps for untyped reads. Columns without a destination are read and
//! discarded; they never fail a scan.

use crate::entity::Entity;
use crate::session::{Rows, SessionGuard, SessionProvider};
use crate::statement::Statement;
use crate::{CqlValue, FieldMap, MapperError, MapperResult};
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::debug;

/// Column to record field index
pub type FieldsIndex = HashMap<String, usize>;

/// Destination field for each result column.
///
/// With an index, columns are looked up as given and then lower-cased.
/// Without one, columns match the record's field names exactly.
pub fn column_targets<T: Entity>(columns: &[String], index: Option<&FieldsIndex>) -> Vec<Option<usize>> {
    match index {
        Some(index) => columns
            .iter()
            .map(|c| {
                index
                    .get(c)
                    .or_else(|| index.get(&c.to_lowercase()))
                    .copied()
            })
            .collect(),
        None => {
            let descriptor = T::describe();
            let fields = descriptor.fields().unwrap_or_default();
            columns
                .iter()
                .map(|c| fields.iter().position(|f| !f.ignore && f.name == *c))
                .collect()
        }
    }
}

fn check_width(row: &[CqlValue], targets: &[Option<usize>]) -> MapperResult<()> {
    if row.len() != targets.len() {
        return Err(MapperError::store(format!(
            "row has {} values for {} columns",
            row.len(),
            targets.len()
        )));
    }
    Ok(())
}

/// Assign one row onto `dest`
pub fn scan_row<T: Entity>(row: &[CqlValue], targets: &[Option<usize>], dest: &mut T) -> MapperResult<()> {
    check_width(row, targets)?;
    for (value, target) in row.iter().zip(targets) {
        if let Some(index) = target {
            dest.set(*index, value.clone())?;
        }
    }
    Ok(())
}

/// Lazy single pass over a live result, one fresh `T` per row.
///
/// Not restartable; stops after the first error.
pub struct ScanIter<'r, T> {
    rows: &'r mut dyn Rows,
    targets: Vec<Option<usize>>,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T: Entity> ScanIter<'r, T> {
    pub fn new(rows: &'r mut dyn Rows, index: Option<&FieldsIndex>) -> Self {
        let targets = column_targets::<T>(rows.columns(), index);
        let unmapped = targets.iter().filter(|t| t.is_none()).count();
        if unmapped > 0 {
            debug!(unmapped, "Result columns without destination field are discarded");
        }
        Self {
            rows,
            targets,
            done: false,
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> Iterator for ScanIter<'_, T> {
    type Item = MapperResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = match self.rows.next_row() {
            Ok(Some(row)) => {
                let mut dest = T::default();
                scan_row(row, &self.targets, &mut dest).map(|_| dest)
            }
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

/// Scan every remaining row
pub fn scan_all<T: Entity>(rows: &mut dyn Rows, index: Option<&FieldsIndex>) -> MapperResult<Vec<T>> {
    ScanIter::new(rows, index).collect()
}

/// Run `statement` and scan all rows into `T`
pub fn query<T: Entity>(
    provider: &dyn SessionProvider,
    statement: &Statement,
    index: Option<&FieldsIndex>,
) -> MapperResult<Vec<T>> {
    let mut session = SessionGuard::acquire(provider)?;
    let mut rows = session.query(&statement.query, &statement.params, None)?;
    scan_all(rows.as_mut(), index)
}

/// Options for map-oriented scans
#[derive(Default)]
pub struct MapScan<'a> {
    /// Re-key result columns, e.g. [`to_camel_case`]
    pub transform: Option<&'a dyn Fn(&str) -> String>,
    /// Values substituted for null columns, keyed by result column or by
    /// transformed name
    pub defaults: Option<&'a FieldMap>,
}

impl<'a> MapScan<'a> {
    pub fn with_transform(transform: &'a dyn Fn(&str) -> String) -> Self {
        Self {
            transform: Some(transform),
            defaults: None,
        }
    }

    pub fn defaults(mut self, defaults: &'a FieldMap) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Scan every remaining row into field maps; values are copied out of the
    /// row buffer
    pub fn scan(&self, rows: &mut dyn Rows) -> MapperResult<Vec<FieldMap>> {
        let columns: Vec<String> = rows.columns().to_vec();
        let keys: Vec<String> = match self.transform {
            Some(transform) => columns.iter().map(|c| transform(c)).collect(),
            None => columns.clone(),
        };

        let mut out = Vec::new();
        while let Some(row) = rows.next_row()? {
            if row.len() != columns.len() {
                return Err(MapperError::store(format!(
                    "row has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            let mut record = FieldMap::new();
            for ((column, key), value) in columns.iter().zip(&keys).zip(row) {
                let value = match (value, self.defaults) {
                    (CqlValue::Null, Some(defaults)) => defaults
                        .get(column)
                        .or_else(|| defaults.get(key))
                        .cloned()
                        .unwrap_or(CqlValue::Null),
                    _ => value.clone(),
                };
                record.insert(key.clone(), value);
            }
            out.push(record);
        }
        Ok(out)
    }
}

/// Run `statement` and return each row as a field map
pub fn query_map(
    provider: &dyn SessionProvider,
    statement: &Statement,
    options: &MapScan<'_>,
) -> MapperResult<Vec<FieldMap>> {
    let mut session = SessionGuard::acquire(provider)?;
    let mut rows = session.query(&statement.query, &statement.params, None)?;
    options.scan(rows.as_mut())
}

/// `user_id` -> `userId`; the input is lower-cased first
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = false;
    for (i, c) in s.to_lowercase().chars().enumerate() {
        if c == '_' && i > 0 {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    if upper_next {
        out.push('_');
    }
    out
}

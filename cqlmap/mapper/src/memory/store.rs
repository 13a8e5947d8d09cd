//! In-memory store
//!
//! Tables keep their rows ordered by primary key. Paging walks that order
//! and hands out the last key of a page as the continuation state.

use super::parser::{ClusteringOrder, ComparisonOperator, CqlParser, CqlStatement, WhereCondition};
use crate::session::{Paging, Rows, Session, SessionProvider};
use crate::statement::Statement;
use crate::{CqlValue, MapperError, MapperResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised by the in-memory store
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("unconfigured table {0}")]
    UnknownTable(String),

    #[error("missing value for key column '{column}' of {table}")]
    MissingKey { table: String, column: String },

    #[error("no bound value for parameter {0}")]
    MissingParameter(usize),

    #[error("invalid paging state")]
    InvalidPagingState,

    #[error("injected fault: {0}")]
    Injected(String),

    #[error("{0}")]
    Unsupported(String),
}

impl From<MemoryStoreError> for MapperError {
    fn from(err: MemoryStoreError) -> Self {
        MapperError::store(err)
    }
}

/// Orderable projection of a key value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Other(String),
}

impl From<&CqlValue> for KeyPart {
    fn from(value: &CqlValue) -> Self {
        if let Some(n) = value.as_i64() {
            return KeyPart::Int(n);
        }
        match value {
            CqlValue::Null => KeyPart::Null,
            CqlValue::Boolean(b) => KeyPart::Bool(*b),
            CqlValue::Text(s) => KeyPart::Text(s.clone()),
            other => KeyPart::Other(other.to_string()),
        }
    }
}

type RowKey = Vec<KeyPart>;
type Row = HashMap<String, CqlValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum PageState {
    /// Resume after this key (key-ordered scans)
    After(RowKey),
    /// Resume at this offset (explicitly ordered scans)
    Offset(usize),
}

#[derive(Debug, Clone, Default)]
struct Table {
    key_columns: Vec<String>,
    columns: Vec<String>,
    rows: BTreeMap<RowKey, Row>,
}

impl Table {
    fn note_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    fn key_of(&self, table: &str, values: &HashMap<String, CqlValue>) -> Result<RowKey, MemoryStoreError> {
        self.key_columns
            .iter()
            .map(|column| match values.get(column) {
                Some(v) if !v.is_null() => Ok(KeyPart::from(v)),
                _ => Err(MemoryStoreError::MissingKey {
                    table: table.to_string(),
                    column: column.clone(),
                }),
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_acquire: bool,
    fail_on: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: Mutex<HashMap<String, Table>>,
    faults: Mutex<Faults>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    executed: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory implementation of the session contract
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table and its primary key columns
    pub fn create_table(&self, name: &str, key_columns: &[&str]) {
        let key_columns: Vec<String> = key_columns.iter().map(|c| c.to_lowercase()).collect();
        let table = Table {
            columns: key_columns.clone(),
            key_columns,
            rows: BTreeMap::new(),
        };
        lock(&self.inner.tables).insert(name.to_lowercase(), table);
        debug!(table = name, "Created table");
    }

    /// Number of rows currently in `table`
    pub fn row_count(&self, table: &str) -> usize {
        lock(&self.inner.tables)
            .get(&table.to_lowercase())
            .map_or(0, |t| t.rows.len())
    }

    pub fn acquired(&self) -> usize {
        self.inner.acquired.load(AtomicOrdering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.inner.released.load(AtomicOrdering::SeqCst)
    }

    /// Sessions acquired but not yet released
    pub fn open_sessions(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }

    /// Statements that reached the store, including failed ones
    pub fn statements_executed(&self) -> usize {
        self.inner.executed.load(AtomicOrdering::SeqCst)
    }

    /// Make every acquisition fail
    pub fn fail_acquire(&self, fail: bool) {
        lock(&self.inner.faults).fail_acquire = fail;
    }

    /// Fail any statement whose text contains `fragment`
    pub fn fail_on(&self, fragment: &str) {
        lock(&self.inner.faults).fail_on.push(fragment.to_string());
    }

    pub fn clear_faults(&self) {
        *lock(&self.inner.faults) = Faults::default();
    }
}

impl SessionProvider for MemoryStore {
    fn acquire(&self) -> MapperResult<Box<dyn Session>> {
        if lock(&self.inner.faults).fail_acquire {
            return Err(MemoryStoreError::Injected("session acquisition".to_string()).into());
        }
        self.inner.acquired.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
            open: true,
        }))
    }
}

/// Session handed out by [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySession {
    inner: Arc<Inner>,
    open: bool,
}

impl MemorySession {
    fn check(&self, query: &str) -> Result<(), MemoryStoreError> {
        if !self.open {
            return Err(MemoryStoreError::Unsupported("session already released".to_string()));
        }
        self.inner.executed.fetch_add(1, AtomicOrdering::SeqCst);
        let faults = lock(&self.inner.faults);
        match faults.fail_on.iter().find(|f| query.contains(f.as_str())) {
            Some(fragment) => Err(MemoryStoreError::Injected(format!(
                "statement matching '{fragment}'"
            ))),
            None => Ok(()),
        }
    }
}

impl Session for MemorySession {
    fn execute(&mut self, query: &str, params: &[CqlValue]) -> MapperResult<u64> {
        self.check(query)?;
        trace!(query, "Executing");
        let statement = CqlParser::parse(query)?;
        let mut tables = lock(&self.inner.tables);
        Ok(apply(&mut tables, &statement, params)?)
    }

    fn execute_batch(&mut self, statements: &[Statement]) -> MapperResult<u64> {
        for statement in statements {
            self.check(&statement.query)?;
        }
        let parsed = statements
            .iter()
            .map(|s| CqlParser::parse(&s.query))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tables = lock(&self.inner.tables);
        let mut staged = tables.clone();
        let mut affected = 0;
        for (statement, source) in parsed.iter().zip(statements) {
            affected += apply(&mut staged, statement, &source.params)?;
        }
        *tables = staged;
        Ok(affected)
    }

    fn query(
        &mut self,
        query: &str,
        params: &[CqlValue],
        paging: Option<&Paging>,
    ) -> MapperResult<Box<dyn Rows + '_>> {
        self.check(query)?;
        trace!(query, "Querying");
        let statement = CqlParser::parse(query)?;
        let tables = lock(&self.inner.tables);
        Ok(Box::new(select(&tables, &statement, params, paging)?))
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.inner.released.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }
}

fn table_mut<'a>(
    tables: &'a mut HashMap<String, Table>,
    name: &str,
) -> Result<&'a mut Table, MemoryStoreError> {
    tables
        .get_mut(name)
        .ok_or_else(|| MemoryStoreError::UnknownTable(name.to_string()))
}

fn compare(left: &CqlValue, operator: ComparisonOperator, right: &CqlValue) -> bool {
    let ordering = || KeyPart::from(left).cmp(&KeyPart::from(right));
    match operator {
        ComparisonOperator::Equal => left.loosely_equals(right),
        ComparisonOperator::NotEqual => !left.loosely_equals(right),
        ComparisonOperator::GreaterThan => ordering() == Ordering::Greater,
        ComparisonOperator::GreaterThanOrEqual => ordering() != Ordering::Less,
        ComparisonOperator::LessThan => ordering() == Ordering::Less,
        ComparisonOperator::LessThanOrEqual => ordering() != Ordering::Greater,
    }
}

type Bound<'a> = (&'a WhereCondition, CqlValue);

fn bind_conditions<'a>(
    conditions: &'a [WhereCondition],
    params: &[CqlValue],
) -> Result<Vec<Bound<'a>>, MemoryStoreError> {
    conditions
        .iter()
        .map(|c| c.value.resolve(params).map(|v| (c, v)))
        .collect()
}

fn matches_all(row: &Row, conditions: &[Bound<'_>]) -> bool {
    conditions.iter().all(|(c, v)| {
        let stored = row.get(&c.column).unwrap_or(&CqlValue::Null);
        compare(stored, c.operator, v)
    })
}

/// Split predicates into the full primary key and the remaining conditions
fn split_key<'a>(
    table_name: &str,
    table: &Table,
    conditions: Vec<Bound<'a>>,
) -> Result<(RowKey, Vec<Bound<'a>>), MemoryStoreError> {
    let mut key_values = HashMap::new();
    let mut rest = Vec::new();
    for (condition, value) in conditions {
        if condition.operator == ComparisonOperator::Equal
            && table.key_columns.contains(&condition.column)
            && !key_values.contains_key(&condition.column)
        {
            key_values.insert(condition.column.clone(), value);
        } else {
            rest.push((condition, value));
        }
    }
    Ok((table.key_of(table_name, &key_values)?, rest))
}

fn apply(
    tables: &mut HashMap<String, Table>,
    statement: &CqlStatement,
    params: &[CqlValue],
) -> Result<u64, MemoryStoreError> {
    match statement {
        CqlStatement::Insert {
            table: name,
            columns,
            rows,
        } => {
            let table = table_mut(tables, name)?;
            for column in columns {
                table.note_column(column);
            }
            for operands in rows {
                let mut values = Row::with_capacity(columns.len());
                for (column, operand) in columns.iter().zip(operands) {
                    values.insert(column.clone(), operand.resolve(params)?);
                }
                let key = table.key_of(name, &values)?;
                let row = table.rows.entry(key).or_default();
                for (column, value) in values {
                    row.insert(column, value);
                }
            }
            Ok(rows.len() as u64)
        }
        CqlStatement::Update {
            table: name,
            assignments,
            where_clause,
        } => {
            let table = table_mut(tables, name)?;
            let bound = bind_conditions(where_clause, params)?;
            let (key, conditions) = split_key(name, table, bound)?;
            let values = assignments
                .iter()
                .map(|(column, operand)| operand.resolve(params).map(|v| (column.clone(), v)))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some((column, _)) = values.iter().find(|(c, _)| table.key_columns.contains(c)) {
                return Err(MemoryStoreError::Unsupported(format!(
                    "primary key column '{column}' cannot be assigned"
                )));
            }
            for (column, _) in &values {
                table.note_column(column);
            }

            match table.rows.get_mut(&key) {
                Some(row) => {
                    if !matches_all(row, &conditions) {
                        debug!(table = %name, "Update conditions not met");
                        return Ok(0);
                    }
                    row.extend(values);
                    Ok(1)
                }
                None if conditions.is_empty() => {
                    let mut row: Row = bind_key_values(where_clause, params, &table.key_columns)?
                        .into_iter()
                        .collect();
                    row.extend(values);
                    table.rows.insert(key, row);
                    Ok(1)
                }
                None => Ok(0),
            }
        }
        CqlStatement::Delete {
            table: name,
            where_clause,
        } => {
            let table = table_mut(tables, name)?;
            let bound = bind_conditions(where_clause, params)?;
            let (key, conditions) = split_key(name, table, bound)?;
            if !conditions.is_empty() {
                return Err(MemoryStoreError::Unsupported(
                    "delete supports primary key predicates only".to_string(),
                ));
            }
            Ok(u64::from(table.rows.remove(&key).is_some()))
        }
        CqlStatement::Select { .. } => Err(MemoryStoreError::Unsupported(
            "select must be run as a query".to_string(),
        )),
    }
}

/// Key column values as bound in the where clause
fn bind_key_values(
    conditions: &[WhereCondition],
    params: &[CqlValue],
    key_columns: &[String],
) -> Result<Vec<(String, CqlValue)>, MemoryStoreError> {
    let mut values = Vec::new();
    for condition in conditions {
        if condition.operator == ComparisonOperator::Equal
            && key_columns.contains(&condition.column)
            && !values.iter().any(|(c, _): &(String, CqlValue)| *c == condition.column)
        {
            values.push((condition.column.clone(), condition.value.resolve(params)?));
        }
    }
    Ok(values)
}

fn select(
    tables: &HashMap<String, Table>,
    statement: &CqlStatement,
    params: &[CqlValue],
    paging: Option<&Paging>,
) -> Result<MemoryRows, MemoryStoreError> {
    let CqlStatement::Select {
        columns,
        table: name,
        where_clause,
        order_by,
        limit,
    } = statement
    else {
        return Err(MemoryStoreError::Unsupported(
            "only select statements return rows".to_string(),
        ));
    };
    let table = tables
        .get(name)
        .ok_or_else(|| MemoryStoreError::UnknownTable(name.clone()))?;
    let conditions = bind_conditions(where_clause, params)?;

    let mut matched: Vec<(&RowKey, &Row)> = table
        .rows
        .iter()
        .filter(|(_, row)| matches_all(row, &conditions))
        .collect();

    if !order_by.is_empty() {
        matched.sort_by(|(_, a), (_, b)| {
            for (column, order) in order_by {
                let left = KeyPart::from(a.get(column).unwrap_or(&CqlValue::Null));
                let right = KeyPart::from(b.get(column).unwrap_or(&CqlValue::Null));
                let ordering = match order {
                    ClusteringOrder::Asc => left.cmp(&right),
                    ClusteringOrder::Desc => right.cmp(&left),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
    if let Some(limit) = limit {
        matched.truncate(*limit);
    }

    let page_size = paging.map_or(0, |p| p.page_size as usize);
    let state = match paging {
        Some(p) if !p.state.is_empty() => Some(
            serde_json::from_slice::<PageState>(&p.state)
                .map_err(|_| MemoryStoreError::InvalidPagingState)?,
        ),
        _ => None,
    };

    let start = match &state {
        None => 0,
        Some(PageState::Offset(offset)) => (*offset).min(matched.len()),
        Some(PageState::After(last)) => matched.iter().take_while(|(k, _)| *k <= last).count(),
    };
    let remaining = &matched[start..];
    let (page, more) = if page_size > 0 && remaining.len() > page_size {
        (&remaining[..page_size], true)
    } else {
        (remaining, false)
    };

    let next_state = if more {
        let state = if order_by.is_empty() {
            PageState::After(page[page.len() - 1].0.clone())
        } else {
            PageState::Offset(start + page.len())
        };
        serde_json::to_vec(&state).map_err(|e| MemoryStoreError::Unsupported(e.to_string()))?
    } else {
        Vec::new()
    };

    let columns = if columns.is_empty() {
        table.columns.clone()
    } else {
        columns.clone()
    };
    let data = page
        .iter()
        .map(|(_, row)| {
            columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(CqlValue::Null))
                .collect()
        })
        .collect();

    Ok(MemoryRows {
        columns,
        data,
        buffer: Vec::new(),
        cursor: 0,
        state: next_state,
    })
}

/// Materialised result; rows are handed out through one reused buffer
#[derive(Debug)]
pub struct MemoryRows {
    columns: Vec<String>,
    data: Vec<Vec<CqlValue>>,
    buffer: Vec<CqlValue>,
    cursor: usize,
    state: Vec<u8>,
}

impl Rows for MemoryRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> MapperResult<Option<&[CqlValue]>> {
        let Some(row) = self.data.get_mut(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        self.buffer.clear();
        self.buffer.append(row);
        Ok(Some(&self.buffer))
    }

    fn paging_state(&self) -> Vec<u8> {
        self.state.clone()
    }
}

//! Statements and their wire envelope

use crate::coercion::{date_indices, parse_dates};
use crate::{CqlValue, MapperResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bind marker used for every positional argument
pub const PARAM: &str = "?";

/// Query text plus positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub query: String,
    pub params: Vec<CqlValue>,
}

impl Statement {
    pub fn new<S: Into<String>>(query: S, params: Vec<CqlValue>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    /// Statement without bound arguments
    pub fn text<S: Into<String>>(query: S) -> Self {
        Self::new(query, Vec::new())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.query)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, "]")
    }
}

/// Transport form of a statement: JSON arguments plus the positions of
/// arguments that carry timestamps as text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireStatement {
    pub query: String,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<usize>,
}

impl WireStatement {
    pub fn from_statement(statement: &Statement) -> MapperResult<Self> {
        let params = statement
            .params
            .iter()
            .map(CqlValue::to_json)
            .collect::<MapperResult<Vec<_>>>()?;
        Ok(Self {
            query: statement.query.clone(),
            params,
            dates: date_indices(&statement.params),
        })
    }

    /// Convert to a bindable statement, re-parsing the listed date arguments
    pub fn into_statement(self) -> Statement {
        let mut params: Vec<CqlValue> = self.params.into_iter().map(CqlValue::from_json).collect();
        parse_dates(&mut params, &self.dates);
        Statement::new(self.query, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_wire_round_trip_restores_timestamps() {
        let ts = Utc.with_ymd_and_hms(2023, 7, 4, 8, 0, 0).unwrap();
        let statement = Statement::new(
            "update events set at=? where id=?",
            vec![CqlValue::Timestamp(ts), CqlValue::from("e1")],
        );

        let wire = WireStatement::from_statement(&statement).unwrap();
        assert_eq!(wire.dates, vec![0]);
        assert_eq!(wire.params[0], json!("2023-07-04T08:00:00Z"));

        let encoded = serde_json::to_string(&wire).unwrap();
        let decoded: WireStatement = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.into_statement(), statement);
    }

    #[test]
    fn test_dates_omitted_when_empty() {
        let wire = WireStatement::from_statement(&Statement::text("select * from t")).unwrap();
        let encoded = serde_json::to_value(&wire).unwrap();
        assert_eq!(encoded, json!({"query": "select * from t", "params": []}));

        let decoded: WireStatement = serde_json::from_value(json!({"query": "select 1"})).unwrap();
        assert!(decoded.params.is_empty() && decoded.dates.is_empty());
    }
}

//! Literal inlining and timestamp re-parsing for bound arguments

use crate::CqlValue;
use chrono::{DateTime, NaiveDateTime, Utc};

const UTC_LAYOUT: &str = "%Y-%m-%dT%H:%M:%SZ";
const OFFSET_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%z";
const FRACTION_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// `2006-01-02T15:04:05Z`
const UTC_LEN: usize = 20;
/// `2006-01-02T15:04:05-0700`
const OFFSET_LEN: usize = 24;
/// `2006-01-02T15:04:05.0000000-0700`
const FRACTION_LEN: usize = 32;

/// Literal text for values that can be inlined into statement text.
///
/// Empty text, booleans and signed integers are inlined; everything else
/// returns `None` and must be bound. Null is handled by the builder, not here.
pub fn literal_or_bind(value: &CqlValue) -> Option<String> {
    match value {
        CqlValue::Text(s) if s.is_empty() => Some("''".to_string()),
        CqlValue::Boolean(b) => Some(b.to_string()),
        CqlValue::Tinyint(_) | CqlValue::Smallint(_) | CqlValue::Int(_) | CqlValue::Bigint(_) => {
            value.as_i64().map(|n| n.to_string())
        }
        _ => None,
    }
}

/// Re-parse text arguments at `indices` as timestamps.
///
/// This is a length heuristic: only strings whose length is exactly 20, 24
/// or 32 characters are tried against the matching layout, and a string that
/// happens to have one of those lengths without being a timestamp is left
/// as text. An index past the end stops processing.
pub fn parse_dates(params: &mut [CqlValue], indices: &[usize]) {
    for &index in indices {
        let Some(param) = params.get_mut(index) else {
            break;
        };
        let parsed = match param {
            CqlValue::Text(s) => parse_timestamp(s),
            _ => None,
        };
        if let Some(ts) = parsed {
            *param = CqlValue::Timestamp(ts);
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    match s.len() {
        UTC_LEN => NaiveDateTime::parse_from_str(s, UTC_LAYOUT)
            .ok()
            .map(|naive| naive.and_utc()),
        OFFSET_LEN => DateTime::parse_from_str(s, OFFSET_LAYOUT)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        FRACTION_LEN => DateTime::parse_from_str(s, FRACTION_LAYOUT)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        _ => None,
    }
}

/// Positions of timestamp arguments, for the wire envelope
pub fn date_indices(params: &[CqlValue]) -> Vec<usize> {
    params
        .iter()
        .enumerate()
        .filter(|(_, p)| matches!(p, CqlValue::Timestamp(_)))
        .map(|(i, _)| i)
        .collect()
}

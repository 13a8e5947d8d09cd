//! Cursor pagination
//!
//! Page tokens are the store's raw continuation state, hex encoded. An empty
//! token starts from the beginning; an empty next token means there are no
//! further pages.

use crate::entity::Entity;
use crate::scan::{FieldsIndex, ScanIter};
use crate::session::{Paging, SessionGuard, SessionProvider};
use crate::statement::Statement;
use crate::{MapperError, MapperResult};
use tracing::{debug, warn};

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; empty when this was the last one
    pub next: String,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next.is_empty()
    }
}

pub fn decode_cursor(token: &str) -> MapperResult<Vec<u8>> {
    hex::decode(token).map_err(|e| {
        warn!(token, error = %e, "Rejected page token");
        MapperError::BadCursor(format!("'{token}': {e}"))
    })
}

pub fn encode_cursor(state: &[u8]) -> String {
    hex::encode(state)
}

/// Run `statement` for one page of at most `page_size` rows, starting at
/// `cursor`.
///
/// The token is decoded before a session is acquired, so a bad token never
/// reaches the store. The page size is advisory to the store.
pub fn paged_scan<T: Entity>(
    provider: &dyn SessionProvider,
    statement: &Statement,
    index: Option<&FieldsIndex>,
    page_size: u32,
    cursor: &str,
) -> MapperResult<Page<T>> {
    let paging = Paging {
        page_size,
        state: decode_cursor(cursor)?,
    };

    let mut session = SessionGuard::acquire(provider)?;
    let mut rows = session.query(&statement.query, &statement.params, Some(&paging))?;
    let items = ScanIter::new(rows.as_mut(), index).collect::<MapperResult<Vec<T>>>()?;
    let next = encode_cursor(&rows.paging_state());

    debug!(rows = items.len(), page_size, last = next.is_empty(), "Scanned page");
    Ok(Page { items, next })
}

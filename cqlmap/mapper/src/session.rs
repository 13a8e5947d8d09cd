//! Session contract
//!
//! A [`SessionProvider`] hands out short-lived sessions; every operation in
//! this crate acquires one per call through [`SessionGuard`] so the session
//! is released on every return path.

use crate::statement::Statement;
use crate::{CqlValue, MapperResult};
use std::ops::{Deref, DerefMut};
use tracing::trace;

/// Paging request passed to [`Session::query`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paging {
    pub page_size: u32,
    /// Raw continuation state from a previous page; empty for the first page
    pub state: Vec<u8>,
}

/// Source of sessions
pub trait SessionProvider: Send + Sync {
    fn acquire(&self) -> MapperResult<Box<dyn Session>>;
}

/// A session against the store
pub trait Session: Send {
    /// Execute a write; returns rows affected as far as the store reports
    fn execute(&mut self, query: &str, params: &[CqlValue]) -> MapperResult<u64>;

    /// Execute several statements as one dispatch
    fn execute_batch(&mut self, statements: &[Statement]) -> MapperResult<u64>;

    fn query(
        &mut self,
        query: &str,
        params: &[CqlValue],
        paging: Option<&Paging>,
    ) -> MapperResult<Box<dyn Rows + '_>>;

    fn release(&mut self);
}

/// Result rows of a query
pub trait Rows {
    fn columns(&self) -> &[String];

    /// Next row, or `None` when the result (or page) is exhausted.
    ///
    /// The slice borrows a buffer the implementation may reuse for the next
    /// row; copy anything that must outlive the call.
    fn next_row(&mut self) -> MapperResult<Option<&[CqlValue]>>;

    /// Continuation state after the last row of a page; empty when no
    /// further page exists
    fn paging_state(&self) -> Vec<u8>;
}

/// Scoped session: released when dropped
pub struct SessionGuard {
    session: Box<dyn Session>,
}

impl SessionGuard {
    pub fn acquire(provider: &dyn SessionProvider) -> MapperResult<Self> {
        let session = provider.acquire()?;
        trace!("Session acquired");
        Ok(Self { session })
    }
}

impl Deref for SessionGuard {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.release();
        trace!("Session released");
    }
}

/// Execute one statement on a fresh session
pub fn execute(provider: &dyn SessionProvider, statement: &Statement) -> MapperResult<u64> {
    let mut session = SessionGuard::acquire(provider)?;
    session.execute(&statement.query, &statement.params)
}

/// Execute statements as one dispatch on a fresh session
pub fn execute_batch(provider: &dyn SessionProvider, statements: &[Statement]) -> MapperResult<u64> {
    let mut session = SessionGuard::acquire(provider)?;
    session.execute_batch(statements)
}

//! In-memory reference store
//!
//! Implements the session contract over ordered in-process tables so the
//! mapper can be exercised end to end without a cluster.

pub mod parser;
pub mod store;

pub use parser::{CqlParser, CqlStatement};
pub use store::{MemoryRows, MemorySession, MemoryStore, MemoryStoreError};

//! Shared types for cqlmap
//!
//! The dynamic value model, the error taxonomy, configuration and logging
//! setup used by the mapper crate.

pub mod config;
pub mod error;
pub mod logging;
pub mod value;

pub use config::{BatchDispatch, MapperConfig, VersionCheck};
pub use error::{MapperError, MapperResult};
pub use value::{CqlValue, FieldMap};

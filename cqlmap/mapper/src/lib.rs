//! Typed CRUD and query surface over a wide-column store
//!
//! Record types describe themselves through [`Entity`] (usually via the
//! [`entity!`] macro). From that description the mapper derives a cached
//! [`Schema`], builds statement text with inlined literals and `?` bindings,
//! scans result rows back into records or field maps, and pages through
//! results with hex cursor tokens.
//!
//! ```
//! use cqlmap_mapper::{entity, Dao, MemoryStore};
//! use std::sync::Arc;
//!
//! entity! {
//!     #[derive(Debug, Clone, Default, PartialEq)]
//!     pub struct User {
//!         pub id: String => "primary_key",
//!         pub name: String,
//!         pub version: i64 => "version",
//!     }
//! }
//!
//! let store = MemoryStore::new();
//! store.create_table("users", &["id"]);
//! let users = Dao::<User, String>::new(Arc::new(store), "users").unwrap();
//! users.insert(&User { id: "u1".into(), name: "Ada".into(), version: 0 }).unwrap();
//! assert_eq!(users.load(&"u1".to_string()).unwrap().unwrap().version, 1);
//! ```

pub mod batch;
pub mod builder;
pub mod coercion;
pub mod cursor;
pub mod dao;
pub mod entity;
pub mod export;
pub mod loader;
pub mod memory;
pub mod passcode;
pub mod scan;
pub mod schema;
pub mod search;
pub mod session;
pub mod statement;
pub mod stream_writer;
pub mod writer;

pub use cqlmap_shared::{
    config, logging, BatchDispatch, CqlValue, FieldMap, MapperConfig, MapperError, MapperResult,
    VersionCheck,
};

pub use batch::{BatchMode, BatchOutcome, BatchWriter};
pub use builder::Key;
pub use cursor::Page;
pub use dao::{Dao, Identifier, RecordKey};
pub use entity::{Entity, FieldDescriptor, FromCql, ToCql, TypeDescriptor, TypeShape};
pub use export::Exporter;
pub use loader::{Loader, Mapper};
pub use memory::MemoryStore;
pub use passcode::PasscodeRepository;
pub use scan::{query_map, to_camel_case, MapScan};
pub use schema::{schema_of, FieldMeta, Schema};
pub use search::SearchBuilder;
pub use session::{Paging, Rows, Session, SessionGuard, SessionProvider};
pub use statement::{Statement, WireStatement};
pub use stream_writer::StreamWriter;
pub use writer::Writer;

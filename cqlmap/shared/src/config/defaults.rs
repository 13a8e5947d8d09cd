//! Default configuration constants
//!
//! Single source of truth for the default values used by `MapperConfig`.

// ===== Paging Defaults =====

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 1000;

// ===== Batch Processing Defaults =====

pub const DEFAULT_BATCH_SIZE: usize = 100;

// ===== Logging Defaults =====

pub const DEFAULT_LOG_LEVEL: &str = "info";

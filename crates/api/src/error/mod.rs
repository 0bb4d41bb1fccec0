// Path: crates/api/src/error/mod.rs
// Re-export all core error types from the central types crate.
pub use tally_types::error::{
    CollaboratorError, ConfigError, EndBlockError, ErrorCode, TallyError, VmError,
};
pub use tally_types::Result;

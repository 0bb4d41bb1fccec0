// Path: crates/api/src/lib.rs

//! # Tally API Crate Lints
//!
//! This crate enforces a strict set of lints to ensure high-quality,
//! panic-free, and well-documented code. Panics are disallowed in non-test
//! code to promote robust error handling.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]
//! # Tally API
//!
//! The read-only collaborator contracts the tally engine is constructed with.
//! The engine never reaches for ambient state: the ledger, the registries, the
//! VM sandbox and the event stream are all handed to it through these traits.

/// Re-exports all core error types from the central `tally-types` crate.
pub mod error;
/// Traits for the ledger side: pending requests, result batching and events.
pub mod ledger;
/// Read-only lookups of data proxy configurations and oracle programs.
pub mod registry;
/// The `TallyVm` sandbox contract.
pub mod vm;

/// A curated set of the most commonly used traits and types.
pub mod prelude {
    pub use crate::error::{CollaboratorError, ErrorCode, TallyError, VmError};
    pub use crate::ledger::{EventSink, PendingRequests, RequestSource, ResultSink};
    pub use crate::registry::{DataProxyConfig, ProgramStore, ProxyRegistry};
    pub use crate::vm::{TallyVm, VmResult};
}

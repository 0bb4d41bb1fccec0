// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Tally Types
//!
//! This crate is the foundational library for the oracle tally engine, containing
//! the request and result data model, the consensus-critical numeric primitives,
//! the filter payload codec, configuration objects, and all error types.
//!
//! ## Architectural Role
//!
//! As the base crate, `tally-types` has minimal dependencies and is itself a
//! dependency for every other crate in the workspace. Every type that crosses a
//! collaborator boundary (requests in, distributions and data results out) is
//! defined here so that all validators agree on a single canonical shape.

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::TallyError> = std::result::Result<T, E>;

/// Application-level data structures: requests, reveals, filters, distributions and data results.
pub mod app;
/// Shared configuration structures (e.g., `TallyParams`).
pub mod config;
/// A unified set of all error types used across the tally engine.
pub mod error;
/// Fixed-point and half-step integer arithmetic used by the outlier filters.
pub mod numeric;

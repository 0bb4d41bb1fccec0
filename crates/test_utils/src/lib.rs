// Path: crates/test_utils/src/lib.rs
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

//! # Tally Test Utilities
//!
//! In-memory collaborators and request fixtures for testing the tally engine.

pub mod assertions;
pub mod fixtures;
pub mod mocks;

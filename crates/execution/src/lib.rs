// Path: crates/execution/src/lib.rs
//! # Tally Execution Crate Lints
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
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]
//! # Tally Execution
//!
//! This crate provides the end-block tally pipeline: it decides whether the
//! executors of each pending data request agree, filters outliers from their
//! reveals, runs the tally program and converts the outcome into burns and
//! rewards. Every step is a pure function of on-chain inputs so that all
//! validators produce byte-identical results.

pub mod tally;

pub use crate::tally::end_block::{BlockContext, EndBlockOutcome, TallyCollaborators, TallyEngine};

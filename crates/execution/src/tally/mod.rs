// Path: crates/execution/src/tally/mod.rs
//! The tally pipeline, leaves first.

/// Basic consensus on `(success, proxy keys)` and the gas-metered filter pipeline.
pub mod consensus;
/// Drives the per-block tally pass over all pending requests.
pub mod end_block;
/// Outlier filters (`None`, `Mode`, `MAD`).
pub mod filter;
/// Per-request tally and execution gas budgets.
pub mod gas_meter;
/// Data proxy and executor gas metering.
pub mod metering;
/// Conversion of a settled gas meter into distributions and audit events.
pub mod payout;
/// Extraction of comparable values from reveal payloads.
pub mod reveals;
/// Batched, parallel execution of tally programs.
pub mod vm;

pub use consensus::{execute_filter, FilterResult};
pub use gas_meter::GasMeter;

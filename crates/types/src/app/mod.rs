// Path: crates/types/src/app/mod.rs
//! Application-level data structures exchanged with the tally engine's collaborators.

/// The `DataResult` handed to the batching collaborator, and its canonical hash.
pub mod data_result;
/// Burn and reward messages produced from a settled gas meter.
pub mod distribution;
/// Event types and attribute keys emitted during a tally pass.
pub mod events;
/// Exit codes assigned by the tally engine itself.
pub mod exit_code;
/// The consensus filter wire format.
pub mod filter;
/// Data requests and the reveals submitted for them.
pub mod request;

pub use data_result::DataResult;
pub use distribution::{remove_data_requests_message, Distribution};
pub use events::{Event, EventAttribute};
pub use filter::{FilterInput, FilterKind, NumberType};
pub use request::{Request, Reveal, RevealBody};

// Path: crates/api/src/ledger/mod.rs
//! Defines the traits through which the tally engine talks to the ledger.

use serde::{Deserialize, Serialize};
use tally_types::app::{DataResult, Event, Request};
use tally_types::error::CollaboratorError;

/// A page of tally-ready requests together with the core contract's pause state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequests {
    /// Whether the core contract is paused. A paused contract refunds every request.
    pub is_paused: bool,
    /// Requests ready to be tallied, in the order the ledger returned them.
    pub requests: Vec<Request>,
}

/// The ledger-side store of data requests.
pub trait RequestSource: Send + Sync {
    /// Returns at most `limit` requests that are ready to be tallied.
    fn fetch_tally_ready(&self, limit: u32) -> Result<PendingRequests, CollaboratorError>;

    /// Finalizes the given requests. `message` is the JSON removal notification
    /// carrying every request's distribution list.
    fn remove_data_requests(&self, message: &[u8]) -> Result<(), CollaboratorError>;
}

/// Receives data results to be batched and signed by validators.
pub trait ResultSink: Send + Sync {
    /// Stores the data results of a tally pass for inclusion in the next batch.
    ///
    /// Either every result is stored or, when an error is returned, none is.
    fn set_data_results_for_batching(&self, results: &[DataResult]) -> Result<(), CollaboratorError>;
}

/// Receives the events emitted during a tally pass.
pub trait EventSink: Send + Sync {
    /// Emits a single event. Events are delivered in emission order.
    fn emit(&self, event: Event);
}

// Path: crates/types/src/app/events.rs

//! Events emitted by the tally engine. All attribute values are strings; numbers
//! are rendered in decimal unless noted otherwise.

use serde::{Deserialize, Serialize};

/// Emitted once per request after its data result is stored.
pub const EVENT_TYPE_TALLY_COMPLETION: &str = "tally_completion";
/// Audit trail of every amount read from a request's gas meter.
pub const EVENT_TYPE_GAS_METER: &str = "gas_meter";
/// Emitted per committer when a request timed out without enough reveals.
pub const EVENT_TYPE_EXECUTOR_REWARD_COMMIT: &str = "executor_reward_commit";

/// Hex-encoded request ID.
pub const ATTRIBUTE_DATA_REQUEST_ID: &str = "dr_id";
/// Height at which the request was posted.
pub const ATTRIBUTE_DATA_REQUEST_HEIGHT: &str = "dr_height";
/// Hex-encoded data result ID.
pub const ATTRIBUTE_DATA_RESULT_ID: &str = "id";
/// Whether consensus was reached.
pub const ATTRIBUTE_CONSENSUS: &str = "consensus";
/// Tally VM standard output, newline-joined.
pub const ATTRIBUTE_TALLY_VM_STDOUT: &str = "tally_vm_stdout";
/// Tally VM standard error, newline-joined.
pub const ATTRIBUTE_TALLY_VM_STDERR: &str = "tally_vm_stderr";
/// Execution gas consumed by the request.
pub const ATTRIBUTE_EXEC_GAS_USED: &str = "exec_gas_used";
/// Tally gas consumed by the request.
pub const ATTRIBUTE_TALLY_GAS_USED: &str = "tally_gas_used";
/// Exit code of the request, as two lowercase hex digits.
pub const ATTRIBUTE_TALLY_EXIT_CODE: &str = "exit_code";
/// Data proxy public keys in basic consensus, newline-joined.
pub const ATTRIBUTE_PROXY_PUBLIC_KEYS: &str = "proxy_public_keys";
/// Public key of an executor.
pub const ATTRIBUTE_EXECUTOR: &str = "executor";
/// A token or gas amount.
pub const ATTRIBUTE_AMOUNT: &str = "amount";
/// Whether the request timed out waiting for reveals.
pub const ATTRIBUTE_TIMED_OUT: &str = "timed_out";
/// Whether the request was settled in reduced payout mode.
pub const ATTRIBUTE_REDUCED_PAYOUT: &str = "reduced_payout";
/// Tally gas burned.
pub const ATTRIBUTE_TALLY_GAS: &str = "tally_gas";
/// `public_key,payout_address,gas` of a data proxy payout.
pub const ATTRIBUTE_DATA_PROXY_GAS: &str = "data_proxy_gas";
/// `identity,gas` of an executor payout.
pub const ATTRIBUTE_EXECUTOR_GAS: &str = "executor_gas";
/// Gas burned from executor payouts in reduced payout mode.
pub const ATTRIBUTE_REDUCED_PAYOUT_BURN: &str = "reduced_payout_burn";

/// A key-value pair attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: String,
}

/// A typed event with an ordered list of attributes. Keys may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `tally_completion`.
    pub kind: String,
    /// Attributes in emission order.
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// Creates an event without attributes.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute and returns the event.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push_attribute(key, value);
        self
    }

    /// Appends an attribute.
    pub fn push_attribute(&mut self, key: impl Into<String>, value: impl ToString) {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.to_string(),
        });
    }

    /// The first value recorded under `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// Every value recorded under `key`, in emission order.
    pub fn attributes_named<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes
            .iter()
            .filter(move |a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

// Path: crates/types/src/error/mod.rs
//! Core error types for the tally engine.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised while filtering reveals or preparing a tally program run.
///
/// Each variant carries a registered numeric code (see [`TallyError::registered_code`])
/// so that results remain comparable across validators and releases.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    /// The first byte of the filter input does not name a known filter.
    #[error("invalid filter type")]
    InvalidFilterType,
    /// The filter input is shorter than the fixed header of its filter type.
    #[error("filter input length too short: {got} < {expected}")]
    FilterInputTooShort {
        /// Minimum length required by the filter type.
        expected: usize,
        /// Actual length of the filter input.
        got: usize,
    },
    /// The encoded JSON path length does not match the bytes that follow it.
    #[error("invalid JSON path length: expected {expected} got {got}")]
    InvalidPathLen {
        /// Length declared in the filter input.
        expected: u64,
        /// Number of path bytes actually present.
        got: usize,
    },
    /// The MAD filter names a number type this engine does not know.
    #[error("invalid number type specified: {0:#04x}")]
    InvalidNumberType(u8),
    /// The filter could not be constructed from the requestor's input.
    #[error("invalid filter input: {0}")]
    InvalidFilterInput(String),
    /// A tally gas charge exceeded the remaining tally gas.
    #[error("out of tally gas")]
    OutOfTallyGas,
    /// At least 2/3 of the reveals agree on having failed.
    #[error("consensus in error")]
    ConsensusInError,
    /// More than 1/3 of the reveals do not agree on the reveal data.
    #[error("> 1/3 of reveals do not agree on reveal data")]
    NoConsensus,
    /// More than 1/3 of the reveals do not agree on (exit_code_success, proxy_pub_keys).
    #[error("> 1/3 of reveals do not agree on (exit_code_success, proxy_pub_keys)")]
    NoBasicConsensus,
    /// The request's payback address is not valid base64.
    #[error("failed to decode payback address: {0}")]
    DecodingPaybackAddress(String),
    /// The tally program could not be loaded from the program store.
    #[error("failed to find tally program: {0}")]
    FindingTallyProgram(String),
    /// The request's tally inputs are not valid base64.
    #[error("failed to decode tally inputs: {0}")]
    DecodingTallyInputs(String),
    /// The tally VM arguments could not be serialized.
    #[error("failed to construct tally VM arguments: {0}")]
    ConstructingTallyVmArgs(String),
    /// More than 1/3 of the reveals could not be parsed into the expected value.
    #[error("> 1/3 of reveals are corrupted")]
    CorruptReveals,
    /// A filter was asked to run over an empty reveal set.
    #[error("no reveals to filter")]
    EmptyReveals,
    /// The request's posted gas price is not a positive integer.
    #[error("invalid gas price: {0}")]
    InvalidGasPrice(String),
    /// A data result field could not be decoded while computing its hash.
    #[error("failed to hash data result: {0}")]
    HashingDataResult(String),
}

impl TallyError {
    /// The numeric code registered for this error in the tally codespace.
    pub fn registered_code(&self) -> u32 {
        match self {
            Self::InvalidFilterType => 2,
            Self::FilterInputTooShort { .. } => 3,
            Self::InvalidPathLen { .. } => 4,
            Self::InvalidNumberType(_) => 5,
            Self::InvalidFilterInput(_) => 6,
            Self::OutOfTallyGas => 7,
            Self::ConsensusInError => 8,
            Self::NoConsensus => 9,
            Self::NoBasicConsensus => 10,
            Self::DecodingPaybackAddress(_) => 11,
            Self::FindingTallyProgram(_) => 12,
            Self::DecodingTallyInputs(_) => 13,
            Self::ConstructingTallyVmArgs(_) => 14,
            Self::CorruptReveals => 15,
            Self::EmptyReveals => 16,
            Self::InvalidGasPrice(_) => 17,
            Self::HashingDataResult(_) => 18,
        }
    }
}

impl ErrorCode for TallyError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidFilterType => "TALLY_INVALID_FILTER_TYPE",
            Self::FilterInputTooShort { .. } => "TALLY_FILTER_INPUT_TOO_SHORT",
            Self::InvalidPathLen { .. } => "TALLY_INVALID_PATH_LEN",
            Self::InvalidNumberType(_) => "TALLY_INVALID_NUMBER_TYPE",
            Self::InvalidFilterInput(_) => "TALLY_INVALID_FILTER_INPUT",
            Self::OutOfTallyGas => "TALLY_OUT_OF_TALLY_GAS",
            Self::ConsensusInError => "TALLY_CONSENSUS_IN_ERROR",
            Self::NoConsensus => "TALLY_NO_CONSENSUS",
            Self::NoBasicConsensus => "TALLY_NO_BASIC_CONSENSUS",
            Self::DecodingPaybackAddress(_) => "TALLY_DECODING_PAYBACK_ADDRESS",
            Self::FindingTallyProgram(_) => "TALLY_FINDING_TALLY_PROGRAM",
            Self::DecodingTallyInputs(_) => "TALLY_DECODING_TALLY_INPUTS",
            Self::ConstructingTallyVmArgs(_) => "TALLY_CONSTRUCTING_TALLY_VM_ARGS",
            Self::CorruptReveals => "TALLY_CORRUPT_REVEALS",
            Self::EmptyReveals => "TALLY_EMPTY_REVEALS",
            Self::InvalidGasPrice(_) => "TALLY_INVALID_GAS_PRICE",
            Self::HashingDataResult(_) => "TALLY_HASHING_DATA_RESULT",
        }
    }
}

/// Errors reported by the tally VM sandbox.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// The sandbox could not be started or crashed outside the program's control.
    #[error("VM sandbox unavailable: {0}")]
    Unavailable(String),
    /// The program could not be instantiated (e.g., malformed bytecode).
    #[error("VM initialization failed: {0}")]
    Initialization(String),
}

impl ErrorCode for VmError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "VM_UNAVAILABLE",
            Self::Initialization(_) => "VM_INITIALIZATION_FAILED",
        }
    }
}

/// Errors reported by external collaborators (ledger, registries, stores).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The requested item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The collaborator's backend failed.
    #[error("Backend error: {0}")]
    Backend(String),
    /// A payload exchanged with the collaborator could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl ErrorCode for CollaboratorError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "COLLABORATOR_NOT_FOUND",
            Self::Backend(_) => "COLLABORATOR_BACKEND_ERROR",
            Self::Encoding(_) => "COLLABORATOR_ENCODING_ERROR",
        }
    }
}

/// Errors that abort an end-block tally pass.
///
/// These never escape the end-block boundary; they are logged and the pass is
/// converted into a no-op so that block production continues.
#[derive(Error, Debug)]
pub enum EndBlockError {
    /// The tally-ready requests could not be fetched.
    #[error("failed to fetch tally-ready data requests: {0}")]
    FetchRequests(#[source] CollaboratorError),
    /// The removal notification could not be serialized.
    #[error("failed to marshal remove data requests: {0}")]
    MarshalRemoval(String),
    /// The ledger rejected the removal notification.
    #[error("failed to notify ledger of tally completion: {0}")]
    NotifyRemoval(#[source] CollaboratorError),
    /// The data results of the pass could not be stored for batching.
    #[error("failed to store data results for batching: {0}")]
    StoreResults(#[source] CollaboratorError),
    /// A data result could not be hashed.
    #[error("failed to compute data result id for request {request_id}: {source}")]
    Hashing {
        /// The request whose result failed to hash.
        request_id: String,
        /// The underlying hashing error.
        #[source]
        source: TallyError,
    },
}

impl ErrorCode for EndBlockError {
    fn code(&self) -> &'static str {
        match self {
            Self::FetchRequests(_) => "END_BLOCK_FETCH_REQUESTS",
            Self::MarshalRemoval(_) => "END_BLOCK_MARSHAL_REMOVAL",
            Self::NotifyRemoval(_) => "END_BLOCK_NOTIFY_REMOVAL",
            Self::StoreResults(_) => "END_BLOCK_STORE_RESULTS",
            Self::Hashing { .. } => "END_BLOCK_HASHING",
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The burn ratio is not a decimal number in `[0, 1]`.
    #[error("invalid burn ratio: {0}")]
    InvalidBurnRatio(String),
    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidBurnRatio(_) => "CONFIG_INVALID_BURN_RATIO",
            Self::Parse(_) => "CONFIG_PARSE_ERROR",
            Self::Invalid(_) => "CONFIG_INVALID",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_codes_are_stable() {
        assert_eq!(TallyError::InvalidFilterType.registered_code(), 2);
        assert_eq!(TallyError::NoConsensus.registered_code(), 9);
        assert_eq!(TallyError::NoBasicConsensus.registered_code(), 10);
        assert_eq!(
            TallyError::ConstructingTallyVmArgs(String::new()).registered_code(),
            14
        );
    }

    #[test]
    fn messages_carry_context() {
        let err = TallyError::InvalidPathLen {
            expected: 13,
            got: 12,
        };
        assert_eq!(err.to_string(), "invalid JSON path length: expected 13 got 12");
        assert_eq!(err.code(), "TALLY_INVALID_PATH_LEN");

        let wrapped = TallyError::InvalidFilterInput(err.to_string());
        assert!(wrapped.to_string().starts_with("invalid filter input: "));
    }
}

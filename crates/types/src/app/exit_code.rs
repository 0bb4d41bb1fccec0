// Path: crates/types/src/app/exit_code.rs

//! Exit codes assigned by the tally engine. Codes below 200 are reserved for the
//! tally program itself.

/// Fewer commits than the replication factor were received.
pub const TALLY_EXIT_CODE_NOT_ENOUGH_COMMITS: u32 = 200;
/// Fewer reveals than the replication factor were received.
pub const TALLY_EXIT_CODE_NOT_ENOUGH_REVEALS: u32 = 201;
/// The core contract is paused and the request was refunded.
pub const TALLY_EXIT_CODE_CONTRACT_PAUSED: u32 = 202;
/// The filter input could not be turned into a filter.
pub const TALLY_EXIT_CODE_INVALID_FILTER_INPUT: u32 = 252;
/// The request could not be processed at all and was refunded.
pub const TALLY_EXIT_CODE_INVALID_REQUEST: u32 = 253;
/// The filter ran but did not produce a usable outcome.
pub const TALLY_EXIT_CODE_FILTER_ERROR: u32 = 254;
/// The tally program could not be executed.
pub const TALLY_EXIT_CODE_EXEC_ERROR: u32 = 255;

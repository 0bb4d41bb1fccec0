// Path: crates/api/src/vm/mod.rs
//! Defines the contract of the sandbox that runs tally programs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_types::error::VmError;

/// The outcome of a single tally program run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmResult {
    /// Exit code of the program.
    pub exit_code: u32,
    /// Human-readable description of the exit code.
    pub exit_message: String,
    /// Result bytes written by the program, if any.
    pub result: Option<Vec<u8>>,
    /// Lines written to standard output.
    pub stdout: Vec<String>,
    /// Lines written to standard error.
    pub stderr: Vec<String>,
    /// Tally gas consumed by the program.
    pub gas_used: u64,
}

/// A sandboxed, deterministic executor of tally programs.
///
/// Implementations must be safe to call from several worker threads at once;
/// the engine fans batches of programs out to a bounded pool.
pub trait TallyVm: Send + Sync {
    /// Runs `bytecode` with the given positional arguments and environment.
    ///
    /// A program that fails on its own terms returns `Ok` with a non-zero exit
    /// code. `Err` is reserved for failures of the sandbox itself.
    fn execute(
        &self,
        bytecode: &[u8],
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<VmResult, VmError>;
}

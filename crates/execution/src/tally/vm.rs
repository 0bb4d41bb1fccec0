// Path: crates/execution/src/tally/vm.rs

//! Runs tally programs in the VM sandbox.
//!
//! Inputs are resolved up front; an item whose program or inputs cannot be
//! resolved gets its own error and never affects the rest of the batch. The
//! programs of one batch then run on the rayon pool, each writing into the
//! result slot at its own index.

use super::consensus::FilterResult;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tally_api::registry::ProgramStore;
use tally_api::vm::{TallyVm, VmResult};
use tally_types::app::exit_code::TALLY_EXIT_CODE_EXEC_ERROR;
use tally_types::app::{Request, Reveal};
use tally_types::error::TallyError;

/// Everything needed to run the tally program of one request.
#[derive(Debug, Clone, Copy)]
pub struct TallyExecItem<'a> {
    /// The request being tallied.
    pub request: &'a Request,
    /// The request's reveals, sorted by executor.
    pub reveals: &'a [Reveal],
    /// The filter outcome for `reveals`.
    pub filter_result: &'a FilterResult,
    /// Tally gas left on the request's meter, exposed to the program.
    pub remaining_tally_gas: u64,
}

/// A tally program run that is ready to be handed to the VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTally {
    /// Program bytecode.
    pub bytecode: Vec<u8>,
    /// `[hex(tally_inputs), json(reveals), json(outliers)]`.
    pub args: Vec<String>,
    /// Environment variables describing the request.
    pub env: BTreeMap<String, String>,
}

/// A reveal as presented to the tally program.
#[derive(Serialize)]
struct VmReveal<'a> {
    executor: &'a str,
    id: &'a str,
    salt: &'a [u8],
    exit_code: u8,
    gas_used: u64,
    reveal: Vec<u8>,
    proxy_public_keys: &'a [String],
}

/// Builds the positional arguments of a tally program.
pub fn tally_vm_args(
    tally_inputs: &[u8],
    reveals: &[Reveal],
    outliers: &[bool],
) -> Result<Vec<String>, TallyError> {
    let vm_reveals = reveals
        .iter()
        .map(|r| {
            let reveal = STANDARD
                .decode(r.body.reveal.as_bytes())
                .map_err(|e| TallyError::ConstructingTallyVmArgs(e.to_string()))?;
            Ok(VmReveal {
                executor: &r.executor,
                id: &r.body.id,
                salt: &r.body.salt,
                exit_code: r.body.exit_code,
                gas_used: r.body.gas_used,
                reveal,
                proxy_public_keys: &r.body.proxy_public_keys,
            })
        })
        .collect::<Result<Vec<_>, TallyError>>()?;
    let reveals_json = serde_json::to_string(&vm_reveals)
        .map_err(|e| TallyError::ConstructingTallyVmArgs(e.to_string()))?;

    let outlier_flags: Vec<u8> = outliers.iter().map(|o| u8::from(*o)).collect();
    let outliers_json = serde_json::to_string(&outlier_flags)
        .map_err(|e| TallyError::ConstructingTallyVmArgs(e.to_string()))?;

    Ok(vec![hex::encode(tally_inputs), reveals_json, outliers_json])
}

/// Runs tally programs against a program store and a VM sandbox.
#[derive(Clone)]
pub struct TallyProgramExecutor {
    programs: Arc<dyn ProgramStore>,
    vm: Arc<dyn TallyVm>,
    batch_size: usize,
    max_result_size: usize,
}

impl std::fmt::Debug for TallyProgramExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TallyProgramExecutor")
            .field("batch_size", &self.batch_size)
            .field("max_result_size", &self.max_result_size)
            .finish_non_exhaustive()
    }
}

impl TallyProgramExecutor {
    /// Creates an executor running at most `batch_size` programs concurrently.
    pub fn new(
        programs: Arc<dyn ProgramStore>,
        vm: Arc<dyn TallyVm>,
        batch_size: usize,
        max_result_size: usize,
    ) -> Self {
        Self {
            programs,
            vm,
            batch_size: batch_size.max(1),
            max_result_size,
        }
    }

    /// Resolves the program, arguments and environment of `item`.
    pub fn prepare(&self, item: &TallyExecItem<'_>, block_height: u64) -> Result<PreparedTally, TallyError> {
        let req = item.request;
        let bytecode = self
            .programs
            .get_oracle_program(&req.tally_program_id)
            .map_err(|e| TallyError::FindingTallyProgram(e.to_string()))?;
        let tally_inputs = STANDARD
            .decode(req.tally_inputs.as_bytes())
            .map_err(|e| TallyError::DecodingTallyInputs(e.to_string()))?;
        let payback_address = STANDARD
            .decode(req.payback_address.as_bytes())
            .map_err(|e| TallyError::DecodingPaybackAddress(e.to_string()))?;

        let outliers = item
            .filter_result
            .outliers
            .clone()
            .unwrap_or_else(|| vec![false; item.reveals.len()]);
        let args = tally_vm_args(&tally_inputs, item.reveals, &outliers)?;

        let env = BTreeMap::from([
            ("VM_MODE".to_string(), "tally".to_string()),
            ("CONSENSUS".to_string(), item.filter_result.consensus.to_string()),
            ("BLOCK_HEIGHT".to_string(), block_height.to_string()),
            ("DR_ID".to_string(), req.id.clone()),
            ("DR_REPLICATION_FACTOR".to_string(), req.replication_factor.to_string()),
            ("EXEC_PROGRAM_ID".to_string(), req.exec_program_id.clone()),
            ("EXEC_INPUTS".to_string(), req.exec_inputs.clone()),
            ("EXEC_GAS_LIMIT".to_string(), req.exec_gas_limit.to_string()),
            ("TALLY_INPUTS".to_string(), req.tally_inputs.clone()),
            ("TALLY_PROGRAM_ID".to_string(), req.tally_program_id.clone()),
            ("DR_TALLY_GAS_LIMIT".to_string(), item.remaining_tally_gas.to_string()),
            ("DR_GAS_PRICE".to_string(), req.gas_price.clone()),
            ("DR_MEMO".to_string(), req.memo.clone()),
            ("DR_PAYBACK_ADDRESS".to_string(), hex::encode(payback_address)),
        ]);

        Ok(PreparedTally {
            bytecode,
            args,
            env,
        })
    }

    /// Runs a single tally program.
    pub fn execute(&self, item: &TallyExecItem<'_>, block_height: u64) -> Result<VmResult, TallyError> {
        let prepared = self.prepare(item, block_height)?;
        Ok(self.run(&item.request.id, &prepared))
    }

    /// Runs the tally programs of `items` in batches of `batch_size`. The i-th
    /// output always belongs to the i-th item.
    pub fn execute_batched(
        &self,
        items: &[TallyExecItem<'_>],
        block_height: u64,
    ) -> Vec<Result<VmResult, TallyError>> {
        let prepared: Vec<Result<PreparedTally, TallyError>> = items
            .iter()
            .map(|item| self.prepare(item, block_height))
            .collect();

        let mut slots: Vec<Result<VmResult, TallyError>> =
            vec![Ok(VmResult::default()); items.len()];
        for ((slot_chunk, prep_chunk), item_chunk) in slots
            .chunks_mut(self.batch_size)
            .zip(prepared.chunks(self.batch_size))
            .zip(items.chunks(self.batch_size))
        {
            slot_chunk
                .par_iter_mut()
                .zip(prep_chunk.par_iter())
                .zip(item_chunk.par_iter())
                .for_each(|((slot, prep), item)| {
                    *slot = match prep {
                        Ok(prep) => Ok(self.run(&item.request.id, prep)),
                        Err(e) => Err(e.clone()),
                    };
                });
        }
        slots
    }

    fn run(&self, request_id: &str, prepared: &PreparedTally) -> VmResult {
        tracing::info!(
            target: "tally",
            request_id = %request_id,
            consensus = prepared.env.get("CONSENSUS").map(String::as_str).unwrap_or_default(),
            "executing tally VM"
        );
        let raw = match self
            .vm
            .execute(&prepared.bytecode, &prepared.args, &prepared.env)
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(target: "tally", request_id = %request_id, error = %e, "tally VM failed");
                VmResult {
                    exit_code: TALLY_EXIT_CODE_EXEC_ERROR,
                    exit_message: e.to_string(),
                    ..Default::default()
                }
            }
        };
        let result = map_vm_result(raw, self.max_result_size);
        if result.exit_code != 0 {
            tracing::error!(
                target: "tally",
                request_id = %request_id,
                exit_code = result.exit_code,
                exit_message = %result.exit_message,
                "tally vm exit message"
            );
        }
        result
    }
}

/// Normalizes a raw VM result: a missing result, or an empty one from a failed
/// program, is replaced by the exit message, and oversized results are rejected.
fn map_vm_result(mut raw: VmResult, max_result_size: usize) -> VmResult {
    let missing = match &raw.result {
        None => true,
        Some(bytes) => bytes.is_empty() && raw.exit_code != 0,
    };
    if missing {
        raw.result = Some(raw.exit_message.clone().into_bytes());
    }
    if raw.result.as_ref().map_or(0, Vec::len) > max_result_size {
        raw.exit_code = TALLY_EXIT_CODE_EXEC_ERROR;
        raw.exit_message = format!("Result larger than {max_result_size}bytes");
        raw.result = Some(raw.exit_message.clone().into_bytes());
    }
    raw
}

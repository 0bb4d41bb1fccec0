// Path: crates/execution/src/tally/end_block.rs

//! The end-block tally pass.
//!
//! Each block, every tally-ready request is classified by its commit and reveal
//! counts, filtered, tallied in the VM and metered. The resulting distributions
//! are sent to the ledger in a single removal notification before the data
//! results are handed over for batching. Events are only emitted once both
//! have been accepted.
//!
//! Nothing that goes wrong during a pass may halt block production:
//! [`TallyEngine::end_block`] turns every error and panic into a logged no-op,
//! leaving unresolved requests pending for a later block.

use super::consensus::{execute_filter, FilterResult};
use super::gas_meter::GasMeter;
use super::metering::{
    are_gas_reports_uniform, meter_executor_gas_divergent, meter_executor_gas_fallback,
    meter_executor_gas_uniform, meter_proxy_gas,
};
use super::payout::{calculate_committer_payouts, distributions_from_gas_meter};
use super::vm::{TallyExecItem, TallyProgramExecutor};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tally_api::ledger::{EventSink, RequestSource, ResultSink};
use tally_api::registry::{ProgramStore, ProxyRegistry};
use tally_api::vm::{TallyVm, VmResult};
use tally_telemetry::time::PassTimer;
use tally_telemetry::{error_metrics, tally_metrics};
use tally_types::app::events::{
    ATTRIBUTE_CONSENSUS, ATTRIBUTE_DATA_REQUEST_ID, ATTRIBUTE_DATA_RESULT_ID,
    ATTRIBUTE_EXEC_GAS_USED, ATTRIBUTE_PROXY_PUBLIC_KEYS, ATTRIBUTE_TALLY_EXIT_CODE,
    ATTRIBUTE_TALLY_GAS_USED, ATTRIBUTE_TALLY_VM_STDERR, ATTRIBUTE_TALLY_VM_STDOUT,
    EVENT_TYPE_TALLY_COMPLETION,
};
use tally_types::app::exit_code::{
    TALLY_EXIT_CODE_EXEC_ERROR, TALLY_EXIT_CODE_FILTER_ERROR, TALLY_EXIT_CODE_INVALID_FILTER_INPUT,
    TALLY_EXIT_CODE_NOT_ENOUGH_COMMITS, TALLY_EXIT_CODE_NOT_ENOUGH_REVEALS,
};
use tally_types::app::{remove_data_requests_message, DataResult, Distribution, Event, Request, Reveal};
use tally_types::config::TallyParams;
use tally_types::error::{EndBlockError, ErrorCode, TallyError};

/// The collaborators a [`TallyEngine`] is constructed with.
#[derive(Clone)]
pub struct TallyCollaborators {
    /// Source of tally-ready requests and sink for removal notifications.
    pub requests: Arc<dyn RequestSource>,
    /// Data proxy fee lookup.
    pub proxies: Arc<dyn ProxyRegistry>,
    /// Tally program lookup.
    pub programs: Arc<dyn ProgramStore>,
    /// Sink for data results awaiting batching.
    pub results: Arc<dyn ResultSink>,
    /// Sink for emitted events.
    pub events: Arc<dyn EventSink>,
    /// The tally VM sandbox.
    pub vm: Arc<dyn TallyVm>,
}

/// The block a tally pass runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// Block height.
    pub height: u64,
    /// Block time in unix seconds.
    pub timestamp: u64,
}

/// What a tally pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndBlockOutcome {
    /// The given number of requests were settled.
    Tallied(usize),
    /// No request was ready.
    Idle,
    /// The pass failed and was discarded; every request stays pending.
    Aborted,
}

/// The stage a request reached before settlement.
#[derive(Debug)]
enum Stage {
    /// Refunded without touching a gas meter (paused contract, bad gas price).
    Refunded,
    /// Fewer commits than the replication factor.
    NotEnoughCommits(GasMeter),
    /// Fewer reveals than the replication factor.
    NotEnoughReveals(GasMeter),
    /// Went through the filter, and through the VM if the filter succeeded.
    Filtered {
        gas_meter: GasMeter,
        reveals: Vec<Reveal>,
        filter_result: FilterResult,
        tally_error: bool,
    },
}

/// Per-request state carried through a pass.
#[derive(Debug)]
struct RequestTally<'a> {
    request: &'a Request,
    data_result: DataResult,
    stage: Stage,
    stdout: Vec<String>,
    stderr: Vec<String>,
    exec_gas_used: u64,
    tally_gas_used: u64,
}

/// Drives the tally pass of every block.
pub struct TallyEngine {
    collaborators: TallyCollaborators,
    params: TallyParams,
    executor: TallyProgramExecutor,
}

impl std::fmt::Debug for TallyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TallyEngine")
            .field("params", &self.params)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl TallyEngine {
    /// Creates an engine over the given collaborators.
    pub fn new(collaborators: TallyCollaborators, params: TallyParams) -> Self {
        let executor = TallyProgramExecutor::new(
            collaborators.programs.clone(),
            collaborators.vm.clone(),
            params.tally_batch_size,
            params.max_result_size,
        );
        Self {
            collaborators,
            params,
            executor,
        }
    }

    /// The parameters this engine runs with.
    pub fn params(&self) -> &TallyParams {
        &self.params
    }

    /// Runs the tally pass of a block. Never fails and never panics: errors are
    /// logged and reported as [`EndBlockOutcome::Aborted`].
    pub fn end_block(&self, ctx: BlockContext) -> EndBlockOutcome {
        let timer = PassTimer::start(tally_metrics());
        let outcome = match catch_unwind(AssertUnwindSafe(|| self.process_tallies(ctx))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!(target: "end_block", height = ctx.height, error = %e, code = e.code(), "tally pass aborted");
                error_metrics().inc_error("end_block", e.code());
                EndBlockOutcome::Aborted
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(target: "end_block", height = ctx.height, panic = %message, "recovered from panic in tally pass");
                error_metrics().inc_error("end_block", "END_BLOCK_PANIC");
                EndBlockOutcome::Aborted
            }
        };
        tracing::debug!(
            target: "end_block",
            height = ctx.height,
            outcome = ?outcome,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "tally pass finished"
        );
        outcome
    }

    /// Runs the tally pass of a block, returning the first error that aborts it.
    pub fn process_tallies(&self, ctx: BlockContext) -> Result<EndBlockOutcome, EndBlockError> {
        let pending = self
            .collaborators
            .requests
            .fetch_tally_ready(self.params.max_tallies_per_block)
            .map_err(|e| {
                tally_metrics().set_dr_flow_halt(true);
                tracing::error!(target: "end_block", error = %e, "[HALTS_DR_FLOW] failed to get tally-ready data requests");
                EndBlockError::FetchRequests(e)
            })?;
        if pending.requests.is_empty() {
            tracing::debug!(target: "end_block", "no tally-ready data requests - skipping tally process");
            return Ok(EndBlockOutcome::Idle);
        }
        tracing::info!(target: "end_block", count = pending.requests.len(), "non-empty tally list - starting tally process");

        let mut tallies = Vec::with_capacity(pending.requests.len());
        for req in &pending.requests {
            if let Some(tally) = self.classify(req, pending.is_paused, ctx)? {
                tallies.push(tally);
            }
        }
        if tallies.is_empty() {
            tally_metrics().set_data_requests_tallied(0);
            return Ok(EndBlockOutcome::Tallied(0));
        }

        self.run_tally_programs(&mut tallies, ctx.height);

        // Nothing leaves the engine until the ledger has accepted the removal and
        // every result is stored.
        let mut processed: BTreeMap<String, Vec<Distribution>> = BTreeMap::new();
        let mut audit_events = Vec::new();
        for tally in &mut tallies {
            let dists = self.settle(tally, &mut audit_events)?;
            processed.insert(tally.request.id.clone(), dists);
        }

        let message = remove_data_requests_message(&processed).map_err(|e| {
            tally_metrics().set_dr_flow_halt(true);
            tracing::error!(target: "end_block", error = %e, "[HALTS_DR_FLOW] failed to marshal remove data requests");
            EndBlockError::MarshalRemoval(e.to_string())
        })?;
        self.collaborators
            .requests
            .remove_data_requests(&message)
            .map_err(|e| {
                tally_metrics().set_dr_flow_halt(true);
                tracing::error!(target: "end_block", error = %e, "[HALTS_DR_FLOW] failed to notify ledger of tally completion");
                EndBlockError::NotifyRemoval(e)
            })?;

        let results: Vec<DataResult> = tallies.iter().map(|t| t.data_result.clone()).collect();
        self.collaborators
            .results
            .set_data_results_for_batching(&results)
            .map_err(EndBlockError::StoreResults)?;

        let events = &self.collaborators.events;
        for event in audit_events {
            events.emit(event);
        }
        for tally in &tallies {
            tracing::info!(target: "end_block", request_id = %tally.data_result.dr_id, "tally flow completed");
            events.emit(completion_event(tally));
        }

        tally_metrics().set_data_requests_tallied(tallies.len() as u64);
        tally_metrics().set_dr_flow_halt(false);
        Ok(EndBlockOutcome::Tallied(tallies.len()))
    }

    /// Sorts a request into its settlement path and runs the filter if it has
    /// enough reveals.
    ///
    /// Returns `None` for a request whose data result cannot be hashed (an
    /// undecodable ID, payback address or payload). Such a request is left
    /// pending on the ledger and does not hold up the rest of the block.
    fn classify<'a>(
        &self,
        req: &'a Request,
        is_paused: bool,
        ctx: BlockContext,
    ) -> Result<Option<RequestTally<'a>>, EndBlockError> {
        let hashing = |source: TallyError| EndBlockError::Hashing {
            request_id: req.id.clone(),
            source,
        };
        let skeleton = DataResult::for_request(req, ctx.height, ctx.timestamp);
        if let Err(e) = skeleton.try_hash() {
            tracing::warn!(target: "end_block", request_id = %req.id, error = %e, "skipping data request with undecodable fields");
            error_metrics().inc_error("tally", e.code());
            return Ok(None);
        }
        let mut tally = RequestTally {
            request: req,
            data_result: skeleton,
            stage: Stage::Refunded,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exec_gas_used: 0,
            tally_gas_used: 0,
        };

        if is_paused {
            tally.data_result.mark_as_paused().map_err(hashing)?;
            return Ok(Some(tally));
        }
        let gas_price = match req.posted_gas_price() {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(target: "end_block", request_id = %req.id, error = %e, "refunding request");
                tally.data_result.mark_as_fallback(&e).map_err(hashing)?;
                return Ok(Some(tally));
            }
        };

        let mut gas_meter = GasMeter::new(
            req.tally_gas_limit,
            req.exec_gas_limit,
            self.params.max_tally_gas_limit,
            gas_price,
            self.params.gas_cost_base,
        );
        let rf = usize::from(req.replication_factor);

        if req.commits.len() < rf {
            tracing::info!(target: "end_block", request_id = %req.id, "data request's number of commits did not meet replication factor");
            tally.data_result.exit_code = TALLY_EXIT_CODE_NOT_ENOUGH_COMMITS;
            tally.data_result.result =
                format!("need {rf} commits; received {}", req.commits.len()).into_bytes();
            tally.stage = Stage::NotEnoughCommits(gas_meter);
        } else if req.reveals.len() < rf {
            tracing::info!(target: "end_block", request_id = %req.id, "data request's number of reveals did not meet replication factor");
            tally.data_result.exit_code = TALLY_EXIT_CODE_NOT_ENOUGH_REVEALS;
            tally.data_result.result =
                format!("need {rf} reveals; received {}", req.reveals.len()).into_bytes();
            tally.stage = Stage::NotEnoughReveals(gas_meter);
        } else {
            let reveals = req.sorted_reveals();
            let filter_result = execute_filter(
                &reveals,
                &req.consensus_filter,
                req.replication_factor,
                &self.params,
                &mut gas_meter,
            );
            tally_metrics().inc_filter_outcome(filter_result.outcome_label());
            tally.data_result.consensus = filter_result.consensus;
            if let Some(e) = &filter_result.error {
                tracing::debug!(target: "end_block", request_id = %req.id, error = %e, "filter did not reach consensus");
                tally.data_result.result = e.to_string().into_bytes();
                tally.data_result.exit_code = match e {
                    TallyError::InvalidFilterInput(_) => TALLY_EXIT_CODE_INVALID_FILTER_INPUT,
                    _ => TALLY_EXIT_CODE_FILTER_ERROR,
                };
            }
            tally.stage = Stage::Filtered {
                gas_meter,
                reveals,
                filter_result,
                tally_error: false,
            };
        }
        Ok(Some(tally))
    }

    /// Runs the tally programs of every request whose filter succeeded and
    /// records their outcomes.
    fn run_tally_programs(&self, tallies: &mut [RequestTally<'_>], block_height: u64) {
        let (indices, outputs) = {
            let mut indices = Vec::new();
            let mut items = Vec::new();
            for (i, tally) in tallies.iter().enumerate() {
                if let Stage::Filtered {
                    gas_meter,
                    reveals,
                    filter_result,
                    ..
                } = &tally.stage
                {
                    if filter_result.error.is_none() {
                        indices.push(i);
                        items.push(TallyExecItem {
                            request: tally.request,
                            reveals,
                            filter_result,
                            remaining_tally_gas: gas_meter.remaining_tally_gas(),
                        });
                    }
                }
            }
            let outputs = self.executor.execute_batched(&items, block_height);
            (indices, outputs)
        };

        for (i, output) in indices.into_iter().zip(outputs) {
            if let Some(tally) = tallies.get_mut(i) {
                apply_vm_output(tally, output);
            }
        }
    }

    /// Meters the request's gas and finalizes its data result. Returns the
    /// request's distributions; its audit events are appended to `events`.
    fn settle(
        &self,
        tally: &mut RequestTally<'_>,
        events: &mut Vec<Event>,
    ) -> Result<Vec<Distribution>, EndBlockError> {
        let req = tally.request;
        let gas_meter = match &mut tally.stage {
            Stage::Refunded => return Ok(Vec::new()),
            Stage::NotEnoughCommits(gas_meter) => {
                meter_executor_gas_fallback(req, self.params.execution_gas_cost_fallback, gas_meter);
                gas_meter
            }
            Stage::NotEnoughReveals(gas_meter) => {
                events.extend(calculate_committer_payouts(
                    gas_meter,
                    req,
                    self.params.execution_gas_cost_fallback,
                ));
                gas_meter
            }
            Stage::Filtered {
                gas_meter,
                reveals,
                filter_result,
                tally_error,
            } => {
                self.meter_filtered(req, gas_meter, reveals, filter_result, *tally_error);
                gas_meter
            }
        };

        let (dists, event) =
            distributions_from_gas_meter(gas_meter, &req.id, req.height, self.params.burn_ratio);
        events.push(event);

        tally.exec_gas_used = gas_meter.exec_gas_used();
        tally.tally_gas_used = gas_meter.tally_gas_used();
        tally.data_result.gas_used = gas_meter.total_gas_used();
        tally.data_result.id = tally
            .data_result
            .try_hash()
            .map_err(|source| EndBlockError::Hashing {
                request_id: req.id.clone(),
                source,
            })?;
        tracing::info!(target: "end_block", request_id = %req.id, exit_code = tally.data_result.exit_code, "completed tally");
        Ok(dists)
    }

    /// Meters data proxy and executor gas for a request that went through the filter.
    fn meter_filtered(
        &self,
        req: &Request,
        gas_meter: &mut GasMeter,
        reveals: &[Reveal],
        filter_result: &FilterResult,
        tally_error: bool,
    ) {
        if filter_result.error == Some(TallyError::NoBasicConsensus) {
            meter_executor_gas_fallback(req, self.params.execution_gas_cost_fallback, gas_meter);
            return;
        }

        meter_proxy_gas(
            self.collaborators.proxies.as_ref(),
            &filter_result.proxy_public_keys,
            req.replication_factor,
            gas_meter,
        );

        let reduced = tally_error
            || matches!(
                filter_result.error,
                Some(TallyError::InvalidFilterInput(_)) | Some(TallyError::NoConsensus)
            );
        if reduced {
            gas_meter.set_reduced_payout();
        }

        let gas_reports: Vec<u64> = reveals.iter().map(|r| r.body.gas_used).collect();
        let outliers = filter_result.outliers.as_deref();
        if are_gas_reports_uniform(&gas_reports) {
            let report = gas_reports.first().copied().unwrap_or(0);
            meter_executor_gas_uniform(reveals, report, outliers, req.replication_factor, gas_meter);
        } else {
            meter_executor_gas_divergent(
                reveals,
                &gas_reports,
                outliers,
                req.replication_factor,
                gas_meter,
            );
        }
    }
}

/// Records a tally program outcome on the request it belongs to.
fn apply_vm_output(tally: &mut RequestTally<'_>, output: Result<VmResult, TallyError>) {
    let Stage::Filtered {
        gas_meter,
        tally_error,
        ..
    } = &mut tally.stage
    else {
        return;
    };
    match output {
        Ok(vm) => {
            gas_meter.consume_tally_gas_saturating(vm.gas_used);
            tally.data_result.exit_code = vm.exit_code;
            tally.data_result.result = vm.result.unwrap_or_default();
            tally.stdout = vm.stdout;
            tally.stderr = vm.stderr;
        }
        Err(e) => {
            tracing::debug!(target: "end_block", request_id = %tally.request.id, error = %e, "tally program not executed");
            *tally_error = true;
            tally.data_result.exit_code = TALLY_EXIT_CODE_EXEC_ERROR;
            tally.data_result.result = e.to_string().into_bytes();
        }
    }
}

fn completion_event(tally: &RequestTally<'_>) -> Event {
    let proxy_public_keys = match &tally.stage {
        Stage::Filtered { filter_result, .. } => filter_result.proxy_public_keys.join("\n"),
        _ => String::new(),
    };
    let dr = &tally.data_result;
    Event::new(EVENT_TYPE_TALLY_COMPLETION)
        .with_attribute(ATTRIBUTE_DATA_RESULT_ID, &dr.id)
        .with_attribute(ATTRIBUTE_DATA_REQUEST_ID, &dr.dr_id)
        .with_attribute(ATTRIBUTE_CONSENSUS, dr.consensus)
        .with_attribute(ATTRIBUTE_TALLY_VM_STDOUT, tally.stdout.join("\n"))
        .with_attribute(ATTRIBUTE_TALLY_VM_STDERR, tally.stderr.join("\n"))
        .with_attribute(ATTRIBUTE_EXEC_GAS_USED, tally.exec_gas_used)
        .with_attribute(ATTRIBUTE_TALLY_GAS_USED, tally.tally_gas_used)
        .with_attribute(ATTRIBUTE_TALLY_EXIT_CODE, format!("{:02x}", dr.exit_code))
        .with_attribute(ATTRIBUTE_PROXY_PUBLIC_KEYS, proxy_public_keys)
}

// Path: crates/test_utils/src/mocks/mod.rs
//! In-memory implementations of the tally engine's collaborators.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tally_api::ledger::{EventSink, PendingRequests, RequestSource, ResultSink};
use tally_api::registry::{DataProxyConfig, ProgramStore, ProxyRegistry};
use tally_api::vm::{TallyVm, VmResult};
use tally_types::app::{DataResult, Event, Request};
use tally_types::error::{CollaboratorError, VmError};

use crate::fixtures::TALLY_PROGRAM_ID;

/// A ledger holding a fixed list of tally-ready requests.
#[derive(Debug, Default)]
pub struct MockRequestSource {
    pending: Mutex<PendingRequests>,
    removals: Mutex<Vec<Vec<u8>>>,
    fail_fetch: AtomicBool,
    fail_removal: AtomicBool,
}

impl MockRequestSource {
    /// A ledger returning `requests` on every fetch.
    pub fn new(requests: Vec<Request>) -> Self {
        Self {
            pending: Mutex::new(PendingRequests {
                is_paused: false,
                requests,
            }),
            ..Default::default()
        }
    }

    /// Marks the core contract as paused.
    pub fn set_paused(&self, paused: bool) {
        self.pending.lock().is_paused = paused;
    }

    /// Makes every subsequent fetch fail.
    pub fn fail_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent removal notification fail.
    pub fn fail_removal(&self) {
        self.fail_removal.store(true, Ordering::SeqCst);
    }

    /// Removal notifications received so far.
    pub fn removals(&self) -> Vec<Vec<u8>> {
        self.removals.lock().clone()
    }

    /// The last removal notification, parsed as JSON.
    pub fn last_removal_json(&self) -> Option<serde_json::Value> {
        self.removals
            .lock()
            .last()
            .and_then(|m| serde_json::from_slice(m).ok())
    }
}

impl RequestSource for MockRequestSource {
    fn fetch_tally_ready(&self, limit: u32) -> Result<PendingRequests, CollaboratorError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Backend("ledger unavailable".into()));
        }
        let pending = self.pending.lock();
        Ok(PendingRequests {
            is_paused: pending.is_paused,
            requests: pending
                .requests
                .iter()
                .take(limit as usize)
                .cloned()
                .collect(),
        })
    }

    fn remove_data_requests(&self, message: &[u8]) -> Result<(), CollaboratorError> {
        if self.fail_removal.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Backend("removal rejected".into()));
        }
        self.removals.lock().push(message.to_vec());
        Ok(())
    }
}

/// A data proxy registry keyed by raw public key.
#[derive(Debug, Default)]
pub struct MockProxyRegistry {
    configs: HashMap<Vec<u8>, DataProxyConfig>,
}

impl MockProxyRegistry {
    /// Registers a proxy under its hex-encoded public key.
    pub fn with_proxy(mut self, public_key_hex: &str, fee: u128, payout_address: &str) -> Self {
        if let Ok(key) = hex::decode(public_key_hex) {
            self.configs.insert(
                key,
                DataProxyConfig {
                    fee,
                    payout_address: payout_address.to_string(),
                },
            );
        }
        self
    }
}

impl ProxyRegistry for MockProxyRegistry {
    fn get_data_proxy_config(
        &self,
        public_key: &[u8],
    ) -> Result<DataProxyConfig, CollaboratorError> {
        self.configs
            .get(public_key)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(hex::encode(public_key)))
    }
}

/// A program store keyed by hex program ID.
#[derive(Debug, Default)]
pub struct MockProgramStore {
    programs: HashMap<String, Vec<u8>>,
}

impl MockProgramStore {
    /// A store holding a program under [`TALLY_PROGRAM_ID`].
    pub fn with_default_program() -> Self {
        Self::default().with_program(TALLY_PROGRAM_ID, b"\0asm tally")
    }

    /// Adds a program.
    pub fn with_program(mut self, program_id: &str, bytecode: &[u8]) -> Self {
        self.programs
            .insert(program_id.to_string(), bytecode.to_vec());
        self
    }
}

impl ProgramStore for MockProgramStore {
    fn get_oracle_program(&self, program_id: &str) -> Result<Vec<u8>, CollaboratorError> {
        self.programs
            .get(program_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("program {program_id}")))
    }
}

/// Collects data results handed over for batching.
#[derive(Debug, Default)]
pub struct MockResultSink {
    results: Mutex<Vec<DataResult>>,
    fail: AtomicBool,
}

impl MockResultSink {
    /// Makes every subsequent store fail.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Results stored so far.
    pub fn results(&self) -> Vec<DataResult> {
        self.results.lock().clone()
    }

    /// The stored result for `dr_id`.
    pub fn result_for(&self, dr_id: &str) -> Option<DataResult> {
        self.results.lock().iter().find(|r| r.dr_id == dr_id).cloned()
    }
}

impl ResultSink for MockResultSink {
    fn set_data_results_for_batching(&self, results: &[DataResult]) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Backend("store unavailable".into()));
        }
        self.results.lock().extend_from_slice(results);
        Ok(())
    }
}

/// Collects emitted events.
#[derive(Debug, Default)]
pub struct MockEventSink {
    events: Mutex<Vec<Event>>,
}

impl MockEventSink {
    /// Every event emitted so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Emitted events of the given type.
    pub fn events_of(&self, kind: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

impl EventSink for MockEventSink {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}

type VmScript = dyn Fn(&[u8], &[String], &BTreeMap<String, String>) -> Result<VmResult, VmError>
    + Send
    + Sync;

/// A single recorded VM invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmCall {
    /// Program bytecode.
    pub bytecode: Vec<u8>,
    /// Program arguments.
    pub args: Vec<String>,
    /// Program environment.
    pub env: BTreeMap<String, String>,
}

/// A VM whose behavior is scripted by a closure. Every invocation is recorded.
pub struct MockTallyVm {
    script: Box<VmScript>,
    calls: Mutex<Vec<VmCall>>,
}

impl std::fmt::Debug for MockTallyVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTallyVm")
            .field("calls", &self.calls.lock().len())
            .finish()
    }
}

impl MockTallyVm {
    /// A VM running `script` for every invocation.
    pub fn scripted<F>(script: F) -> Self
    where
        F: Fn(&[u8], &[String], &BTreeMap<String, String>) -> Result<VmResult, VmError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A VM that always succeeds with `result`, printing one line to stdout and
    /// consuming `gas_used`.
    pub fn returning(result: &[u8], gas_used: u64) -> Self {
        let result = result.to_vec();
        Self::scripted(move |_, _, _| {
            Ok(VmResult {
                exit_code: 0,
                exit_message: String::new(),
                result: Some(result.clone()),
                stdout: vec!["tally ok".to_string()],
                stderr: Vec::new(),
                gas_used,
            })
        })
    }

    /// Invocations recorded so far, in call order.
    pub fn calls(&self) -> Vec<VmCall> {
        self.calls.lock().clone()
    }
}

impl TallyVm for MockTallyVm {
    fn execute(
        &self,
        bytecode: &[u8],
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<VmResult, VmError> {
        self.calls.lock().push(VmCall {
            bytecode: bytecode.to_vec(),
            args: args.to_vec(),
            env: env.clone(),
        });
        (self.script)(bytecode, args, env)
    }
}

// Path: crates/test_utils/src/fixtures/mod.rs
//! Request fixtures for reproducible tests

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tally_types::app::{FilterInput, NumberType, Request, RevealBody};
use tally_types::config::{BurnRatio, TallyParams};
use tally_types::numeric::Sigma;

/// Hex ID of the tally program registered by [`crate::mocks::MockProgramStore::with_default_program`].
pub const TALLY_PROGRAM_ID: &str = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
/// Hex ID used as the execution program of every fixture request.
pub const EXEC_PROGRAM_ID: &str = "eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// Parameters with small, round gas costs so that expected amounts are easy to
/// compute by hand.
pub fn test_params() -> TallyParams {
    TallyParams {
        max_tally_gas_limit: 10_000_000,
        filter_gas_cost_none: 1_000,
        filter_gas_cost_multiplier_mode: 1_000,
        filter_gas_cost_multiplier_mad: 1_000,
        gas_cost_base: 10_000,
        execution_gas_cost_fallback: 5_000,
        burn_ratio: BurnRatio::from_atto(200_000_000_000_000_000).unwrap_or(BurnRatio::ZERO),
        max_result_size: 1024,
        max_tallies_per_block: 100,
        tally_batch_size: 2,
    }
}

/// A mode filter input over `json_path`.
pub fn mode_filter(json_path: &str) -> Vec<u8> {
    FilterInput::Mode {
        json_path: json_path.to_string(),
    }
    .encode()
}

/// A MAD filter input over the `i64` at `json_path`, with `max_sigma` given in
/// millionths.
pub fn mad_filter(json_path: &str, max_sigma: u64) -> Vec<u8> {
    FilterInput::Mad {
        max_sigma: Sigma(max_sigma),
        number_type: NumberType::Int64,
        json_path: json_path.to_string(),
    }
    .encode()
}

/// Builds tally-ready requests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    req: Request,
}

impl RequestBuilder {
    /// A request with ID `seed` repeated over 32 bytes, replication factor one,
    /// a `None` filter and generous gas limits.
    pub fn new(seed: u8) -> Self {
        Self {
            req: Request {
                id: hex::encode([seed; 32]),
                height: 1,
                exec_program_id: EXEC_PROGRAM_ID.to_string(),
                exec_inputs: STANDARD.encode(b"exec-inputs"),
                exec_gas_limit: 3_000_000,
                tally_program_id: TALLY_PROGRAM_ID.to_string(),
                tally_inputs: STANDARD.encode(b"tally-inputs"),
                tally_gas_limit: 1_000_000,
                gas_price: "10".to_string(),
                memo: STANDARD.encode(b"memo"),
                payback_address: STANDARD.encode(b"payback"),
                replication_factor: 1,
                consensus_filter: vec![0x00],
                version: "1.0.0".to_string(),
                ..Default::default()
            },
        }
    }

    /// Sets the replication factor.
    pub fn replication_factor(mut self, replication_factor: u16) -> Self {
        self.req.replication_factor = replication_factor;
        self
    }

    /// Sets the posted gas price.
    pub fn gas_price(mut self, gas_price: &str) -> Self {
        self.req.gas_price = gas_price.to_string();
        self
    }

    /// Sets the tally and execution gas limits.
    pub fn gas_limits(mut self, tally_gas_limit: u64, exec_gas_limit: u64) -> Self {
        self.req.tally_gas_limit = tally_gas_limit;
        self.req.exec_gas_limit = exec_gas_limit;
        self
    }

    /// Sets the consensus filter input.
    pub fn filter(mut self, filter: Vec<u8>) -> Self {
        self.req.consensus_filter = filter;
        self
    }

    /// Sets the base64 payload carried into the data result.
    pub fn payload(mut self, payload: &str) -> Self {
        self.req.payload = payload.to_string();
        self
    }

    /// Sets the base64 payback address.
    pub fn payback_address(mut self, payback_address: &str) -> Self {
        self.req.payback_address = payback_address.to_string();
        self
    }

    /// Sets the tally program ID.
    pub fn tally_program(mut self, program_id: &str) -> Self {
        self.req.tally_program_id = program_id.to_string();
        self
    }

    /// Sets the raw (base64) tally inputs.
    pub fn tally_inputs(mut self, tally_inputs: &str) -> Self {
        self.req.tally_inputs = tally_inputs.to_string();
        self
    }

    /// Records a commitment without a reveal.
    pub fn commit(mut self, executor: &str) -> Self {
        self.req
            .commits
            .insert(executor.to_string(), hex::encode(executor.as_bytes()));
        self
    }

    /// Records a commitment and a successful reveal of `json`.
    pub fn reveal(self, executor: &str, json: &str, gas_used: u64) -> Self {
        self.reveal_with(executor, json, gas_used, 0, &[])
    }

    /// Records a commitment and a reveal that used the given data proxies.
    pub fn reveal_with_proxies(
        self,
        executor: &str,
        json: &str,
        gas_used: u64,
        proxy_public_keys: &[&str],
    ) -> Self {
        self.reveal_with(executor, json, gas_used, 0, proxy_public_keys)
    }

    /// Records a commitment and a reveal whose execution failed.
    pub fn failed_reveal(self, executor: &str, gas_used: u64) -> Self {
        self.reveal_with(executor, "{}", gas_used, 1, &[])
    }

    fn reveal_with(
        mut self,
        executor: &str,
        json: &str,
        gas_used: u64,
        exit_code: u8,
        proxy_public_keys: &[&str],
    ) -> Self {
        self = self.commit(executor);
        self.req.reveals.insert(
            executor.to_string(),
            RevealBody {
                id: self.req.id.clone(),
                salt: executor.as_bytes().to_vec(),
                exit_code,
                gas_used,
                reveal: STANDARD.encode(json.as_bytes()),
                proxy_public_keys: proxy_public_keys.iter().map(|k| k.to_string()).collect(),
            },
        );
        self
    }

    /// Returns the request.
    pub fn build(self) -> Request {
        self.req
    }
}

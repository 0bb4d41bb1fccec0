// Path: crates/execution/src/tally/gas_meter.rs

//! Per-request gas accounting.
//!
//! A `GasMeter` tracks two independent budgets: tally gas (filtering and the
//! tally program) and execution gas (data proxies and executors). For both,
//! `used + remaining == limit` holds after every call.

use serde::{Deserialize, Serialize};

/// Execution gas recorded for a data proxy. `amount` covers every replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyGasUsed {
    /// Hex-encoded public key of the data proxy.
    pub public_key: String,
    /// Address the proxy is paid out to.
    pub payout_address: String,
    /// Gas recorded for the proxy.
    pub amount: u64,
}

/// Execution gas recorded for an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorGasUsed {
    /// Public key of the executor.
    pub identity: String,
    /// Gas recorded for the executor.
    pub amount: u64,
}

/// The gas budgets of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasMeter {
    proxies: Vec<ProxyGasUsed>,
    executors: Vec<ExecutorGasUsed>,
    reduced_payout: bool,
    tally_gas_limit: u64,
    tally_gas_remaining: u64,
    exec_gas_limit: u64,
    exec_gas_remaining: u64,
    total_proxy_gas_per_exec: u64,
    gas_price: u128,
}

impl GasMeter {
    /// Creates a meter for a request and charges the base cost.
    ///
    /// The tally gas limit is capped at `max_tally_gas_limit`. The base cost is
    /// charged even when it exceeds the limit, in which case the whole limit is used.
    pub fn new(
        tally_gas_limit: u64,
        exec_gas_limit: u64,
        max_tally_gas_limit: u64,
        gas_price: u128,
        gas_cost_base: u64,
    ) -> Self {
        let capped = tally_gas_limit.min(max_tally_gas_limit);
        Self {
            proxies: Vec::new(),
            executors: Vec::new(),
            reduced_payout: false,
            tally_gas_limit: capped,
            tally_gas_remaining: capped.saturating_sub(gas_cost_base),
            exec_gas_limit,
            exec_gas_remaining: exec_gas_limit,
            total_proxy_gas_per_exec: 0,
            gas_price,
        }
    }

    /// Consumes `amount` tally gas. Returns `true` and leaves the meter untouched
    /// if the remaining tally gas cannot cover it.
    pub fn consume_tally_gas(&mut self, amount: u64) -> bool {
        match self.tally_gas_remaining.checked_sub(amount) {
            Some(remaining) => {
                self.tally_gas_remaining = remaining;
                false
            }
            None => true,
        }
    }

    /// Consumes `amount` tally gas, using up whatever remains if it cannot be
    /// covered. Returns `true` if the budget ran out.
    pub fn consume_tally_gas_saturating(&mut self, amount: u64) -> bool {
        let out_of_gas = amount > self.tally_gas_remaining;
        self.tally_gas_remaining = self.tally_gas_remaining.saturating_sub(amount);
        out_of_gas
    }

    /// Records a data proxy payout of `gas_used_per_exec` for each of the
    /// `replication_factor` executors and consumes it from the execution budget.
    ///
    /// The payout is recorded in full even if the remaining execution gas does
    /// not cover it.
    pub fn consume_exec_gas_for_proxy(
        &mut self,
        public_key: &str,
        payout_address: &str,
        gas_used_per_exec: u64,
        replication_factor: u16,
    ) {
        let amount = gas_used_per_exec.saturating_mul(u64::from(replication_factor));
        self.proxies.push(ProxyGasUsed {
            public_key: public_key.to_string(),
            payout_address: payout_address.to_string(),
            amount,
        });
        self.exec_gas_remaining = self.exec_gas_remaining.saturating_sub(amount);
        self.total_proxy_gas_per_exec = self
            .total_proxy_gas_per_exec
            .saturating_add(gas_used_per_exec);
    }

    /// Records an executor payout and consumes it from the execution budget.
    pub fn consume_exec_gas_for_executor(&mut self, identity: &str, amount: u64) {
        self.executors.push(ExecutorGasUsed {
            identity: identity.to_string(),
            amount,
        });
        self.exec_gas_remaining = self.exec_gas_remaining.saturating_sub(amount);
    }

    /// Removes the data proxy gas already paid per executor from an executor's
    /// gas report.
    pub fn correct_exec_gas_report_with_proxy_gas(&self, gas_report: u64) -> u64 {
        gas_report.saturating_sub(self.total_proxy_gas_per_exec)
    }

    /// The capped tally gas limit.
    pub fn tally_gas_limit(&self) -> u64 {
        self.tally_gas_limit
    }

    /// Tally gas consumed so far.
    pub fn tally_gas_used(&self) -> u64 {
        self.tally_gas_limit - self.tally_gas_remaining
    }

    /// Tally gas still available.
    pub fn remaining_tally_gas(&self) -> u64 {
        self.tally_gas_remaining
    }

    /// The execution gas limit.
    pub fn exec_gas_limit(&self) -> u64 {
        self.exec_gas_limit
    }

    /// Execution gas consumed so far.
    pub fn exec_gas_used(&self) -> u64 {
        self.exec_gas_limit - self.exec_gas_remaining
    }

    /// Execution gas still available.
    pub fn remaining_exec_gas(&self) -> u64 {
        self.exec_gas_remaining
    }

    /// Tally plus execution gas consumed.
    pub fn total_gas_used(&self) -> u128 {
        u128::from(self.tally_gas_used()) + u128::from(self.exec_gas_used())
    }

    /// The posted gas price.
    pub fn gas_price(&self) -> u128 {
        self.gas_price
    }

    /// Whether executor payouts are reduced by the burn ratio.
    pub fn reduced_payout(&self) -> bool {
        self.reduced_payout
    }

    /// Switches the meter into reduced payout mode.
    pub fn set_reduced_payout(&mut self) {
        self.reduced_payout = true;
    }

    /// Data proxy payouts in the order they were recorded.
    pub fn proxy_payouts(&self) -> &[ProxyGasUsed] {
        &self.proxies
    }

    /// Executor payouts in the order they were recorded.
    pub fn executor_payouts(&self) -> &[ExecutorGasUsed] {
        &self.executors
    }
}

// Path: crates/execution/src/tally/metering.rs

//! Converts data proxy fees and executor gas reports into execution gas
//! recorded on a request's [`GasMeter`].
//!
//! Every per-executor amount is capped at `remaining_exec_gas / replication_factor`
//! so that the recorded payouts can never exceed the request's execution budget.

use super::gas_meter::GasMeter;
use tally_api::registry::ProxyRegistry;
use tally_types::app::{Request, Reveal};

/// `remaining / replication_factor`, or zero without a replication factor.
fn gas_limit_per_exec(gas_meter: &GasMeter, replication_factor: u16) -> u64 {
    gas_meter
        .remaining_exec_gas()
        .checked_div(u64::from(replication_factor))
        .unwrap_or(0)
}

fn is_outlier(outliers: Option<&[bool]>, index: usize) -> bool {
    outliers
        .and_then(|o| o.get(index).copied())
        .unwrap_or(false)
}

/// Records the gas used by every data proxy in the winning basic consensus set.
///
/// A proxy's per-executor gas is its fee divided by the gas price (rounded down),
/// capped by the remaining execution gas per executor. Keys that cannot be
/// decoded or looked up are skipped.
pub fn meter_proxy_gas(
    registry: &dyn ProxyRegistry,
    proxy_public_keys: &[String],
    replication_factor: u16,
    gas_meter: &mut GasMeter,
) {
    if proxy_public_keys.is_empty() || gas_meter.remaining_exec_gas() == 0 {
        return;
    }

    for public_key in proxy_public_keys {
        let key_bytes = match hex::decode(public_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(target: "tally", public_key = %public_key, error = %e, "failed to decode proxy public key");
                continue;
            }
        };
        let config = match registry.get_data_proxy_config(&key_bytes) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(target: "tally", public_key = %public_key, error = %e, "failed to get proxy config");
                continue;
            }
        };

        let fee_in_gas = config
            .fee
            .checked_div(gas_meter.gas_price())
            .unwrap_or(0);
        let gas_used_per_exec = u64::try_from(fee_in_gas)
            .unwrap_or(u64::MAX)
            .min(gas_limit_per_exec(gas_meter, replication_factor));

        gas_meter.consume_exec_gas_for_proxy(
            public_key,
            &config.payout_address,
            gas_used_per_exec,
            replication_factor,
        );
    }
}

/// Charges `gas_cost_fallback` for every committer, in sorted order, when the
/// executors' reports cannot be used. If any reveals are present, only
/// committers that also revealed are paid.
pub fn meter_executor_gas_fallback(req: &Request, gas_cost_fallback: u64, gas_meter: &mut GasMeter) {
    if req.commits.is_empty() || gas_meter.remaining_exec_gas() == 0 {
        return;
    }

    let gas_used = gas_limit_per_exec(gas_meter, req.replication_factor).min(gas_cost_fallback);
    for committer in req.sorted_committers() {
        if !req.reveals.is_empty() && !req.reveals.contains_key(&committer) {
            continue;
        }
        gas_meter.consume_exec_gas_for_executor(&committer, gas_used);
    }
}

/// Whether every gas report carries the same value.
pub fn are_gas_reports_uniform(reports: &[u64]) -> bool {
    match reports.split_first() {
        Some((first, rest)) => rest.iter().all(|r| r == first),
        None => true,
    }
}

/// Records `gas_report`, net of proxy gas and capped per executor, for every
/// non-outlier executor.
pub fn meter_executor_gas_uniform(
    reveals: &[Reveal],
    gas_report: u64,
    outliers: Option<&[bool]>,
    replication_factor: u16,
    gas_meter: &mut GasMeter,
) {
    let gas_used = gas_meter
        .correct_exec_gas_report_with_proxy_gas(gas_report)
        .min(gas_limit_per_exec(gas_meter, replication_factor));
    for (i, reveal) in reveals.iter().enumerate() {
        if is_outlier(outliers, i) {
            continue;
        }
        gas_meter.consume_exec_gas_for_executor(&reveal.executor, gas_used);
    }
}

/// Records executor gas when the reports diverge.
///
/// Reports are corrected for proxy gas and capped per executor. The lowest
/// reporter (the first one on ties) is paid `min(2 × lowest, median)` and every
/// other executor the median, with both amounts rescaled so that the total is
/// `median × (rf - 1) + min(2 × lowest, median)`. Outliers are not paid.
pub fn meter_executor_gas_divergent(
    reveals: &[Reveal],
    gas_reports: &[u64],
    outliers: Option<&[bool]>,
    replication_factor: u16,
    gas_meter: &mut GasMeter,
) {
    let cap = gas_limit_per_exec(gas_meter, replication_factor);
    let adjusted: Vec<u64> = gas_reports
        .iter()
        .map(|r| gas_meter.correct_exec_gas_report_with_proxy_gas(*r).min(cap))
        .collect();

    let mut lowest_index = 0usize;
    let mut lowest = 0u64;
    for (i, report) in adjusted.iter().enumerate() {
        if i == 0 || *report < lowest {
            lowest_index = i;
            lowest = *report;
        }
    }
    let median = u128::from(median(&adjusted));
    let others = u128::from(replication_factor.saturating_sub(1));
    let doubled_lowest = u128::from(lowest) * 2;
    let total_gas_used = median * others + doubled_lowest.min(median);
    let total_shares = median * others + doubled_lowest;

    let share = |weight: u128| -> u64 {
        weight
            .checked_mul(total_gas_used)
            .and_then(|v| v.checked_div(total_shares))
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0)
    };
    let lowest_gas_used = share(doubled_lowest);
    let regular_gas_used = share(median);

    for (i, reveal) in reveals.iter().enumerate() {
        if is_outlier(outliers, i) {
            continue;
        }
        let gas_used = if i == lowest_index {
            lowest_gas_used
        } else {
            regular_gas_used
        };
        gas_meter.consume_exec_gas_for_executor(&reveal.executor, gas_used);
    }
}

/// Median of `values`, averaging (and rounding down) the two middle values of
/// an even-length list. Zero for an empty list.
fn median(values: &[u64]) -> u64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n == 0 {
        return 0;
    }
    if n % 2 == 0 {
        match (sorted.get(n / 2 - 1), sorted.get(n / 2)) {
            (Some(a), Some(b)) => {
                let sum = u128::from(*a) + u128::from(*b);
                u64::try_from(sum / 2).unwrap_or(u64::MAX)
            }
            _ => 0,
        }
    } else {
        sorted.get(n / 2).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tally_api::registry::DataProxyConfig;
    use tally_types::app::RevealBody;
    use tally_types::error::CollaboratorError;

    struct Registry(HashMap<Vec<u8>, DataProxyConfig>);

    impl ProxyRegistry for Registry {
        fn get_data_proxy_config(
            &self,
            public_key: &[u8],
        ) -> Result<DataProxyConfig, CollaboratorError> {
            self.0
                .get(public_key)
                .cloned()
                .ok_or_else(|| CollaboratorError::NotFound(hex::encode(public_key)))
        }
    }

    fn reveals(gas: &[u64]) -> Vec<Reveal> {
        gas.iter()
            .enumerate()
            .map(|(i, g)| Reveal {
                executor: format!("exec{i}"),
                body: RevealBody {
                    gas_used: *g,
                    ..Default::default()
                },
            })
            .collect()
    }

    fn amounts(meter: &GasMeter) -> Vec<(String, u64)> {
        meter
            .executor_payouts()
            .iter()
            .map(|e| (e.identity.clone(), e.amount))
            .collect()
    }

    #[test]
    fn divergent_reports_reward_the_low_reporter() {
        let reveals = reveals(&[100, 100, 100, 10]);
        let reports: Vec<u64> = reveals.iter().map(|r| r.body.gas_used).collect();
        let mut meter = GasMeter::new(0, 10_000, 0, 1, 0);
        meter_executor_gas_divergent(&reveals, &reports, None, 4, &mut meter);
        assert_eq!(
            amounts(&meter),
            vec![
                ("exec0".to_string(), 100),
                ("exec1".to_string(), 100),
                ("exec2".to_string(), 100),
                ("exec3".to_string(), 20),
            ]
        );
        assert_eq!(meter.exec_gas_used(), 100 * 3 + 20);
    }

    #[test]
    fn divergent_reports_rescale_when_lowest_is_close_to_median() {
        // median 100, lowest 80: total 300 + 100 over 300 + 160 shares.
        let reveals = reveals(&[100, 80, 100, 120]);
        let reports: Vec<u64> = reveals.iter().map(|r| r.body.gas_used).collect();
        let mut meter = GasMeter::new(0, 10_000, 0, 1, 0);
        meter_executor_gas_divergent(&reveals, &reports, None, 4, &mut meter);
        let paid = amounts(&meter);
        assert_eq!(paid[1].1, 160 * 400 / 460);
        assert_eq!(paid[0].1, 100 * 400 / 460);
        assert_eq!(paid[3].1, 100 * 400 / 460);
    }

    #[test]
    fn divergent_outliers_are_not_paid() {
        let reveals = reveals(&[100, 100, 100, 10]);
        let reports: Vec<u64> = reveals.iter().map(|r| r.body.gas_used).collect();
        let outliers = [false, true, false, false];
        let mut meter = GasMeter::new(0, 10_000, 0, 1, 0);
        meter_executor_gas_divergent(&reveals, &reports, Some(&outliers[..]), 4, &mut meter);
        let paid: Vec<String> = amounts(&meter).into_iter().map(|(id, _)| id).collect();
        assert_eq!(paid, vec!["exec0", "exec2", "exec3"]);
    }

    #[test]
    fn divergent_all_zero_reports_pay_nothing() {
        let reveals = reveals(&[0, 0]);
        let mut meter = GasMeter::new(0, 10_000, 0, 1, 0);
        meter_executor_gas_divergent(&reveals, &[0, 0], None, 2, &mut meter);
        assert!(amounts(&meter).iter().all(|(_, a)| *a == 0));
    }

    #[test]
    fn uniform_reports_are_capped_and_skip_outliers() {
        let reveals = reveals(&[500, 500, 500]);
        let outliers = [false, false, true];
        let mut meter = GasMeter::new(0, 900, 0, 1, 0);
        meter_executor_gas_uniform(&reveals, 500, Some(&outliers[..]), 3, &mut meter);
        assert_eq!(
            amounts(&meter),
            vec![("exec0".to_string(), 300), ("exec1".to_string(), 300)]
        );
        assert_eq!(meter.remaining_exec_gas(), 300);
    }

    #[test]
    fn uniformity() {
        assert!(are_gas_reports_uniform(&[]));
        assert!(are_gas_reports_uniform(&[7]));
        assert!(are_gas_reports_uniform(&[7, 7, 7]));
        assert!(!are_gas_reports_uniform(&[7, 7, 8]));
    }

    #[test]
    fn proxy_gas_is_fee_over_price_and_skips_unknown_keys() {
        let mut configs = HashMap::new();
        configs.insert(
            vec![0xaa],
            DataProxyConfig {
                fee: 1_050,
                payout_address: "proxy-addr".into(),
            },
        );
        let registry = Registry(configs);
        let keys = vec!["aa".to_string(), "zz".to_string(), "bb".to_string()];
        let mut meter = GasMeter::new(0, 10_000, 0, 100, 0);
        meter_proxy_gas(&registry, &keys, 3, &mut meter);

        let proxies = meter.proxy_payouts();
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0].public_key, "aa");
        assert_eq!(proxies[0].payout_address, "proxy-addr");
        assert_eq!(proxies[0].amount, 10 * 3);
        // Executor reports are discounted by the per-executor proxy gas.
        assert_eq!(meter.correct_exec_gas_report_with_proxy_gas(25), 15);
    }

    #[test]
    fn proxy_gas_is_capped_by_remaining_budget() {
        let mut configs = HashMap::new();
        configs.insert(
            vec![0x01],
            DataProxyConfig {
                fee: u128::MAX,
                payout_address: "addr".into(),
            },
        );
        let mut meter = GasMeter::new(0, 100, 0, 1, 0);
        meter_proxy_gas(&Registry(configs), &["01".to_string()], 3, &mut meter);
        assert_eq!(meter.proxy_payouts()[0].amount, 33 * 3);
        assert_eq!(meter.remaining_exec_gas(), 1);
    }

    #[test]
    fn fallback_pays_revealing_committers_in_order() {
        let mut req = Request {
            replication_factor: 2,
            ..Default::default()
        };
        for c in ["carol", "alice", "bob"] {
            req.commits.insert(c.to_string(), String::new());
        }
        req.reveals.insert("carol".into(), RevealBody::default());
        req.reveals.insert("alice".into(), RevealBody::default());

        let mut meter = GasMeter::new(0, 1_000, 0, 1, 0);
        meter_executor_gas_fallback(&req, 200, &mut meter);
        assert_eq!(
            amounts(&meter),
            vec![("alice".to_string(), 200), ("carol".to_string(), 200)]
        );

        req.reveals.clear();
        let mut meter = GasMeter::new(0, 1_000, 0, 1, 0);
        meter_executor_gas_fallback(&req, 800, &mut meter);
        assert_eq!(
            amounts(&meter),
            vec![
                ("alice".to_string(), 500),
                ("bob".to_string(), 500),
                ("carol".to_string(), 500),
            ]
        );
        assert_eq!(meter.remaining_exec_gas(), 0);
    }

    #[test]
    fn zero_replication_factor_caps_everything_at_zero() {
        let reveals = reveals(&[10, 20]);
        let mut meter = GasMeter::new(0, 1_000, 0, 1, 0);
        meter_executor_gas_divergent(&reveals, &[10, 20], None, 0, &mut meter);
        assert_eq!(meter.exec_gas_used(), 0);
    }
}

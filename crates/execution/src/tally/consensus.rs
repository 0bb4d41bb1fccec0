// Path: crates/execution/src/tally/consensus.rs

//! Basic consensus followed by outlier filtering.

use super::filter::{build_filter, has_two_thirds};
use super::gas_meter::GasMeter;
use std::collections::HashMap;
use tally_types::app::Reveal;
use tally_types::config::TallyParams;
use tally_types::error::TallyError;

/// The outcome of filtering a request's reveals.
///
/// `executors`, `errors` and `outliers` are index-aligned with the sorted reveals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterResult {
    /// Executor identities in sorted order.
    pub executors: Vec<String>,
    /// `errors[i]` is set when the i-th reveal failed or could not be parsed.
    pub errors: Vec<bool>,
    /// `outliers[i]` is set when the i-th reveal is excluded from the tally.
    /// `None` when no outlier list could be established.
    pub outliers: Option<Vec<bool>>,
    /// Whether consensus was reached, either on the reveal data or on an error.
    pub consensus: bool,
    /// Data proxy public keys of the winning basic consensus tuple.
    pub proxy_public_keys: Vec<String>,
    /// Why the filter did not produce a clean consensus, if it did not.
    pub error: Option<TallyError>,
}

impl FilterResult {
    /// A short label for the filter outcome, used as a metric dimension.
    pub fn outcome_label(&self) -> &'static str {
        match &self.error {
            None => "consensus",
            Some(TallyError::ConsensusInError) => "consensus_in_error",
            Some(TallyError::NoConsensus) => "no_consensus",
            Some(TallyError::NoBasicConsensus) => "no_basic_consensus",
            Some(TallyError::CorruptReveals) => "corrupt_reveals",
            Some(TallyError::InvalidFilterInput(_)) => "invalid_filter_input",
            Some(TallyError::EmptyReveals) => "empty_reveals",
            Some(_) => "other",
        }
    }

    /// Number of reveals marked as errors.
    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|e| **e).count()
    }

    /// Whether the i-th reveal is an outlier. Without an outlier list no reveal
    /// is excluded.
    pub fn is_outlier(&self, index: usize) -> bool {
        self.outliers
            .as_ref()
            .and_then(|o| o.get(index).copied())
            .unwrap_or(false)
    }
}

/// Checks basic consensus on `(exit_code == 0, proxy_public_keys)`, then builds
/// the requestor's filter and applies it.
///
/// `reveals` must be sorted by executor, each with sorted proxy public keys.
/// The returned result always carries its error in `FilterResult::error`; the
/// filter construction cost is charged to `gas_meter`.
pub fn execute_filter(
    reveals: &[Reveal],
    filter_input: &[u8],
    replication_factor: u16,
    params: &TallyParams,
    gas_meter: &mut GasMeter,
) -> FilterResult {
    let mut res = FilterResult {
        executors: reveals.iter().map(|r| r.executor.clone()).collect(),
        errors: reveals.iter().map(|r| r.body.exit_code != 0).collect(),
        ..Default::default()
    };
    if reveals.is_empty() {
        res.error = Some(TallyError::EmptyReveals);
        return res;
    }

    let mut max_freq = 0usize;
    let mut freq: HashMap<(bool, &[String]), usize> = HashMap::with_capacity(reveals.len());
    for reveal in reveals {
        let tuple = (reveal.body.exit_code == 0, reveal.body.proxy_public_keys.as_slice());
        let count = freq.entry(tuple).or_insert(0);
        *count += 1;
        // Ties keep the tuple that reached the maximum first.
        if *count > max_freq {
            max_freq = *count;
            res.proxy_public_keys = reveal.body.proxy_public_keys.clone();
        }
    }
    if !has_two_thirds(max_freq, replication_factor) {
        res.error = Some(TallyError::NoBasicConsensus);
        return res;
    }

    let filter = match build_filter(filter_input, replication_factor, params, gas_meter) {
        Ok(filter) => filter,
        Err(e) => {
            res.error = Some(TallyError::InvalidFilterInput(e.to_string()));
            return res;
        }
    };

    let applied = filter.apply(reveals, &mut res.errors);
    if res.error_count() * 3 >= reveals.len() * 2 {
        res.consensus = true;
        res.outliers = Some(res.errors.iter().map(|e| !e).collect());
        res.error = Some(TallyError::ConsensusInError);
        return res;
    }
    match applied {
        Err(e) => res.error = Some(e),
        Ok(outcome) if !outcome.consensus => res.error = Some(TallyError::NoConsensus),
        Ok(outcome) => {
            res.consensus = true;
            res.outliers = Some(outcome.outliers);
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::reveals::tests::reveal;
    use tally_types::app::FilterInput;

    fn mode_input() -> Vec<u8> {
        FilterInput::Mode {
            json_path: "$.v".into(),
        }
        .encode()
    }

    fn meter() -> GasMeter {
        GasMeter::new(10_000_000, 0, u64::MAX, 1, 0)
    }

    fn with_keys(mut r: Reveal, keys: &[&str]) -> Reveal {
        r.body.proxy_public_keys = keys.iter().map(|k| k.to_string()).collect();
        r
    }

    fn failed(mut r: Reveal) -> Reveal {
        r.body.exit_code = 1;
        r
    }

    #[test]
    fn clean_consensus_returns_outliers() {
        let reveals = vec![
            reveal("a", r#"{"v":1}"#),
            reveal("b", r#"{"v":1}"#),
            reveal("c", r#"{"v":2}"#),
        ];
        let res = execute_filter(&reveals, &mode_input(), 3, &TallyParams::default(), &mut meter());
        assert_eq!(res.error, None);
        assert!(res.consensus);
        assert_eq!(res.outliers, Some(vec![false, false, true]));
        assert_eq!(res.executors, vec!["a", "b", "c"]);
        assert_eq!(res.outcome_label(), "consensus");
    }

    #[test]
    fn basic_consensus_fails_on_split_proxy_sets() {
        let reveals = vec![
            with_keys(reveal("a", r#"{"v":1}"#), &["k1"]),
            with_keys(reveal("b", r#"{"v":1}"#), &["k2"]),
            with_keys(reveal("c", r#"{"v":1}"#), &["k3"]),
        ];
        let mut gas = meter();
        let before = gas.remaining_tally_gas();
        let res = execute_filter(&reveals, &mode_input(), 3, &TallyParams::default(), &mut gas);
        assert_eq!(res.error, Some(TallyError::NoBasicConsensus));
        assert!(!res.consensus);
        assert_eq!(res.outliers, None);
        assert_eq!(res.proxy_public_keys, vec!["k1"]);
        // The filter is never built, so nothing is charged.
        assert_eq!(gas.remaining_tally_gas(), before);
    }

    #[test]
    fn winning_proxy_set_is_recorded() {
        let reveals = vec![
            with_keys(reveal("a", r#"{"v":1}"#), &["k1"]),
            with_keys(reveal("b", r#"{"v":1}"#), &["k1", "k2"]),
            with_keys(reveal("c", r#"{"v":1}"#), &["k1", "k2"]),
        ];
        let res = execute_filter(&reveals, &mode_input(), 3, &TallyParams::default(), &mut meter());
        assert_eq!(res.proxy_public_keys, vec!["k1", "k2"]);
        assert!(res.consensus);
    }

    #[test]
    fn agreement_on_failure_is_consensus_in_error() {
        let reveals = vec![
            failed(reveal("a", r#"{"v":1}"#)),
            failed(reveal("b", r#"{"v":1}"#)),
            failed(reveal("c", r#"{"v":1}"#)),
        ];
        let res = execute_filter(&reveals, &mode_input(), 3, &TallyParams::default(), &mut meter());
        assert_eq!(res.error, Some(TallyError::ConsensusInError));
        assert!(res.consensus);
        assert_eq!(res.outliers, Some(vec![false, false, false]));
        assert_eq!(res.errors, vec![true, true, true]);
    }

    #[test]
    fn corrupt_payloads_count_towards_error_consensus() {
        let reveals = vec![
            reveal("a", "not json"),
            reveal("b", r#"{"w":1}"#),
            reveal("c", r#"{"v":1}"#),
        ];
        let res = execute_filter(&reveals, &mode_input(), 3, &TallyParams::default(), &mut meter());
        assert_eq!(res.error, Some(TallyError::ConsensusInError));
        assert_eq!(res.outliers, Some(vec![false, false, true]));
    }

    #[test]
    fn disagreement_is_no_consensus() {
        let reveals = vec![
            reveal("a", r#"{"v":1}"#),
            reveal("b", r#"{"v":2}"#),
            reveal("c", r#"{"v":3}"#),
        ];
        let res = execute_filter(&reveals, &mode_input(), 3, &TallyParams::default(), &mut meter());
        assert_eq!(res.error, Some(TallyError::NoConsensus));
        assert!(!res.consensus);
        assert_eq!(res.outliers, None);
        assert!(!res.is_outlier(0));
    }

    #[test]
    fn invalid_filter_input_is_wrapped() {
        let reveals = vec![reveal("a", r#"{"v":1}"#)];
        let res = execute_filter(&reveals, &[0x05], 1, &TallyParams::default(), &mut meter());
        assert_eq!(
            res.error,
            Some(TallyError::InvalidFilterInput("invalid filter type".into()))
        );
        assert_eq!(res.outcome_label(), "invalid_filter_input");
    }

    #[test]
    fn empty_reveals_are_rejected() {
        let res = execute_filter(&[], &[0x00], 1, &TallyParams::default(), &mut meter());
        assert_eq!(res.error, Some(TallyError::EmptyReveals));
        assert!(res.errors.is_empty());
    }
}

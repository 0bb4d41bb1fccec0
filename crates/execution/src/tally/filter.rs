// Path: crates/execution/src/tally/filter.rs

//! Outlier filters.
//!
//! A filter is built from the requestor's filter input, which charges tally gas
//! before the input is decoded, and is then applied to the sorted reveals.

use super::gas_meter::GasMeter;
use super::reveals::{parse_reveals, ParsedReveals};
use tally_types::app::filter::{FilterInput, FilterKind, NumberType};
use tally_types::config::TallyParams;
use tally_types::error::TallyError;
use tally_types::numeric::{find_median, MedianInteger, Sigma};
use tally_types::app::Reveal;

/// Outliers detected by a filter, index-aligned with the reveals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    /// `outliers[i]` is set when the i-th reveal is an outlier.
    pub outliers: Vec<bool>,
    /// Whether enough reveals agree on the reveal data.
    pub consensus: bool,
}

/// A pluggable outlier detector.
pub trait OutlierFilter: Send + Sync + std::fmt::Debug {
    /// Applies the filter. `errors` is index-aligned with `reveals`; reveals whose
    /// data cannot be used are marked in it.
    fn apply(&self, reveals: &[Reveal], errors: &mut [bool]) -> Result<FilterOutcome, TallyError>;
}

/// Declares every reveal a non-outlier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneFilter;

impl OutlierFilter for NoneFilter {
    fn apply(&self, reveals: &[Reveal], _errors: &mut [bool]) -> Result<FilterOutcome, TallyError> {
        Ok(FilterOutcome {
            outliers: vec![false; reveals.len()],
            consensus: true,
        })
    }
}

/// Declares outliers every reveal whose value differs from the most frequent one.
#[derive(Debug, Clone)]
pub struct ModeFilter {
    json_path: String,
    replication_factor: u16,
}

impl ModeFilter {
    /// Creates a mode filter over the value at `json_path`.
    pub fn new(json_path: impl Into<String>, replication_factor: u16) -> Self {
        Self {
            json_path: json_path.into(),
            replication_factor,
        }
    }
}

impl OutlierFilter for ModeFilter {
    fn apply(&self, reveals: &[Reveal], errors: &mut [bool]) -> Result<FilterOutcome, TallyError> {
        let parsed = parse_reveals(reveals, &self.json_path, errors);
        let max_freq = parsed.max_frequency();
        let outliers = parsed
            .values
            .iter()
            .map(|value| match value {
                Some(v) => parsed.frequency(v) != max_freq,
                None => true,
            })
            .collect();
        Ok(FilterOutcome {
            outliers,
            consensus: has_two_thirds(max_freq, self.replication_factor),
        })
    }
}

/// Declares outliers every reveal whose integer value lies further than
/// `max_sigma` from the median of all valid values.
#[derive(Debug, Clone)]
pub struct MadFilter {
    max_sigma: Sigma,
    number_type: NumberType,
    json_path: String,
    replication_factor: u16,
}

impl MadFilter {
    /// Creates a MAD filter over the integer at `json_path`.
    pub fn new(
        max_sigma: Sigma,
        number_type: NumberType,
        json_path: impl Into<String>,
        replication_factor: u16,
    ) -> Self {
        Self {
            max_sigma,
            number_type,
            json_path: json_path.into(),
            replication_factor,
        }
    }

    fn detect<T>(&self, parsed: &ParsedReveals, errors: &mut [bool]) -> Result<FilterOutcome, TallyError>
    where
        T: MedianInteger + TryFrom<i128>,
    {
        let numbers: Vec<Option<T>> = parsed
            .values
            .iter()
            .map(|v| {
                v.as_ref()
                    .and_then(|v| v.as_integer())
                    .and_then(|n| T::try_from(n).ok())
            })
            .collect();

        let mut corrupt = 0usize;
        for (number, error) in numbers.iter().zip(errors.iter_mut()) {
            if number.is_none() {
                *error = true;
                corrupt += 1;
            }
        }
        if corrupt * 3 > numbers.len() {
            return Err(TallyError::CorruptReveals);
        }

        let valid: Vec<T> = numbers.iter().flatten().copied().collect();
        let Some(median) = find_median(&valid) else {
            return Ok(FilterOutcome {
                outliers: vec![false; numbers.len()],
                consensus: false,
            });
        };

        let mut non_outliers = 0usize;
        let outliers = numbers
            .iter()
            .map(|number| match number {
                Some(n) if median.is_within_sigma(*n, self.max_sigma) => {
                    non_outliers += 1;
                    false
                }
                _ => true,
            })
            .collect();
        Ok(FilterOutcome {
            outliers,
            consensus: has_two_thirds(non_outliers, self.replication_factor),
        })
    }
}

impl OutlierFilter for MadFilter {
    fn apply(&self, reveals: &[Reveal], errors: &mut [bool]) -> Result<FilterOutcome, TallyError> {
        let parsed = parse_reveals(reveals, &self.json_path, errors);
        match self.number_type {
            NumberType::Int32 => self.detect::<i32>(&parsed, errors),
            NumberType::Int64 => self.detect::<i64>(&parsed, errors),
            NumberType::Uint32 => self.detect::<u32>(&parsed, errors),
            NumberType::Uint64 => self.detect::<u64>(&parsed, errors),
        }
    }
}

/// `count × 3 >= replication_factor × 2`.
pub(crate) fn has_two_thirds(count: usize, replication_factor: u16) -> bool {
    count.saturating_mul(3) >= usize::from(replication_factor) * 2
}

/// Builds the filter named by `input`, charging its construction cost to the
/// tally budget before the input payload is decoded.
pub fn build_filter(
    input: &[u8],
    replication_factor: u16,
    params: &TallyParams,
    gas_meter: &mut GasMeter,
) -> Result<Box<dyn OutlierFilter>, TallyError> {
    let kind = FilterKind::from_input(input)?;
    let rf = u64::from(replication_factor);
    let cost = match kind {
        FilterKind::None => params.filter_gas_cost_none,
        FilterKind::Mode => params.filter_gas_cost_multiplier_mode.saturating_mul(rf),
        FilterKind::Mad => params.filter_gas_cost_multiplier_mad.saturating_mul(rf),
    };
    if gas_meter.consume_tally_gas(cost) {
        return Err(TallyError::OutOfTallyGas);
    }

    Ok(match FilterInput::decode(input)? {
        FilterInput::None => Box::new(NoneFilter),
        FilterInput::Mode { json_path } => Box::new(ModeFilter::new(json_path, replication_factor)),
        FilterInput::Mad {
            max_sigma,
            number_type,
            json_path,
        } => Box::new(MadFilter::new(
            max_sigma,
            number_type,
            json_path,
            replication_factor,
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::reveals::tests::reveal;
    use proptest::prelude::*;

    fn text_reveals(values: &[&str]) -> Vec<Reveal> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| reveal(&format!("exec{i}"), &format!(r#"{{"result":{{"text":"{v}"}}}}"#)))
            .collect()
    }

    fn number_reveals(values: &[&str]) -> Vec<Reveal> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| reveal(&format!("exec{i}"), &format!(r#"{{"price":{v}}}"#)))
            .collect()
    }

    fn meter() -> GasMeter {
        GasMeter::new(1_000_000, 0, u64::MAX, 1, 0)
    }

    #[test]
    fn none_filter_accepts_everything() {
        let reveals = text_reveals(&["a", "b", "c", "d", "e"]);
        let mut errors = vec![false; 5];
        let outcome = NoneFilter.apply(&reveals, &mut errors).unwrap();
        assert_eq!(outcome.outliers, vec![false; 5]);
        assert!(outcome.consensus);
    }

    #[test]
    fn mode_filter_flags_minority_values() {
        let reveals = text_reveals(&["A", "A", "B", "A", "C", "A", "A"]);
        let mut errors = vec![false; 7];
        let outcome = ModeFilter::new("$.result.text", 7)
            .apply(&reveals, &mut errors)
            .unwrap();
        assert_eq!(
            outcome.outliers,
            vec![false, false, true, false, true, false, false]
        );
        assert!(outcome.consensus);
    }

    #[test]
    fn mode_filter_without_majority() {
        let reveals = text_reveals(&["A", "A", "B", "B", "C", "C"]);
        let mut errors = vec![false; 6];
        let outcome = ModeFilter::new("$.result.text", 6)
            .apply(&reveals, &mut errors)
            .unwrap();
        assert_eq!(outcome.outliers, vec![false; 6]);
        assert!(!outcome.consensus);
    }

    #[test]
    fn mode_filter_treats_corrupt_reveals_as_outliers() {
        let mut reveals = text_reveals(&["A", "A", "A"]);
        reveals.push(reveal("exec3", r#"{"other":1}"#));
        let mut errors = vec![false; 4];
        let outcome = ModeFilter::new("$.result.text", 4)
            .apply(&reveals, &mut errors)
            .unwrap();
        assert_eq!(outcome.outliers, vec![false, false, false, true]);
        assert_eq!(errors, vec![false, false, false, true]);
        assert!(outcome.consensus);
    }

    #[test]
    fn mad_filter_flags_values_beyond_sigma() {
        let reveals = number_reveals(&["10", "11", "12", "40", "11"]);
        let mut errors = vec![false; 5];
        let outcome = MadFilter::new(Sigma(1_000_000), NumberType::Uint64, "$.price", 5)
            .apply(&reveals, &mut errors)
            .unwrap();
        assert_eq!(outcome.outliers, vec![false, false, false, true, false]);
        assert!(outcome.consensus);
    }

    #[test]
    fn mad_filter_rejects_out_of_range_values() {
        let reveals = number_reveals(&["-1", "5", "5", "5"]);
        let mut errors = vec![false; 4];
        let outcome = MadFilter::new(Sigma(0), NumberType::Uint32, "$.price", 4)
            .apply(&reveals, &mut errors)
            .unwrap();
        assert_eq!(outcome.outliers, vec![true, false, false, false]);
        assert_eq!(errors, vec![true, false, false, false]);
        assert!(outcome.consensus);
    }

    #[test]
    fn mad_filter_accepts_decimal_strings() {
        let reveals = number_reveals(&[r#""100""#, "100", r#""101""#]);
        let mut errors = vec![false; 3];
        let outcome = MadFilter::new(Sigma(0), NumberType::Int64, "$.price", 3)
            .apply(&reveals, &mut errors)
            .unwrap();
        assert_eq!(outcome.outliers, vec![false, false, true]);
        assert!(outcome.consensus);
    }

    #[test]
    fn mad_filter_fails_on_too_many_corrupt_reveals() {
        let reveals = number_reveals(&["1", r#""x""#, "1.5"]);
        let mut errors = vec![false; 3];
        let err = MadFilter::new(Sigma(0), NumberType::Int32, "$.price", 3)
            .apply(&reveals, &mut errors)
            .unwrap_err();
        assert_eq!(err, TallyError::CorruptReveals);
    }

    #[test]
    fn build_charges_gas_before_decoding() {
        let params = TallyParams::default();
        let mut gas = meter();
        // A truncated mode input still pays for the attempt.
        let err = build_filter(&[0x01, 0x00], 3, &params, &mut gas).unwrap_err();
        assert!(matches!(err, TallyError::FilterInputTooShort { .. }));
        assert_eq!(gas.tally_gas_used(), params.filter_gas_cost_multiplier_mode * 3);

        let mut gas = meter();
        build_filter(&[0x00], 3, &params, &mut gas).unwrap();
        assert_eq!(gas.tally_gas_used(), params.filter_gas_cost_none);

        let mut gas = meter();
        assert_eq!(
            build_filter(&[0x09], 3, &params, &mut gas).unwrap_err(),
            TallyError::InvalidFilterType
        );
        assert_eq!(gas.tally_gas_used(), 0);
    }

    #[test]
    fn build_fails_without_enough_gas() {
        let params = TallyParams::default();
        let mut gas = GasMeter::new(10, 0, u64::MAX, 1, 0);
        assert_eq!(
            build_filter(&[0x00], 3, &params, &mut gas).unwrap_err(),
            TallyError::OutOfTallyGas
        );
        assert_eq!(gas.remaining_tally_gas(), 10);
    }

    proptest! {
        #[test]
        fn mode_filter_is_idempotent(values in proptest::collection::vec("[abc]", 1..12)) {
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            let reveals = text_reveals(&refs);
            let filter = ModeFilter::new("$.result.text", refs.len() as u16);
            let mut first_errors = vec![false; reveals.len()];
            let mut second_errors = vec![false; reveals.len()];
            let first = filter.apply(&reveals, &mut first_errors).unwrap();
            let second = filter.apply(&reveals, &mut second_errors).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(first_errors, second_errors);
        }

        #[test]
        fn mad_filter_is_idempotent(
            values in proptest::collection::vec(-50i64..50, 1..12),
            sigma in 0u64..3_000_000,
        ) {
            let texts: Vec<String> = values.iter().map(i64::to_string).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let reveals = number_reveals(&refs);
            let filter = MadFilter::new(Sigma(sigma), NumberType::Int64, "$.price", refs.len() as u16);
            let mut first_errors = vec![false; reveals.len()];
            let mut second_errors = vec![false; reveals.len()];
            let first = filter.apply(&reveals, &mut first_errors);
            let second = filter.apply(&reveals, &mut second_errors);
            prop_assert_eq!(first, second);
            prop_assert_eq!(first_errors, second_errors);
        }
    }
}

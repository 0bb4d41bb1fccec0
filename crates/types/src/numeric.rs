// Path: crates/types/src/numeric.rs

//! Consensus-critical arithmetic for the outlier filters.
//!
//! `Sigma` is the requestor-supplied tolerance and `HalfStepInt` is a median that
//! may land halfway between two integers. Both are evaluated identically on every
//! validator, so no floating point is involved anywhere in this module.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::marker::PhantomData;

/// The number of fractional units in one whole `Sigma`.
pub const SIGMA_PRECISION: u64 = 1_000_000;

/// Half of `SIGMA_PRECISION`, i.e. the fractional part representing 0.5.
const HALF_SIGMA_FRACTION: u64 = SIGMA_PRECISION / 2;

/// A 10^6 precision fixed-point unsigned number whose last six decimal digits
/// represent the fractional part.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Sigma(pub u64);

impl Sigma {
    /// Decodes a `Sigma` from its 8-byte big-endian wire form.
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Encodes this `Sigma` into its 8-byte big-endian wire form.
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// The whole number part. `Sigma(1_500_000).whole_number() == 1`.
    pub const fn whole_number(self) -> u64 {
        self.0 / SIGMA_PRECISION
    }

    /// The fractional part in millionths. `Sigma(1_500_000).fractional_part() == 500_000`.
    pub const fn fractional_part(self) -> u64 {
        self.0 % SIGMA_PRECISION
    }
}

/// Integer types over which a median can be taken.
///
/// Every implementor widens losslessly into `i128`, which is wide enough to hold the
/// sum of any two values without overflow.
pub trait MedianInteger: Copy + Ord + Into<i128> + Send + Sync + std::fmt::Debug {}

impl MedianInteger for i32 {}
impl MedianInteger for i64 {}
impl MedianInteger for u32 {}
impl MedianInteger for u64 {}

/// An integer with half-step (0.5) resolution, used to represent a median.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfStepInt<T> {
    /// `(x + y) / 2`, truncated toward zero.
    integer: i128,
    /// Set when `x + y` is negative, so `-0.5` is distinguishable from `0.5`.
    neg: bool,
    /// Set when the true value carries a `.5` fractional part.
    half_step: bool,
    _marker: PhantomData<T>,
}

impl<T: MedianInteger> HalfStepInt<T> {
    /// Returns the midpoint between `x` and `y`.
    pub fn mid(x: T, y: T) -> Self {
        let sum: i128 = x.into() + y.into();
        Self {
            integer: sum / 2,
            neg: sum < 0,
            half_step: sum % 2 != 0,
            _marker: PhantomData,
        }
    }

    /// The integer part of the midpoint, truncated toward zero.
    pub fn integer(&self) -> i128 {
        self.integer
    }

    /// Whether the midpoint lies exactly halfway between two integers.
    pub fn is_half_step(&self) -> bool {
        self.half_step
    }

    /// Whether the underlying sum was negative.
    pub fn is_negative(&self) -> bool {
        self.neg
    }

    /// Returns true iff `|x - self| <= max_sigma`.
    pub fn is_within_sigma(&self, x: T, max_sigma: Sigma) -> bool {
        let x: i128 = x.into();
        // Integer part of the absolute difference. The true difference may carry an
        // extra 0.5, which is implied by `half_step`.
        let abs_diff: u128 = match self.integer.cmp(&x) {
            Ordering::Greater => {
                let diff = self.integer.abs_diff(x);
                if self.neg && self.half_step {
                    diff.saturating_sub(1)
                } else {
                    diff
                }
            }
            Ordering::Less => {
                let diff = x.abs_diff(self.integer);
                if !self.neg && self.half_step {
                    diff.saturating_sub(1)
                } else {
                    diff
                }
            }
            // |0.5| == |-0.5|, so no adjustment.
            Ordering::Equal => 0,
        };

        let whole = u128::from(max_sigma.whole_number());
        if abs_diff > whole {
            return false;
        }
        if abs_diff == whole && self.half_step {
            // The true difference is whole + 0.5.
            return max_sigma.fractional_part() >= HALF_SIGMA_FRACTION;
        }
        true
    }
}

/// Returns the median of `nums` without modifying the input, or `None` if empty.
pub fn find_median<T: MedianInteger>(nums: &[T]) -> Option<HalfStepInt<T>> {
    let mut sorted = nums.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        let m = *sorted.get(mid)?;
        Some(HalfStepInt::mid(m, m))
    } else {
        let lo = *sorted.get(mid.checked_sub(1)?)?;
        let hi = *sorted.get(mid)?;
        Some(HalfStepInt::mid(lo, hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sigma_parts() {
        let s = Sigma(1_500_000);
        assert_eq!(s.whole_number(), 1);
        assert_eq!(s.fractional_part(), 500_000);
        assert_eq!(Sigma::from_be_bytes(s.to_be_bytes()), s);
        assert_eq!(
            Sigma::from_be_bytes([0, 0, 0, 0, 0, 0x0f, 0x42, 0x40]),
            Sigma(1_000_000)
        );
    }

    #[test]
    fn exact_median_is_within_zero_sigma() {
        let median = HalfStepInt::<i64>::mid(4, 6);
        assert_eq!(median.integer(), 5);
        assert!(!median.is_half_step());
        assert!(median.is_within_sigma(5, Sigma(0)));
        assert!(!median.is_within_sigma(6, Sigma(0)));
        assert!(median.is_within_sigma(6, Sigma(1_000_000)));
    }

    #[test]
    fn half_step_median_boundary() {
        let median = HalfStepInt::<i64>::mid(3, 4);
        assert_eq!(median.integer(), 3);
        assert!(median.is_half_step());
        assert!(!median.is_within_sigma(4, Sigma(0)));
        assert!(!median.is_within_sigma(4, Sigma(499_999)));
        assert!(median.is_within_sigma(4, Sigma(500_000)));
        assert!(median.is_within_sigma(3, Sigma(500_000)));
        assert!(!median.is_within_sigma(5, Sigma(1_499_999)));
        assert!(median.is_within_sigma(5, Sigma(1_500_000)));
    }

    #[test]
    fn negative_half_step_median() {
        // -3.5
        let median = HalfStepInt::<i32>::mid(-3, -4);
        assert_eq!(median.integer(), -3);
        assert!(median.is_negative());
        assert!(median.is_half_step());
        assert!(median.is_within_sigma(-4, Sigma(500_000)));
        assert!(median.is_within_sigma(-3, Sigma(500_000)));
        assert!(!median.is_within_sigma(-5, Sigma(1_000_000)));
        assert!(median.is_within_sigma(-5, Sigma(1_500_000)));

        // -0.5
        let median = HalfStepInt::<i32>::mid(-1, 0);
        assert_eq!(median.integer(), 0);
        assert!(median.is_within_sigma(0, Sigma(500_000)));
        assert!(median.is_within_sigma(-1, Sigma(500_000)));
        assert!(!median.is_within_sigma(1, Sigma(1_000_000)));
    }

    #[test]
    fn unsigned_extremes_do_not_overflow() {
        let median = HalfStepInt::<u64>::mid(u64::MAX, u64::MAX - 1);
        assert!(median.is_half_step());
        assert!(median.is_within_sigma(u64::MAX, Sigma(500_000)));
        assert!(!median.is_within_sigma(0, Sigma(u64::MAX)));
    }

    #[test]
    fn find_median_odd_and_even() {
        let odd = find_median(&[9u32, 1, 5]).unwrap();
        assert_eq!(odd.integer(), 5);
        assert!(!odd.is_half_step());

        let even = find_median(&[10i64, 1, 4, 3]).unwrap();
        assert_eq!(even.integer(), 3);
        assert!(even.is_half_step());

        assert!(find_median::<i64>(&[]).is_none());
    }

    proptest! {
        #[test]
        fn within_sigma_matches_exact_rational_check(
            x in any::<i32>(),
            y in any::<i32>(),
            v in any::<i32>(),
            sigma in 0u64..10_000_000_000_000,
        ) {
            let median = HalfStepInt::<i32>::mid(x, y);
            let sum = i128::from(x) + i128::from(y);
            // |v - sum/2| <= sigma / 10^6  <=>  |2v - sum| * 10^6 <= 2 * sigma
            let lhs = (2 * i128::from(v) - sum).unsigned_abs() * u128::from(SIGMA_PRECISION);
            let rhs = 2 * u128::from(sigma);
            prop_assert_eq!(median.is_within_sigma(v, Sigma(sigma)), lhs <= rhs);
        }
    }
}

// Path: crates/types/src/config/mod.rs

//! Protocol parameters consumed by the tally engine.
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of decimal places carried by a [`BurnRatio`].
pub const BURN_RATIO_DECIMALS: u32 = 18;
const BURN_RATIO_ONE: u128 = 1_000_000_000_000_000_000;

/// An 18-decimal fixed-point fraction in `[0, 1]`, used to burn a share of executor
/// payouts when a request is settled in reduced payout mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BurnRatio(u128);

impl BurnRatio {
    /// A ratio that burns nothing.
    pub const ZERO: Self = Self(0);
    /// A ratio that burns everything.
    pub const ONE: Self = Self(BURN_RATIO_ONE);

    /// Builds a ratio from its raw 10^-18 units, rejecting values above one.
    pub fn from_atto(units: u128) -> Result<Self, ConfigError> {
        if units > BURN_RATIO_ONE {
            return Err(ConfigError::InvalidBurnRatio(format!(
                "{units} exceeds {BURN_RATIO_ONE}"
            )));
        }
        Ok(Self(units))
    }

    /// Returns `floor(self * amount)`.
    pub fn burn_portion(&self, amount: u64) -> u64 {
        // amount < 2^64 and self.0 <= 10^18 < 2^60, so the product fits in u128.
        let burned = u128::from(amount) * self.0 / BURN_RATIO_ONE;
        u64::try_from(burned).unwrap_or(amount)
    }
}

impl FromStr for BurnRatio {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidBurnRatio(s.to_string());
        let (whole, frac) = match s.trim().split_once('.') {
            Some((w, f)) => (w, f),
            None => (s.trim(), ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > BURN_RATIO_DECIMALS as usize
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut frac_units: u128 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| invalid())?
        };
        // Right-pad the fractional digits to 18 places.
        for _ in frac.len()..BURN_RATIO_DECIMALS as usize {
            frac_units *= 10;
        }
        let units = whole
            .checked_mul(BURN_RATIO_ONE)
            .and_then(|w| w.checked_add(frac_units))
            .ok_or_else(invalid)?;
        Self::from_atto(units)
    }
}

impl fmt::Display for BurnRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:018}",
            self.0 / BURN_RATIO_ONE,
            self.0 % BURN_RATIO_ONE
        )
    }
}

impl TryFrom<String> for BurnRatio {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BurnRatio> for String {
    fn from(value: BurnRatio) -> Self {
        value.to_string()
    }
}

/// Parameters of the tally module, mirrored from on-chain governance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyParams {
    /// Upper bound applied to every request's tally gas limit.
    #[serde(default = "default_max_tally_gas_limit")]
    pub max_tally_gas_limit: u64,
    /// Flat tally gas charged for constructing a `None` filter.
    #[serde(default = "default_filter_gas_cost_none")]
    pub filter_gas_cost_none: u64,
    /// Tally gas charged per replica for constructing a `Mode` filter.
    #[serde(default = "default_filter_gas_cost_multiplier_mode")]
    pub filter_gas_cost_multiplier_mode: u64,
    /// Tally gas charged per replica for constructing a `MAD` filter.
    #[serde(default = "default_filter_gas_cost_multiplier_mad")]
    pub filter_gas_cost_multiplier_mad: u64,
    /// Tally gas charged for every request, even one that runs out of gas.
    #[serde(default = "default_gas_cost_base")]
    pub gas_cost_base: u64,
    /// Execution gas paid per committer when the reveal data cannot be used.
    #[serde(default = "default_execution_gas_cost_fallback")]
    pub execution_gas_cost_fallback: u64,
    /// Share of executor payouts burned in reduced payout mode.
    #[serde(default = "default_burn_ratio")]
    pub burn_ratio: BurnRatio,
    /// Maximum size in bytes of a tally program result.
    #[serde(default = "default_max_result_size")]
    pub max_result_size: usize,
    /// Maximum number of requests tallied in a single block.
    #[serde(default = "default_max_tallies_per_block")]
    pub max_tallies_per_block: u32,
    /// Number of tally programs executed concurrently.
    #[serde(default = "default_tally_batch_size")]
    pub tally_batch_size: usize,
}

fn default_max_tally_gas_limit() -> u64 {
    50_000_000_000_000
}
fn default_filter_gas_cost_none() -> u64 {
    100_000
}
fn default_filter_gas_cost_multiplier_mode() -> u64 {
    100_000
}
fn default_filter_gas_cost_multiplier_mad() -> u64 {
    100_000
}
fn default_gas_cost_base() -> u64 {
    1_000_000_000_000
}
fn default_execution_gas_cost_fallback() -> u64 {
    5_000_000_000_000
}
fn default_burn_ratio() -> BurnRatio {
    // 0.2
    BurnRatio(BURN_RATIO_ONE / 5)
}
fn default_max_result_size() -> usize {
    1024
}
fn default_max_tallies_per_block() -> u32 {
    100
}
fn default_tally_batch_size() -> usize {
    25
}

impl Default for TallyParams {
    fn default() -> Self {
        Self {
            max_tally_gas_limit: default_max_tally_gas_limit(),
            filter_gas_cost_none: default_filter_gas_cost_none(),
            filter_gas_cost_multiplier_mode: default_filter_gas_cost_multiplier_mode(),
            filter_gas_cost_multiplier_mad: default_filter_gas_cost_multiplier_mad(),
            gas_cost_base: default_gas_cost_base(),
            execution_gas_cost_fallback: default_execution_gas_cost_fallback(),
            burn_ratio: default_burn_ratio(),
            max_result_size: default_max_result_size(),
            max_tallies_per_block: default_max_tallies_per_block(),
            tally_batch_size: default_tally_batch_size(),
        }
    }
}

impl TallyParams {
    /// Parses and validates parameters from a TOML document. Missing fields take
    /// their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let params: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Checks the invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tally_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "tally_batch_size must be non-zero".into(),
            ));
        }
        if self.max_tallies_per_block == 0 {
            return Err(ConfigError::Invalid(
                "max_tallies_per_block must be non-zero".into(),
            ));
        }
        if self.max_result_size == 0 {
            return Err(ConfigError::Invalid(
                "max_result_size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

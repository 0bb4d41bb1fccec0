// Path: crates/types/src/app/distribution.rs

//! Burn and reward messages sent to the ledger when a request is removed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single settlement instruction. Amounts are denominated in tokens, i.e. gas
/// already multiplied by the request's gas price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Tokens destroyed.
    Burn {
        /// Amount burned.
        #[serde(with = "amount_string")]
        amount: u128,
    },
    /// Tokens paid to a data proxy.
    DataProxyReward {
        /// Hex-encoded public key of the data proxy.
        public_key: String,
        /// Address the proxy is paid out to.
        payout_address: String,
        /// Amount paid.
        #[serde(with = "amount_string")]
        amount: u128,
    },
    /// Tokens paid to an executor.
    ExecutorReward {
        /// Public key of the executor.
        identity: String,
        /// Amount paid.
        #[serde(with = "amount_string")]
        amount: u128,
    },
}

impl Distribution {
    /// A burn of `gas * gas_price` tokens.
    pub fn burn(gas: u128, gas_price: u128) -> Self {
        Self::Burn {
            amount: gas.saturating_mul(gas_price),
        }
    }

    /// A data proxy reward of `gas * gas_price` tokens.
    pub fn data_proxy_reward(
        public_key: impl Into<String>,
        payout_address: impl Into<String>,
        gas: u128,
        gas_price: u128,
    ) -> Self {
        Self::DataProxyReward {
            public_key: public_key.into(),
            payout_address: payout_address.into(),
            amount: gas.saturating_mul(gas_price),
        }
    }

    /// An executor reward of `gas * gas_price` tokens.
    pub fn executor_reward(identity: impl Into<String>, gas: u128, gas_price: u128) -> Self {
        Self::ExecutorReward {
            identity: identity.into(),
            amount: gas.saturating_mul(gas_price),
        }
    }

    /// The token amount of this distribution.
    pub fn amount(&self) -> u128 {
        match self {
            Self::Burn { amount }
            | Self::DataProxyReward { amount, .. }
            | Self::ExecutorReward { amount, .. } => *amount,
        }
    }
}

#[derive(Serialize)]
struct RemoveDataRequests<'a> {
    remove_data_requests: RemoveDataRequestsInner<'a>,
}

#[derive(Serialize)]
struct RemoveDataRequestsInner<'a> {
    requests: &'a BTreeMap<String, Vec<Distribution>>,
}

/// Serializes the removal notification for processed requests, keyed by request ID.
pub fn remove_data_requests_message(
    processed: &BTreeMap<String, Vec<Distribution>>,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&RemoveDataRequests {
        remove_data_requests: RemoveDataRequestsInner {
            requests: processed,
        },
    })
}

mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_message_shape() {
        let mut processed = BTreeMap::new();
        processed.insert(
            "dr1".to_string(),
            vec![
                Distribution::burn(10, 3),
                Distribution::data_proxy_reward("aa", "addr", 2, 3),
                Distribution::executor_reward("exec", 5, 3),
            ],
        );
        let msg = remove_data_requests_message(&processed).unwrap();
        assert_eq!(
            String::from_utf8(msg).unwrap(),
            r#"{"remove_data_requests":{"requests":{"dr1":[{"burn":{"amount":"30"}},{"data_proxy_reward":{"public_key":"aa","payout_address":"addr","amount":"6"}},{"executor_reward":{"identity":"exec","amount":"15"}}]}}}"#
        );
    }

    #[test]
    fn amounts_round_trip_as_strings() {
        let dist = Distribution::executor_reward("e", u128::from(u64::MAX), 1_000);
        let json = serde_json::to_string(&dist).unwrap();
        let back: Distribution = serde_json::from_str(&json).unwrap();
        assert_eq!(back.amount(), u128::from(u64::MAX) * 1_000);
    }
}

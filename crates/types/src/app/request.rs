// Path: crates/types/src/app/request.rs

//! Data requests as returned by the ledger, and the reveals submitted for them.
//!
//! Commit and reveal sets arrive as unordered maps. Nothing downstream may depend
//! on map iteration order, so every consumer goes through [`Request::sorted_committers`]
//! or [`Request::sorted_reveals`], which materialize a lexicographically ordered
//! sequence.

use crate::error::TallyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A reveal body as submitted by an executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealBody {
    /// Hex-encoded ID of the request this reveal answers.
    pub id: String,
    /// Salt used in the matching commitment.
    #[serde(default)]
    pub salt: Vec<u8>,
    /// Exit code of the execution program. Zero means success.
    pub exit_code: u8,
    /// Execution gas the executor reports to have used.
    pub gas_used: u64,
    /// Base64-encoded reveal data.
    pub reveal: String,
    /// Hex-encoded public keys of the data proxies the executor used.
    #[serde(default)]
    pub proxy_public_keys: Vec<String>,
}

/// A reveal paired with the identity of the executor who submitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    /// The executor's public key.
    pub executor: String,
    /// The revealed body, with `proxy_public_keys` sorted.
    pub body: RevealBody,
}

/// A data request that is ready to be tallied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Hex-encoded request ID.
    pub id: String,
    /// Height at which the request was posted.
    pub height: u64,
    /// Hex-encoded hash of the execution program.
    pub exec_program_id: String,
    /// Base64-encoded execution program inputs.
    pub exec_inputs: String,
    /// Execution gas limit for all replicas combined.
    pub exec_gas_limit: u64,
    /// Hex-encoded hash of the tally program.
    pub tally_program_id: String,
    /// Base64-encoded tally program inputs.
    pub tally_inputs: String,
    /// Tally gas limit requested by the poster.
    pub tally_gas_limit: u64,
    /// Posted gas price as a decimal integer string.
    pub gas_price: String,
    /// Base64-encoded memo.
    #[serde(default)]
    pub memo: String,
    /// Base64-encoded payback address.
    #[serde(default)]
    pub payback_address: String,
    /// Number of executors required.
    pub replication_factor: u16,
    /// Consensus filter input (type byte followed by its payload).
    #[serde(with = "base64_bytes", default)]
    pub consensus_filter: Vec<u8>,
    /// Committer public key to hex-encoded commitment.
    #[serde(default)]
    pub commits: HashMap<String, String>,
    /// Revealer public key to reveal body.
    #[serde(default)]
    pub reveals: HashMap<String, RevealBody>,
    /// Base64-encoded opaque payload carried into the data result.
    #[serde(default)]
    pub payload: String,
    /// Version of the request format.
    #[serde(default)]
    pub version: String,
}

impl Request {
    /// Committer identities in lexicographic order.
    pub fn sorted_committers(&self) -> Vec<String> {
        let mut committers: Vec<String> = self.commits.keys().cloned().collect();
        committers.sort();
        committers
    }

    /// Reveals in lexicographic order of executor identity, with each reveal's
    /// proxy public keys sorted as well.
    pub fn sorted_reveals(&self) -> Vec<Reveal> {
        let mut reveals: Vec<Reveal> = self
            .reveals
            .iter()
            .map(|(executor, body)| {
                let mut body = body.clone();
                body.proxy_public_keys.sort();
                Reveal {
                    executor: executor.clone(),
                    body,
                }
            })
            .collect();
        reveals.sort_by(|a, b| a.executor.cmp(&b.executor));
        reveals
    }

    /// The posted gas price, which must be a positive integer.
    pub fn posted_gas_price(&self) -> Result<u128, TallyError> {
        let price: u128 = self
            .gas_price
            .trim()
            .parse()
            .map_err(|_| TallyError::InvalidGasPrice(self.gas_price.clone()))?;
        if price == 0 {
            return Err(TallyError::InvalidGasPrice(self.gas_price.clone()));
        }
        Ok(price)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(keys: &[&str]) -> RevealBody {
        RevealBody {
            proxy_public_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn reveals_are_sorted_independent_of_insertion_order() {
        let names = ["delta", "alpha", "charlie", "bravo"];
        let mut forward = Request::default();
        let mut backward = Request::default();
        for name in names {
            forward.reveals.insert(name.to_string(), body(&["k2", "k1"]));
        }
        for name in names.iter().rev() {
            backward.reveals.insert(name.to_string(), body(&["k1", "k2"]));
        }

        let executors: Vec<String> = forward
            .sorted_reveals()
            .into_iter()
            .map(|r| r.executor)
            .collect();
        assert_eq!(executors, vec!["alpha", "bravo", "charlie", "delta"]);
        assert_eq!(forward.sorted_reveals(), backward.sorted_reveals());
        for reveal in forward.sorted_reveals() {
            assert_eq!(reveal.body.proxy_public_keys, vec!["k1", "k2"]);
        }
    }

    #[test]
    fn committers_are_sorted() {
        let mut req = Request::default();
        for name in ["c", "a", "b"] {
            req.commits.insert(name.to_string(), String::new());
        }
        assert_eq!(req.sorted_committers(), vec!["a", "b", "c"]);
    }

    #[test]
    fn gas_price_must_be_positive_integer() {
        let mut req = Request {
            gas_price: "2000".into(),
            ..Default::default()
        };
        assert_eq!(req.posted_gas_price().unwrap(), 2000);
        req.gas_price = "0".into();
        assert!(req.posted_gas_price().is_err());
        req.gas_price = "1.5".into();
        assert!(req.posted_gas_price().is_err());
        req.gas_price = "-3".into();
        assert!(req.posted_gas_price().is_err());
    }

    #[test]
    fn request_deserializes_from_ledger_json() {
        let json = r#"{
            "id": "abcd",
            "height": 7,
            "exec_program_id": "ee",
            "exec_inputs": "",
            "exec_gas_limit": 1000,
            "tally_program_id": "ff",
            "tally_inputs": "",
            "tally_gas_limit": 500,
            "gas_price": "10",
            "replication_factor": 1,
            "consensus_filter": "AA==",
            "commits": {"exec1": "00"},
            "reveals": {"exec1": {"id": "abcd", "exit_code": 0, "gas_used": 10, "reveal": "e30="}}
        }"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(req.consensus_filter, vec![0x00]);
        assert_eq!(req.sorted_reveals().len(), 1);
        assert!(req.memo.is_empty());
    }
}

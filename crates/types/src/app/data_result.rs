// Path: crates/types/src/app/data_result.rs

//! The per-request outcome handed to the batching collaborator.

use super::exit_code::{TALLY_EXIT_CODE_CONTRACT_PAUSED, TALLY_EXIT_CODE_INVALID_REQUEST};
use super::request::Request;
use crate::error::TallyError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// The final outcome of a data request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResult {
    /// Hex-encoded Keccak-256 hash of the other fields (see [`DataResult::try_hash`]).
    pub id: String,
    /// Version of the originating request.
    pub version: String,
    /// Hex-encoded request ID.
    pub dr_id: String,
    /// Whether the executors reached consensus.
    pub consensus: bool,
    /// Exit code of the tally program, or an engine-assigned code.
    pub exit_code: u32,
    /// Result bytes.
    pub result: Vec<u8>,
    /// Height of the block in which the request was tallied.
    pub block_height: u64,
    /// Timestamp (unix seconds) of the block in which the request was tallied.
    pub block_timestamp: u64,
    /// Total gas used (tally plus execution).
    pub gas_used: u128,
    /// Base64-encoded payback address.
    pub payback_address: String,
    /// Base64-encoded opaque payload of the request.
    pub payload: String,
}

impl DataResult {
    /// Builds an unsettled result skeleton for `req` tallied at the given block.
    pub fn for_request(req: &Request, block_height: u64, block_timestamp: u64) -> Self {
        Self {
            version: req.version.clone(),
            dr_id: req.id.clone(),
            block_height,
            block_timestamp,
            payback_address: req.payback_address.clone(),
            payload: req.payload.clone(),
            ..Default::default()
        }
    }

    /// Marks the result as a refunded fallback: the request could not be processed
    /// because of `cause`.
    pub fn mark_as_fallback(&mut self, cause: &TallyError) -> Result<(), TallyError> {
        self.gas_used = 0;
        self.exit_code = TALLY_EXIT_CODE_INVALID_REQUEST;
        self.consensus = false;
        self.result = format!("unable to process request. error: {cause}").into_bytes();
        self.id = self.try_hash()?;
        Ok(())
    }

    /// Marks the result as refunded because the core contract is paused.
    pub fn mark_as_paused(&mut self) -> Result<(), TallyError> {
        self.gas_used = 0;
        self.exit_code = TALLY_EXIT_CODE_CONTRACT_PAUSED;
        self.consensus = false;
        self.result = b"contract is paused".to_vec();
        self.id = self.try_hash()?;
        Ok(())
    }

    /// Computes the hex-encoded Keccak-256 identifier of this result:
    ///
    /// ```text
    /// keccak(version) || dr_id || consensus || exit_code || keccak(result)
    ///   || height (u64 BE) || timestamp (u64 BE) || gas_used (u128 BE)
    ///   || keccak(payback_address) || keccak(payload)
    /// ```
    pub fn try_hash(&self) -> Result<String, TallyError> {
        let dr_id = hex::decode(&self.dr_id)
            .map_err(|e| TallyError::HashingDataResult(format!("dr_id: {e}")))?;
        let payback = STANDARD
            .decode(self.payback_address.as_bytes())
            .map_err(|e| TallyError::HashingDataResult(format!("payback_address: {e}")))?;
        let payload = STANDARD
            .decode(self.payload.as_bytes())
            .map_err(|e| TallyError::HashingDataResult(format!("payload: {e}")))?;
        let [.., exit_code_byte] = self.exit_code.to_be_bytes();

        let mut hasher = Keccak256::new();
        hasher.update(Keccak256::digest(self.version.as_bytes()));
        hasher.update(&dr_id);
        hasher.update([u8::from(self.consensus)]);
        hasher.update([exit_code_byte]);
        hasher.update(Keccak256::digest(&self.result));
        hasher.update(self.block_height.to_be_bytes());
        hasher.update(self.block_timestamp.to_be_bytes());
        hasher.update(self.gas_used.to_be_bytes());
        hasher.update(Keccak256::digest(&payback));
        hasher.update(Keccak256::digest(&payload));
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataResult {
        DataResult {
            version: "1.0.0".into(),
            dr_id: "ab".repeat(32),
            consensus: true,
            exit_code: 0,
            result: b"42".to_vec(),
            block_height: 10,
            block_timestamp: 1_700_000_000,
            gas_used: 1_000,
            payback_address: STANDARD.encode(b"payback"),
            payload: String::new(),
            ..Default::default()
        }
    }

    #[test]
    fn hash_is_deterministic_and_field_sensitive() {
        let a = sample();
        let hash = a.try_hash().unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, sample().try_hash().unwrap());

        let mut b = sample();
        b.gas_used += 1;
        assert_ne!(hash, b.try_hash().unwrap());

        let mut c = sample();
        c.consensus = false;
        assert_ne!(hash, c.try_hash().unwrap());
    }

    #[test]
    fn hash_ignores_current_id() {
        let mut a = sample();
        let before = a.try_hash().unwrap();
        a.id = "anything".into();
        assert_eq!(before, a.try_hash().unwrap());
    }

    #[test]
    fn invalid_request_id_fails_hashing() {
        let mut a = sample();
        a.dr_id = "not-hex".into();
        assert!(matches!(
            a.try_hash(),
            Err(TallyError::HashingDataResult(_))
        ));
    }

    #[test]
    fn fallback_and_paused_results_are_refunds() {
        let mut a = sample();
        a.mark_as_fallback(&TallyError::InvalidGasPrice("0".into()))
            .unwrap();
        assert_eq!(a.exit_code, TALLY_EXIT_CODE_INVALID_REQUEST);
        assert_eq!(a.gas_used, 0);
        assert!(!a.consensus);
        assert_eq!(a.id, a.try_hash().unwrap());

        let mut b = sample();
        b.mark_as_paused().unwrap();
        assert_eq!(b.exit_code, TALLY_EXIT_CODE_CONTRACT_PAUSED);
        assert_eq!(b.result, b"contract is paused");
    }
}

// Path: crates/api/src/registry/mod.rs
//! Read-only registries consulted while settling a request.

use serde::{Deserialize, Serialize};
use tally_types::error::CollaboratorError;

/// The on-chain configuration of a data proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProxyConfig {
    /// Fee charged per execution, in tokens.
    pub fee: u128,
    /// Address that receives the proxy's rewards.
    pub payout_address: String,
}

/// A lookup of data proxy configurations keyed by raw public key.
pub trait ProxyRegistry: Send + Sync {
    /// Returns the configuration of the data proxy with the given public key.
    fn get_data_proxy_config(&self, public_key: &[u8])
        -> Result<DataProxyConfig, CollaboratorError>;
}

/// A content-addressed store of oracle program bytecode.
pub trait ProgramStore: Send + Sync {
    /// Returns the bytecode of the program with the given hex-encoded hash.
    fn get_oracle_program(&self, program_id: &str) -> Result<Vec<u8>, CollaboratorError>;
}

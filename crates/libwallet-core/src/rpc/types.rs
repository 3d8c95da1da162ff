use bitcoin::{BlockHash, Network};
use serde::Deserialize;

// ==============================================================================
// Chain Info
// ==============================================================================

/// Basic chain information from `getblockchaininfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfo {
    pub chain: String,
    pub blocks: u64,
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: BlockHash,
    pub pruned: bool,
}

impl ChainInfo {
    /// The network the backend reports, `None` for chain names this crate
    /// does not know.
    pub fn network(&self) -> Option<Network> {
        match self.chain.as_str() {
            "main" => Some(Network::Bitcoin),
            "test" => Some(Network::Testnet),
            "signet" => Some(Network::Signet),
            "regtest" => Some(Network::Regtest),
            _ => None,
        }
    }
}

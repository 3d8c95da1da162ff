use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Txid};

use crate::error::RpcError;

use super::types::ChainInfo;
use super::RpcClient;

/// A mock RPC backend for testing. Serves canned raw transactions and
/// counts `stop` calls.
pub struct MockRpc {
    transactions: HashMap<Txid, Vec<u8>>,
    chain_info: ChainInfo,
    stopped: AtomicBool,
    stop_calls: AtomicUsize,
}

impl MockRpc {
    pub fn builder() -> MockRpcBuilder {
        MockRpcBuilder {
            transactions: HashMap::new(),
            chain_info: ChainInfo {
                chain: "regtest".into(),
                blocks: 100,
                best_block_hash: BlockHash::all_zeros(),
                pruned: false,
            },
        }
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

pub struct MockRpcBuilder {
    transactions: HashMap<Txid, Vec<u8>>,
    chain_info: ChainInfo,
}

impl MockRpcBuilder {
    pub fn with_raw_tx(mut self, txid: Txid, raw: Vec<u8>) -> Self {
        self.transactions.insert(txid, raw);
        self
    }

    pub fn with_chain_info(mut self, info: ChainInfo) -> Self {
        self.chain_info = info;
        self
    }

    pub fn build(self) -> MockRpc {
        MockRpc {
            transactions: self.transactions,
            chain_info: self.chain_info,
            stopped: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RpcClient for MockRpc {
    async fn get_blockchain_info(&self) -> Result<ChainInfo, RpcError> {
        if self.is_stopped() {
            return Err(RpcError::Stopped);
        }
        Ok(self.chain_info.clone())
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Option<Vec<u8>>, RpcError> {
        if self.is_stopped() {
            return Err(RpcError::Stopped);
        }
        Ok(self.transactions.get(txid).cloned())
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_canned_data_until_stopped() {
        let txid = Txid::from_byte_array([1; 32]);
        let rpc = MockRpc::builder().with_raw_tx(txid, vec![1, 2, 3]).build();

        assert_eq!(
            rpc.get_raw_transaction(&txid).await.expect("lookup"),
            Some(vec![1, 2, 3])
        );
        assert_eq!(
            rpc.get_raw_transaction(&Txid::from_byte_array([2; 32]))
                .await
                .expect("lookup"),
            None
        );
        assert_eq!(
            rpc.get_blockchain_info().await.expect("info").chain,
            "regtest"
        );

        rpc.stop();
        assert_eq!(rpc.stop_calls(), 1);
        assert!(matches!(
            rpc.get_blockchain_info().await,
            Err(RpcError::Stopped)
        ));
    }
}

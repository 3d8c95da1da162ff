//! Transaction index store.
//!
//! A small keyed store that records wallet transactions and the height of
//! the last block indexed. The session opens exactly one handle at startup
//! and closes it during shutdown; opening is exclusive, so a second
//! process pointing at the same data directory gets a timeout instead of
//! a shared handle.

mod file;

pub use file::FileTxIndex;

use bitcoin::Txid;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::TransactionDirection;

pub const BUCKET_TX_INFO: &str = "TxIndexInfo";
pub const KEY_END_BLOCK: &str = "EndBlock";
pub const BUCKET_TRANSACTIONS: &str = "Transaction";

/// Blocks re-scanned when indexing resumes, to absorb shallow reorgs.
pub const MAX_REORG_BLOCKS: u32 = 6;

/// A transaction as the index records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedTransaction {
    pub hash: Txid,
    /// Persisted as its integer code.
    pub direction: TransactionDirection,
    /// Net effect on the wallet balance, in satoshis.
    pub amount: i64,
    pub fee: u64,
    /// `None` while unmined.
    pub block_height: Option<u32>,
    pub timestamp: i64,
}

pub trait TxIndex: Send {
    /// Create the buckets the index expects. Idempotent.
    fn init_schema(&mut self) -> Result<(), StoreError>;

    /// Height of the last fully indexed block, 0 for a fresh index.
    fn end_block(&self) -> Result<u32, StoreError>;

    fn set_end_block(&mut self, height: u32) -> Result<(), StoreError>;

    /// Insert or replace a transaction, keyed by hash.
    fn save_transaction(&mut self, tx: &IndexedTransaction) -> Result<(), StoreError>;

    fn transaction(&self, hash: &Txid) -> Result<Option<IndexedTransaction>, StoreError>;

    /// Transactions ordered newest first: unmined, then by descending
    /// height, then by descending timestamp.
    fn transactions(&self) -> Result<Vec<IndexedTransaction>, StoreError>;

    /// Release the handle. Further calls report [`StoreError::Closed`];
    /// closing twice is a no-op.
    fn close(&mut self) -> Result<(), StoreError>;

    /// Height to resume indexing from, leaving room for a reorg.
    fn resume_height(&self) -> Result<u32, StoreError> {
        Ok(self.end_block()?.saturating_sub(MAX_REORG_BLOCKS))
    }
}

pub(crate) fn newest_first(txs: &mut [IndexedTransaction]) {
    txs.sort_by(|a, b| {
        let height = |tx: &IndexedTransaction| tx.block_height.unwrap_or(u32::MAX);
        height(b)
            .cmp(&height(a))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
}

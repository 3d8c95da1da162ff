//! Chain backend RPC abstraction.
//!
//! Defines the [`RpcClient`] trait a session may hold, an HTTP JSON-RPC
//! implementation ([`HttpRpcClient`]), and a test mock (`mock::MockRpc`).

mod http_adapter;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use http_adapter::{HttpRpcClient, RpcOptions};
pub use types::ChainInfo;

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::RpcError;

/// The RPC surface a wallet session uses.
///
/// `stop` is synchronous so teardown can run outside a runtime. After it
/// returns, every call fails with [`RpcError::Stopped`].
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn get_blockchain_info(&self) -> Result<ChainInfo, RpcError>;

    /// Raw serialized transaction bytes, `None` when the backend does not
    /// know the transaction.
    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Option<Vec<u8>>, RpcError>;

    fn stop(&self);

    fn is_stopped(&self) -> bool;
}

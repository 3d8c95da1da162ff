//! Native JSON-RPC client for Bitcoin Core compatible endpoints.
//!
//! Implements [`RpcClient`](super::RpcClient) over JSON-RPC using
//! `reqwest`, with basic or cookie-file auth.

mod client;
mod connection;
mod protocol;

pub use client::{HttpRpcClient, RpcOptions};

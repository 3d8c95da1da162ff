use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bitcoin::hex::FromHex;
use bitcoin::Txid;
use reqwest::{header, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::RpcError;

use super::super::types::ChainInfo;
use super::super::RpcClient;
use super::connection::{parse_endpoint, resolve_auth};
use super::protocol::{is_tx_not_found, parse_jsonrpc_error, JsonRpcRequest, JsonRpcResponse};

/// Where and how to reach the chain backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcOptions {
    pub endpoint: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub cookie_file: Option<PathBuf>,
}

/// Bitcoin Core JSON-RPC client over HTTP(S).
pub struct HttpRpcClient {
    client: reqwest::Client,
    url: Url,
    auth: Option<(String, String)>,
    next_id: AtomicU64,
    stopped: AtomicBool,
}

impl HttpRpcClient {
    /// Authentication precedence: explicit `user` + `pass`, then the
    /// cookie file, then none.
    pub fn new(options: &RpcOptions) -> Result<Self, RpcError> {
        let auth = resolve_auth(
            options.user.as_deref(),
            options.pass.as_deref(),
            options.cookie_file.as_deref(),
        )?;
        let url = parse_endpoint(&options.endpoint)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RpcError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            client,
            url,
            auth,
            next_id: AtomicU64::new(initial_request_id()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, RpcError> {
        if self.is_stopped() {
            return Err(RpcError::Stopped);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            rpc.id = id,
            rpc.method = method,
            rpc.params = params.len(),
            "rpc call"
        );
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let mut builder = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&req);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(rpc.id = id, rpc.method = method, %status, body_len = body.len(), "rpc response");
        trace!(rpc.id = id, rpc.method = method, body = %body, "rpc response body");

        // A stop issued while the request was in flight wins.
        if self.is_stopped() {
            return Err(RpcError::Stopped);
        }

        let decoded: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            RpcError::InvalidResponse(format!("decode JSON-RPC response: {e}; body={body}"))
        })?;
        if let Some(err) = decoded.error {
            return Err(parse_jsonrpc_error(err));
        }
        Ok(decoded.result.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn get_blockchain_info(&self) -> Result<ChainInfo, RpcError> {
        let raw = self.rpc_call("getblockchaininfo", Vec::new()).await?;
        serde_json::from_value(raw)
            .map_err(|e| RpcError::InvalidResponse(format!("invalid getblockchaininfo result: {e}")))
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Option<Vec<u8>>, RpcError> {
        let raw = match self
            .rpc_call(
                "getrawtransaction",
                vec![serde_json::json!(txid.to_string()), serde_json::json!(false)],
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) if is_tx_not_found(&e) => return Ok(None),
            Err(e) => return Err(e),
        };
        let hex = raw.as_str().ok_or_else(|| {
            RpcError::InvalidResponse(format!("getrawtransaction returned non-string {raw}"))
        })?;
        Vec::<u8>::from_hex(hex)
            .map(Some)
            .map_err(|e| RpcError::InvalidResponse(format!("getrawtransaction hex: {e}")))
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!(endpoint = %self.url, "rpc client stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

fn initial_request_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

//! JSON-RPC over HTTP, shared by rippled and EVM nodes

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

/// Response envelope; rippled reports errors inside `result`, EVM nodes beside it
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    pub result: Option<Value>,
    pub error: Option<Value>,
}

impl JsonRpcResponse {
    /// `result`, or an error if the node reported one at the envelope level
    pub fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(anyhow!("RPC error: {}", err));
        }
        self.result
            .ok_or_else(|| anyhow!("no result in RPC response"))
    }
}

pub async fn call(client: &Client, url: &str, method: &str, params: Value) -> Result<JsonRpcResponse> {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    });

    client
        .post(url)
        .json(&payload)
        .send()
        .await
        .with_context(|| format!("{method} request failed"))?
        .error_for_status()
        .with_context(|| format!("{method} returned an error status"))?
        .json::<JsonRpcResponse>()
        .await
        .with_context(|| format!("failed to parse {method} response"))
}

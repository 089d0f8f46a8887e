//! Minimal Ethereum JSON-RPC transport.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for a single RPC request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Make a JSON-RPC call and deserialize the result.
///
/// A `null` result deserializes into `None` when `T` is an `Option`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    tracing::trace!(method, ?params, "JSON-RPC request");

    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let status = response.status();
    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response (HTTP {})", method, status))?;

    if let Some(error) = result.get("error") {
        let error: RpcError = serde_json::from_value(error.clone())
            .with_context(|| format!("Malformed error in {} response", method))?;
        match error.data {
            Some(data) => anyhow::bail!(
                "RPC error {} from {}: {} ({})",
                error.code,
                method,
                error.message,
                data
            ),
            None => anyhow::bail!("RPC error {} from {}: {}", error.code, method, error.message),
        }
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

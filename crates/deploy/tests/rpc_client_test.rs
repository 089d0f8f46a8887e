//! `RpcChainClient` tests against a local JSON-RPC node.
//!
//! The node is a plain HTTP responder on a tokio `TcpListener` that answers
//! every request through a handler and records the methods it was called with.

use std::{
    str::FromStr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use alloy_consensus::TxEnvelope;
use alloy_core::primitives::{Address, Bytes, TxKind, keccak256};
use alloy_eips::eip2718::Decodable2718;
use alloy_signer_local::PrivateKeySigner;
use serde_json::{Value, json};
use somnia_deploy::{ChainClient, DeployerIdentity, PendingDeployment, RpcChainClient, TxConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use url::Url;

const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const CHAIN_ID: u64 = 50312;

struct MockNode {
    url: Url,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockNode {
    async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let handler = Arc::new(handler);
        let recorded = calls.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, handler.as_ref(), &recorded).await;
                });
            }
        });

        Self { url, calls }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|m| *m == method).count()
    }

    fn client(&self, tx: TxConfig) -> RpcChainClient {
        RpcChainClient::new(&self.url, tx).unwrap()
    }
}

/// Answer a single HTTP request, then close the connection.
async fn serve<F>(
    mut stream: TcpStream,
    handler: &F,
    calls: &Mutex<Vec<String>>,
) -> std::io::Result<()>
where
    F: Fn(&str, &Value) -> Value,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let (body_start, content_length) = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            break (pos + 4, length);
        }
    };

    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request: Value = serde_json::from_slice(&buf[body_start..body_start + content_length])?;
    let method = request["method"].as_str().unwrap_or_default().to_string();
    calls.lock().unwrap().push(method.clone());

    let mut response = handler(&method, &request["params"]);
    response["jsonrpc"] = json!("2.0");
    response["id"] = request["id"].clone();

    let body = response.to_string();
    let head = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body.as_bytes()).await?;
    stream.shutdown().await
}

fn ok(result: Value) -> Value {
    json!({ "result": result })
}

fn rpc_error(code: i64, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

fn identity() -> DeployerIdentity {
    DeployerIdentity::from_signer(KEY.parse::<PrivateKeySigner>().unwrap())
}

fn fast_tx(confirmations: u64) -> TxConfig {
    TxConfig {
        confirmations,
        receipt_timeout_secs: 1,
        poll_interval_ms: 10,
        ..TxConfig::default()
    }
}

fn pending() -> PendingDeployment {
    PendingDeployment {
        tx_hash: keccak256(b"deployment"),
        nonce: 0,
        expected_address: Address::repeat_byte(0x02),
    }
}

fn receipt(status: &str, block: &str) -> Value {
    ok(json!({
        "status": status,
        "contractAddress": Address::repeat_byte(0x02),
        "blockNumber": block,
        "gasUsed": "0x5208",
    }))
}

#[tokio::test]
async fn test_submit_and_confirm_deployment() {
    let raw_tx = Arc::new(Mutex::new(None::<Bytes>));
    let captured = raw_tx.clone();
    let deployer = identity().address();
    let contract = deployer.create(5);

    let node = MockNode::start(move |method, params| match method {
        "eth_chainId" => ok(json!("0xc488")),
        "eth_getTransactionCount" => ok(json!("0x5")),
        "eth_gasPrice" => ok(json!("0x3b9aca00")),
        "eth_estimateGas" => ok(json!("0x186a0")),
        "eth_sendRawTransaction" => {
            let raw = Bytes::from_str(params[0].as_str().unwrap()).unwrap();
            let hash = keccak256(&raw);
            *captured.lock().unwrap() = Some(raw);
            ok(json!(hash))
        }
        "eth_getTransactionReceipt" => ok(json!({
            "status": "0x1",
            "contractAddress": contract,
            "blockNumber": "0x10",
            "gasUsed": "0x17318",
        })),
        "eth_getCode" => ok(json!("0x6080")),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;
    let client = node.client(fast_tx(1));

    let pending = client
        .submit_deployment(&identity(), Bytes::from_static(&[0x60, 0x80]))
        .await
        .unwrap();
    assert_eq!(pending.nonce, 5);
    assert_eq!(pending.expected_address, contract);

    let raw = raw_tx.lock().unwrap().clone().unwrap();
    assert_eq!(pending.tx_hash, keccak256(&raw));

    let envelope = TxEnvelope::decode_2718(&mut &raw[..]).unwrap();
    let tx = envelope.as_legacy().unwrap().tx();
    assert_eq!(tx.chain_id, Some(CHAIN_ID));
    assert_eq!(tx.nonce, 5);
    assert_eq!(tx.gas_price, 1_000_000_000);
    // 120% of the 100_000 estimate.
    assert_eq!(tx.gas_limit, 120_000);
    assert_eq!(tx.to, TxKind::Create);
    assert_eq!(tx.input, Bytes::from_static(&[0x60, 0x80]));

    let confirmation = client.await_confirmation(&pending).await.unwrap();
    assert_eq!(confirmation.address, contract);
    assert_eq!(confirmation.block_number, 16);
    assert_eq!(confirmation.gas_used, 95_000);

    assert_eq!(
        node.calls(),
        vec![
            "eth_chainId",
            "eth_getTransactionCount",
            "eth_gasPrice",
            "eth_estimateGas",
            "eth_sendRawTransaction",
            "eth_getTransactionReceipt",
            "eth_getCode",
        ]
    );
}

#[tokio::test]
async fn test_chain_id_is_cached() {
    let node = MockNode::start(|method, _| match method {
        "eth_chainId" => ok(json!("0xc488")),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;
    let client = node.client(fast_tx(1));

    assert_eq!(client.chain_id().await.unwrap(), CHAIN_ID);
    assert_eq!(client.chain_id().await.unwrap(), CHAIN_ID);
    assert_eq!(node.count("eth_chainId"), 1);
}

#[tokio::test]
async fn test_rpc_error_surfaces_on_submission() {
    let node = MockNode::start(|method, _| match method {
        "eth_chainId" => ok(json!("0xc488")),
        "eth_getTransactionCount" => ok(json!("0x0")),
        "eth_gasPrice" => ok(json!("0x1")),
        "eth_estimateGas" => rpc_error(3, "execution reverted: supply too large"),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;
    let client = node.client(fast_tx(1));

    let err = client
        .submit_deployment(&identity(), Bytes::from_static(&[0x60, 0x80]))
        .await
        .unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("Gas estimation failed"), "{message}");
    assert!(message.contains("execution reverted: supply too large"), "{message}");
    assert_eq!(node.count("eth_sendRawTransaction"), 0);
}

#[tokio::test]
async fn test_reverted_receipt() {
    let node = MockNode::start(|method, _| match method {
        "eth_getTransactionReceipt" => receipt("0x0", "0x10"),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;
    let client = node.client(fast_tx(1));

    let err = client.await_confirmation(&pending()).await.unwrap_err();

    assert!(format!("{err:#}").contains("reverted"));
    assert_eq!(node.count("eth_getCode"), 0);
}

#[tokio::test]
async fn test_receipt_timeout() {
    let node = MockNode::start(|method, _| match method {
        "eth_getTransactionReceipt" => ok(Value::Null),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;
    let client = node.client(fast_tx(1));

    let err = client.await_confirmation(&pending()).await.unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("Timed out after 1s"), "{message}");
    assert!(message.contains("still pending"), "{message}");
}

#[tokio::test]
async fn test_empty_code_after_deployment() {
    let node = MockNode::start(|method, _| match method {
        "eth_getTransactionReceipt" => receipt("0x1", "0x10"),
        "eth_getCode" => ok(json!("0x")),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;
    let client = node.client(fast_tx(1));

    let err = client.await_confirmation(&pending()).await.unwrap_err();

    assert!(format!("{err:#}").contains("No code at"));
}

#[tokio::test]
async fn test_waits_for_confirmation_depth() {
    let head = Arc::new(AtomicU64::new(0x10));
    let chain_head = head.clone();

    let node = MockNode::start(move |method, _| match method {
        "eth_getTransactionReceipt" => receipt("0x1", "0x10"),
        // Every poll mines a block.
        "eth_blockNumber" => ok(json!(format!(
            "{:#x}",
            chain_head.fetch_add(1, Ordering::SeqCst)
        ))),
        "eth_getCode" => ok(json!("0x6080")),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;
    let client = node.client(fast_tx(3));

    let confirmation = client.await_confirmation(&pending()).await.unwrap();

    assert_eq!(confirmation.block_number, 16);
    // Heads 0x10 and 0x11 are too shallow, 0x12 gives three confirmations.
    assert_eq!(node.count("eth_blockNumber"), 3);
    assert_eq!(node.count("eth_getCode"), 1);
}

#[tokio::test]
async fn test_receipt_and_depth_share_one_deadline() {
    let started = Instant::now();

    let node = MockNode::start(move |method, _| match method {
        "eth_getTransactionReceipt" if started.elapsed() < Duration::from_millis(800) => {
            ok(Value::Null)
        }
        "eth_getTransactionReceipt" => receipt("0x1", "0x10"),
        // The chain never advances past the inclusion block.
        "eth_blockNumber" => ok(json!("0x10")),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;
    let client = node.client(fast_tx(3));

    let err = client.await_confirmation(&pending()).await.unwrap_err();

    assert!(format!("{err:#}").contains("confirmations"));
    assert!(
        started.elapsed() < Duration::from_millis(1_600),
        "waited {:?}",
        started.elapsed()
    );
}

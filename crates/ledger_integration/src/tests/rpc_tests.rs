use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use tokio::{net::TcpListener, sync::Mutex};

use super::*;
use crate::{
    abi::selector,
    test_fixtures::{encode_record, encode_uint},
};

#[derive(Clone)]
enum AccountsReply {
    Accounts(Vec<String>),
    Error(i64, String),
}

struct MockNode {
    records: Vec<RawRecord>,
    accounts: AccountsReply,
    truncate_records: bool,
    call_targets: Mutex<Vec<String>>,
}

fn ok(id: Value, result: Value) -> Json<Value> {
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

fn fail(id: Value, code: i64, message: &str) -> Json<Value> {
    Json(json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } }))
}

async fn handle_rpc(State(node): State<Arc<MockNode>>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    match request["method"].as_str().unwrap_or_default() {
        "eth_call" => {
            let call = &request["params"][0];
            node.call_targets
                .lock()
                .await
                .push(call["to"].as_str().unwrap_or_default().to_string());
            let data = call["data"].as_str().unwrap_or_default();
            let bytes = hex::decode(data.trim_start_matches("0x")).unwrap_or_default();

            if bytes.starts_with(&selector(RECORD_COUNT_SIGNATURE)) {
                let count = U256::from(node.records.len());
                return ok(id, json!(format!("0x{}", hex::encode(encode_uint(count)))));
            }
            if bytes.starts_with(&selector(RECORD_AT_SIGNATURE)) && bytes.len() == 36 {
                let index = U256::from_be_slice(&bytes[4..36]);
                let record = usize::try_from(index)
                    .ok()
                    .and_then(|index| node.records.get(index));
                return match record {
                    Some(record) => {
                        let mut payload = encode_record(record);
                        if node.truncate_records {
                            payload.truncate(2 * abi::WORD_LEN);
                        }
                        ok(id, json!(format!("0x{}", hex::encode(payload))))
                    }
                    None => fail(id, 3, "execution reverted"),
                };
            }
            fail(id, -32601, "unknown selector")
        }
        "eth_requestAccounts" => match &node.accounts {
            AccountsReply::Accounts(accounts) => ok(id, json!(accounts)),
            AccountsReply::Error(code, message) => fail(id, *code, message),
        },
        other => fail(id, -32601, &format!("method not found: {other}")),
    }
}

async fn spawn_mock_node(node: MockNode) -> (String, Arc<MockNode>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let node = Arc::new(node);
    let app = Router::new()
        .route("/", post(handle_rpc))
        .with_state(Arc::clone(&node));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), node)
}

fn node_with(records: Vec<RawRecord>, accounts: AccountsReply) -> MockNode {
    MockNode {
        records,
        accounts,
        truncate_records: false,
        call_targets: Mutex::new(Vec::new()),
    }
}

fn raw(creator: u8, id: u64, title: &str) -> RawRecord {
    RawRecord {
        creator: Address::repeat_byte(creator),
        id: U256::from(id),
        title: title.to_string(),
        body: format!("statement of {title}"),
        reward: U256::from(id) * U256::from(1_000_000_000_000_000_000u128),
        expires_at: U256::from(1_000 * id),
    }
}

#[tokio::test]
async fn reads_count_and_records_through_eth_call() {
    let records = vec![raw(0xaa, 1, "T1"), raw(0, 2, "T2")];
    let (url, node) = spawn_mock_node(node_with(
        records.clone(),
        AccountsReply::Accounts(Vec::new()),
    ))
    .await;
    let contract = Address::repeat_byte(0x42);
    let source = EvmRecordSource::new(&url, contract).expect("source");

    assert_eq!(source.record_count().await.expect("count"), U256::from(2u64));
    assert_eq!(
        source.record_at(RecordIndex(0)).await.expect("record 0"),
        records[0]
    );
    assert_eq!(
        source.record_at(RecordIndex(1)).await.expect("record 1"),
        records[1]
    );

    let targets = node.call_targets.lock().await;
    assert_eq!(targets.len(), 3);
    assert!(targets
        .iter()
        .all(|to| to.eq_ignore_ascii_case(&contract.to_string())));
}

#[tokio::test]
async fn reverted_record_read_is_an_error() {
    let (url, _node) = spawn_mock_node(node_with(
        vec![raw(0xaa, 1, "T1")],
        AccountsReply::Accounts(Vec::new()),
    ))
    .await;
    let source = EvmRecordSource::new(&url, Address::repeat_byte(0x42)).expect("source");

    let err = source
        .record_at(RecordIndex(5))
        .await
        .expect_err("must fail");
    let rpc_err = err
        .downcast_ref::<JsonRpcError>()
        .expect("json-rpc error preserved in chain");
    assert_eq!(rpc_err.code, 3);
    assert!(format!("{err:#}").contains("record 5"));
}

#[tokio::test]
async fn truncated_record_payload_keeps_decode_error_in_chain() {
    let mut node = node_with(vec![raw(0xaa, 1, "T1")], AccountsReply::Accounts(Vec::new()));
    node.truncate_records = true;
    let (url, _node) = spawn_mock_node(node).await;
    let source = EvmRecordSource::new(&url, Address::repeat_byte(0x42)).expect("source");

    let err = source
        .record_at(RecordIndex(0))
        .await
        .expect_err("must fail");
    assert!(matches!(
        err.downcast_ref::<abi::AbiError>(),
        Some(abi::AbiError::Truncated { .. })
    ));
    assert!(format!("{err:#}").starts_with("malformed record 0"));
}

#[tokio::test]
async fn unreachable_endpoint_is_an_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let source =
        EvmRecordSource::new("http://127.0.0.1:1", Address::repeat_byte(0x42)).expect("source");
    let err = source.record_count().await.expect_err("must fail");
    assert!(format!("{err:#}").contains("failed to reach json-rpc endpoint"));
}

#[test]
fn rejects_non_http_rpc_url() {
    assert!(EvmRecordSource::new("ws://localhost:8545", Address::ZERO).is_err());
    assert!(EvmRecordSource::new("not a url", Address::ZERO).is_err());
}

#[test]
fn hex_payload_requires_prefix() {
    assert_eq!(decode_hex_payload("0x0aff").expect("hex"), vec![0x0a, 0xff]);
    assert!(decode_hex_payload("0aff").is_err());
    assert!(decode_hex_payload("0xzz").is_err());
}

#[tokio::test]
async fn request_accounts_parses_addresses() {
    let first = Address::repeat_byte(0x01);
    let second = Address::repeat_byte(0x02);
    let (url, _node) = spawn_mock_node(node_with(
        Vec::new(),
        AccountsReply::Accounts(vec![first.to_string(), second.to_string().to_lowercase()]),
    ))
    .await;
    let provider = RpcIdentityProvider::new(&url, "eth_requestAccounts").expect("provider");

    let accounts = provider.request_accounts().await.expect("accounts");
    assert_eq!(accounts, vec![Account(first), Account(second)]);
}

#[tokio::test]
async fn user_rejection_reads_as_cancellation() {
    let (url, _node) = spawn_mock_node(node_with(
        Vec::new(),
        AccountsReply::Error(USER_REJECTED_REQUEST, "User rejected the request.".into()),
    ))
    .await;
    let provider = RpcIdentityProvider::new(&url, "eth_requestAccounts").expect("provider");

    assert!(provider
        .request_accounts()
        .await
        .expect("cancellation is not an error")
        .is_empty());
}

#[tokio::test]
async fn other_account_errors_propagate() {
    let (url, _node) = spawn_mock_node(node_with(
        Vec::new(),
        AccountsReply::Error(-32603, "wallet locked".into()),
    ))
    .await;
    let provider = RpcIdentityProvider::new(&url, "eth_requestAccounts").expect("provider");

    let err = provider.request_accounts().await.expect_err("must fail");
    assert!(err.to_string().contains("wallet locked"));
}

#[tokio::test]
async fn malformed_account_is_an_error() {
    let (url, _node) = spawn_mock_node(node_with(
        Vec::new(),
        AccountsReply::Accounts(vec!["0x1234".into()]),
    ))
    .await;
    let provider = RpcIdentityProvider::new(&url, "eth_requestAccounts").expect("provider");

    assert!(provider.request_accounts().await.is_err());
}

#[tokio::test]
async fn static_provider_returns_configured_account() {
    let account = Account(Address::repeat_byte(0x07));
    assert_eq!(
        StaticIdentityProvider::new(Some(account))
            .request_accounts()
            .await
            .expect("accounts"),
        vec![account]
    );
    assert!(StaticIdentityProvider::new(None)
        .request_accounts()
        .await
        .expect("accounts")
        .is_empty());
}

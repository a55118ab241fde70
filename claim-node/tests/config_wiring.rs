//! A claim service built from a config file, reading pass ownership from a
//! mocked JSON-RPC node.

use claim_node::claim_api::ClaimApi;
use claim_node::config::{load_config, ConfigError};
use serde_json::json;
use std::io::Write as _;
use std::net::{IpAddr, Ipv4Addr};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zq_core::Address;

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const DEV_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const PLAYER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn write_config(rpc_url: &str, extra: &str) -> tempfile::NamedTempFile {
    let raw = format!(
        r#"
[chain]
url = "{rpc_url}"
timeout_ms = 1000
retry_max = 2

[signer]
private_key = "{DEV_KEY}"
expected_address = "{DEV_ADDR}"

[rewards]
[[rewards.bonus]]
symbol = "WCT"
address = "0x1111111111111111111111111111111111111111"
min = "0.05"
max = "0.1"

[[rewards.bonus]]
symbol = "DEGEN"
address = "0x2222222222222222222222222222222222222222"
min = "3"
max = "5"

{extra}
"#
    );
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(raw.as_bytes()).unwrap();
    file
}

fn balance_result(balance: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": format!("0x{balance:064x}"),
    }))
}

fn claim_body() -> Vec<u8> {
    serde_json::to_vec(&json!({"userAddress": PLAYER, "score": 42})).unwrap()
}

#[tokio::test]
async fn configured_service_signs_for_pass_holder() {
    let node = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_call"})))
        .respond_with(balance_result(1))
        .expect(1)
        .mount(&node)
        .await;

    let file = write_config(&node.uri(), "");
    let cfg = load_config(file.path()).unwrap();
    let api = ClaimApi::from_config(&cfg).unwrap();
    assert_eq!(api.signer_address(), DEV_ADDR.parse::<Address>().unwrap());

    let resp = api.submit_claim(CLIENT, &claim_body()).await.unwrap();
    assert_eq!(resp.amount_zqt, 42);
    assert!(resp.v == 27 || resp.v == 28);
}

#[tokio::test]
async fn zero_balance_is_forbidden() {
    let node = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(balance_result(0))
        .mount(&node)
        .await;

    let file = write_config(&node.uri(), "");
    let api = ClaimApi::from_config(&load_config(file.path()).unwrap()).unwrap();
    let err = api.submit_claim(CLIENT, &claim_body()).await.unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn rpc_outage_is_unavailable_after_retries() {
    let node = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&node)
        .await;

    let file = write_config(&node.uri(), "");
    let api = ClaimApi::from_config(&load_config(file.path()).unwrap()).unwrap();
    let err = api.submit_claim(CLIENT, &claim_body()).await.unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.public_code(), "UNAVAILABLE");
}

#[tokio::test]
async fn configured_limiter_applies() {
    let node = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(balance_result(1))
        .mount(&node)
        .await;

    let file = write_config(
        &node.uri(),
        "[limits]\nenabled = true\nburst = 1\nrefill_per_minute = 1\n",
    );
    let api = ClaimApi::from_config(&load_config(file.path()).unwrap()).unwrap();
    api.submit_claim(CLIENT, &claim_body()).await.unwrap();
    let err = api.submit_claim(CLIENT, &claim_body()).await.unwrap_err();
    assert_eq!(err.public_code(), "RATE_LIMITED");
}

#[test]
fn wrong_expected_signer_refuses_to_build() {
    let file = write_config("http://127.0.0.1:1", "");
    let mut cfg = load_config(file.path()).unwrap();
    cfg.signer.expected_address = Some("0x1111111111111111111111111111111111111111".to_string());
    match ClaimApi::from_config(&cfg) {
        Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "signer.expected_address"),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("mismatched signer must not build"),
    }
}

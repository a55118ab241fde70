//! End-to-end checks of the claim HTTP surface against an in-memory pass
//! registry.

use claim_node::claim_api::{ClaimApi, ClaimResponseV1};
use claim_node::config::LimitsConfig;
use claim_node::http_server::{serve_with_listener, AppState};
use claim_node::issuance_limit::IssuanceLimiter;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use zq_core::allocation::display_amount;
use zq_core::{
    checksum, recover_signer, Address, AttestationSigner, BonusToken, ClaimAttestation,
    ClaimSignature, CounterNonceSource, EligibilityVerifier, FixedSeedRng, FixedTimeSource,
    MockPassRegistry, RewardAllocator, U256,
};

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const DEV_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const PLAYER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

struct TestServer {
    base: String,
    registry: Arc<MockPassRegistry>,
    _shutdown: oneshot::Sender<()>,
}

fn bonus_tokens() -> [BonusToken; 2] {
    [
        BonusToken::from_decimal_bounds("WCT", Address::repeat_byte(0x33), 18, "0.05", "0.1")
            .unwrap(),
        BonusToken::from_decimal_bounds("DEGEN", Address::repeat_byte(0x44), 18, "3", "5")
            .unwrap(),
    ]
}

fn claim_api(registry: Arc<MockPassRegistry>) -> ClaimApi {
    let verifier = EligibilityVerifier::new(registry, U256::one());
    let allocator = RewardAllocator::new("ZQT", 10_000, 4, bonus_tokens()).unwrap();
    let signer = AttestationSigner::from_private_key(DEV_KEY).unwrap();
    ClaimApi::new(verifier, allocator, signer, 60)
        .with_rng(Arc::new(FixedSeedRng(42)))
        .with_nonces(Arc::new(CounterNonceSource::new(1_000)))
        .with_time(Arc::new(FixedTimeSource::new(1_700_000_000_000)))
}

async fn start(state: AppState, registry: Arc<MockPassRegistry>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        serve_with_listener(listener, state, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });
    TestServer {
        base: format!("http://{addr}"),
        registry,
        _shutdown: tx,
    }
}

async fn start_configured(api: impl FnOnce(Arc<MockPassRegistry>) -> ClaimApi) -> TestServer {
    let registry = Arc::new(MockPassRegistry::new());
    let player: Address = PLAYER.parse().unwrap();
    registry.set_balance(player, U256::one(), U256::one());
    let state = AppState::new(Some(Arc::new(api(registry.clone()))), true);
    start(state, registry).await
}

async fn post_claim(base: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/api/claim"))
        .json(body)
        .send()
        .await
        .unwrap()
}

fn recovered_signer(resp: &ClaimResponseV1) -> (ClaimAttestation, Address) {
    let raw = hex::decode(resp.databytes.trim_start_matches("0x")).unwrap();
    let sig = ClaimSignature::from_parts(resp.v, &resp.r, &resp.s).unwrap();
    (
        ClaimAttestation::decode(&raw).unwrap(),
        recover_signer(&raw, &sig).unwrap(),
    )
}

#[tokio::test]
async fn holder_gets_signed_claim() {
    let server = start_configured(claim_api).await;
    let resp = post_claim(&server.base, &json!({"userAddress": PLAYER, "score": 150})).await;
    assert_eq!(resp.status(), 200);

    let body: ClaimResponseV1 = resp.json().await.unwrap();
    assert_eq!(body.amount_zqt, 150);
    assert_eq!(body.deadline, 1_700_000_060);
    assert_eq!(body.nonce, "1000");

    let (claim, signer) = recovered_signer(&body);
    assert_eq!(signer, DEV_ADDR.parse::<Address>().unwrap());
    assert_eq!(claim.recipient, PLAYER.parse::<Address>().unwrap());
    assert_eq!(claim.primary_amount, U256::from(150u64));

    let token = bonus_tokens()
        .into_iter()
        .find(|t| t.symbol == body.reward_token_symbol)
        .expect("symbol is WCT or DEGEN");
    assert_eq!(body.reward_token_address, checksum(&token.address));
    assert_eq!(claim.bonus_token, token.address);
    assert!(claim.bonus_amount >= token.min && claim.bonus_amount < token.max);
    assert_eq!(
        body.reward_token_amount,
        display_amount(claim.bonus_amount, 18, 4).unwrap()
    );
}

#[tokio::test]
async fn response_uses_wire_field_names() {
    let server = start_configured(claim_api).await;
    let resp = post_claim(&server.base, &json!({"userAddress": PLAYER, "score": 7})).await;
    let body: Value = resp.json().await.unwrap();
    for field in [
        "databytes",
        "v",
        "r",
        "s",
        "rewardTokenSymbol",
        "rewardTokenAmount",
        "amountZQT",
        "rewardTokenAddress",
        "deadline",
        "nonce",
    ] {
        assert!(body.get(field).is_some(), "missing {field}");
    }
    assert_eq!(body["amountZQT"], 7);
    assert!(body["databytes"].as_str().unwrap().len() == 2 + 2 * 192);
}

#[tokio::test]
async fn zero_score_is_rejected_before_lookup() {
    let server = start_configured(claim_api).await;
    let resp = post_claim(&server.base, &json!({"userAddress": PLAYER, "score": 0})).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(body["error"], "Score must be greater than 0 to claim");
    assert_eq!(server.registry.calls(), 0);
}

#[tokio::test]
async fn malformed_body_is_invalid_input() {
    let server = start_configured(claim_api).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/claim", server.base))
        .header("content-type", "application/json")
        .body("{\"userAddress\":")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(server.registry.calls(), 0);
}

#[tokio::test]
async fn non_holder_is_forbidden() {
    let server = start_configured(claim_api).await;
    let stranger = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";
    let resp = post_claim(&server.base, &json!({"userAddress": stranger, "score": 150})).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "FORBIDDEN");
    assert_eq!(body["error"], "You need to mint Zero Quest Pass to play & claim");
}

#[tokio::test]
async fn replayed_request_gets_fresh_nonce() {
    let server = start_configured(claim_api).await;
    let req = json!({"userAddress": PLAYER, "score": 150});
    let first: ClaimResponseV1 = post_claim(&server.base, &req).await.json().await.unwrap();
    let second: ClaimResponseV1 = post_claim(&server.base, &req).await.json().await.unwrap();

    assert_ne!(first.nonce, second.nonce);
    assert_ne!(first.databytes, second.databytes);
    let dev: Address = DEV_ADDR.parse().unwrap();
    assert_eq!(recovered_signer(&first).1, dev);
    assert_eq!(recovered_signer(&second).1, dev);
}

#[tokio::test]
async fn issuance_limiter_returns_429_with_retry_after() {
    let server = start_configured(|registry| {
        claim_api(registry).with_limiter(IssuanceLimiter::new(
            LimitsConfig {
                enabled: true,
                burst: 1,
                refill_per_minute: 1,
            },
            Arc::new(FixedTimeSource::new(0)),
        ))
    })
    .await;

    let req = json!({"userAddress": PLAYER, "score": 10});
    assert_eq!(post_claim(&server.base, &req).await.status(), 200);

    let resp = post_claim(&server.base, &req).await;
    assert_eq!(resp.status(), 429);
    let retry_after: u64 = resp
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(server.registry.calls(), 1);
}

#[tokio::test]
async fn degraded_mode_fails_closed() {
    let registry = Arc::new(MockPassRegistry::new());
    let server = start(AppState::new(None, true), registry).await;

    let resp = post_claim(&server.base, &json!({"userAddress": PLAYER, "score": 150})).await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "CONFIGURATION");
    let text = body.to_string();
    for secret in ["SIGNER_PRIVATE_KEY", "BASE_RPC_URL", "WCT_TOKEN_ADDRESS"] {
        assert!(!text.contains(secret));
    }

    let ready = reqwest::get(format!("{}/readyz", server.base)).await.unwrap();
    assert_eq!(ready.status(), 503);
    let health = reqwest::get(format!("{}/healthz", server.base)).await.unwrap();
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn preflight_allows_any_origin() {
    let server = start_configured(claim_api).await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/api/claim", server.base))
        .header("origin", "https://zeroquest.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let headers = resp.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("POST") && methods.contains("OPTIONS"));
    let allowed = headers["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("content-type"));
}

#[tokio::test]
async fn bare_options_is_answered_without_claiming() {
    let server = start_configured(claim_api).await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/api/claim", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert!(resp.text().await.unwrap().is_empty());
    assert_eq!(server.registry.calls(), 0);
}

#[tokio::test]
async fn cross_origin_post_carries_cors_header() {
    let server = start_configured(claim_api).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/claim", server.base))
        .header("origin", "https://zeroquest.example")
        .json(&json!({"userAddress": PLAYER, "score": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn metrics_and_readiness_when_configured() {
    let server = start_configured(claim_api).await;
    post_claim(&server.base, &json!({"userAddress": PLAYER, "score": 3})).await;

    let ready = reqwest::get(format!("{}/readyz", server.base)).await.unwrap();
    assert_eq!(ready.status(), 200);

    let metrics = reqwest::get(format!("{}/metrics", server.base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("claims_total"));
    assert!(metrics.contains("eligibility_lookups_total"));
}

#[tokio::test]
async fn metrics_can_be_disabled() {
    let registry = Arc::new(MockPassRegistry::new());
    let server = start(AppState::new(None, false), registry).await;
    let resp = reqwest::get(format!("{}/metrics", server.base)).await.unwrap();
    assert_eq!(resp.status(), 404);
}

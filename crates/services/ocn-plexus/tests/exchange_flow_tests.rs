// The out-of-network claim exchange, end to end over HTTP: a send to an
// email address opens an exchange, the claim URL serves a DID-auth
// presentation request, and a signed presentation claims the credential
// exactly once.
use ocn_identity::{KeyPair, VerifiablePresentation};
use ocn_plexus::{
    app::create_app,
    auth,
    config::ServiceConfig,
    delivery::CaptureDelivery,
    state::AppState,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn spawn_app() -> (String, AppState, Arc<CaptureDelivery>) {
    let mut config = ServiceConfig::default();
    config.jwt_secret = "test_secret_key_for_integration_tests".to_string();
    let delivery = Arc::new(CaptureDelivery::new());
    let state = AppState::with_delivery(config, delivery.clone()).unwrap();
    let app = create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", local_addr), state, delivery)
}

fn bearer(state: &AppState, kp: &KeyPair, scopes: &[&str]) -> String {
    auth::issue_token(
        kp.did.as_str(),
        scopes.iter().map(|s| s.to_string()).collect(),
        3600,
        &state.jwt,
    )
    .unwrap()
}

// Seed an issuer profile with a primary signing authority whose key the
// in-process signer holds.
async fn seed_issuer(client: &Client, url: &str, state: &AppState) -> String {
    let kp = KeyPair::generate();
    let token = bearer(state, &kp, &["*:*"]);
    let res = client
        .post(format!("{}/profile", url))
        .bearer_auth(&token)
        .json(&json!({ "profileId": "issuer", "displayName": "Issuer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let authority_kp = KeyPair::generate();
    state.signer.register_keypair(authority_kp.clone());
    let res = client
        .post(format!("{}/api/profile/signing-authority/register", url))
        .bearer_auth(&token)
        .json(&json!({
            "endpoint": "https://sa.example.com",
            "name": "issuing-co",
            "did": authority_kp.did.as_str(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    token
}

async fn send_out_of_network(
    client: &Client,
    url: &str,
    token: &str,
    suppress_delivery: bool,
) -> Value {
    let res = client
        .post(format!("{}/api/send", url))
        .bearer_auth(token)
        .json(&json!({
            "recipient": "holder@example.com",
            "template": { "credentialSubject": { "achievement": "rust-basics" } },
            "suppressDelivery": suppress_delivery,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

// Claim URLs carry the public domain; tests hit the same path on the
// local listener.
fn local_claim_path(claim_url: &str) -> String {
    let start = claim_url.find("/api/workflows").unwrap();
    claim_url[start..].to_string()
}

#[tokio::test]
async fn presentation_claims_the_exchange_exactly_once() {
    let (url, state, delivery) = spawn_app().await;
    let client = Client::new();
    let issuer_token = seed_issuer(&client, &url, &state).await;

    // The holder is a known profile, so claiming also lands the
    // credential in their incoming queue.
    let holder_kp = KeyPair::generate();
    let holder_token = bearer(&state, &holder_kp, &["*:*"]);
    let res = client
        .post(format!("{}/profile", url))
        .bearer_auth(&holder_token)
        .json(&json!({ "profileId": "holder", "displayName": "Holder" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    send_out_of_network(&client, &url, &issuer_token, false).await;
    let claim_url = delivery.last_claim_link().unwrap();
    let claim_path = local_claim_path(&claim_url);

    // An empty body yields the presentation request.
    let res = client
        .post(format!("{}{}", url, claim_path))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let vpr: Value = res.json().await.unwrap();
    let request = &vpr["verifiablePresentationRequest"];
    assert_eq!(request["query"][0]["type"], "DIDAuthentication");
    let challenge = request["challenge"].as_str().unwrap().to_string();
    let domain = request["domain"].as_str().unwrap().to_string();

    let vp = VerifiablePresentation::did_auth(&holder_kp, challenge, domain).unwrap();
    let res = client
        .post(format!("{}{}", url, claim_path))
        .json(&vp)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let claimed: Value = res.json().await.unwrap();
    assert_eq!(
        claimed["credential"]["credentialSubject"]["achievement"],
        "rust-basics"
    );

    // A second presentation cannot claim the same exchange.
    let res = client
        .post(format!("{}{}", url, claim_path))
        .json(&vp)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("{}/profile/incoming", url))
        .bearer_auth(&holder_token)
        .send()
        .await
        .unwrap();
    let incoming: Value = res.json().await.unwrap();
    assert_eq!(incoming.as_array().unwrap().len(), 1);

    // The issuer's inbox issuance is finalized and the ledger shows the
    // claim on the original transaction.
    let res = client
        .get(format!("{}/profile/inbox", url))
        .bearer_auth(&issuer_token)
        .send()
        .await
        .unwrap();
    let inbox: Value = res.json().await.unwrap();
    assert_eq!(inbox[0]["status"], "CLAIMED");

    let res = client
        .get(format!("{}/profile/activities", url))
        .bearer_auth(&issuer_token)
        .send()
        .await
        .unwrap();
    let page: Value = res.json().await.unwrap();
    let records = page["records"].as_array().unwrap();
    assert!(records.iter().any(|r| r["eventType"] == "CLAIMED"));
}

#[tokio::test]
async fn rejected_presentations_leave_the_exchange_claimable() {
    let (url, state, _delivery) = spawn_app().await;
    let client = Client::new();
    let issuer_token = seed_issuer(&client, &url, &state).await;

    let outcome = send_out_of_network(&client, &url, &issuer_token, true).await;
    let claim_path = local_claim_path(outcome["claimUrl"].as_str().unwrap());

    let res = client
        .post(format!("{}{}", url, claim_path))
        .send()
        .await
        .unwrap();
    let vpr: Value = res.json().await.unwrap();
    let challenge = vpr["verifiablePresentationRequest"]["challenge"]
        .as_str()
        .unwrap()
        .to_string();
    let domain = vpr["verifiablePresentationRequest"]["domain"]
        .as_str()
        .unwrap()
        .to_string();

    let holder_kp = KeyPair::generate();
    let wrong = VerifiablePresentation::did_auth(&holder_kp, "bogus", domain.clone()).unwrap();
    let res = client
        .post(format!("{}{}", url, claim_path))
        .json(&wrong)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // The failed attempt did not consume the exchange.
    let vp = VerifiablePresentation::did_auth(&holder_kp, challenge, domain).unwrap();
    let res = client
        .post(format!("{}{}", url, claim_path))
        .json(&vp)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn suppressed_sends_return_the_url_without_dispatch() {
    let (url, state, delivery) = spawn_app().await;
    let client = Client::new();
    let issuer_token = seed_issuer(&client, &url, &state).await;

    let outcome = send_out_of_network(&client, &url, &issuer_token, true).await;
    assert!(outcome["claimUrl"].as_str().unwrap().contains("/api/workflows/"));
    assert!(delivery.last_claim_link().is_none());
}

#[tokio::test]
async fn unknown_exchanges_are_not_found() {
    let (url, _state, _delivery) = spawn_app().await;
    let client = Client::new();
    let res = client
        .post(format!(
            "{}/api/workflows/{}/exchanges/{}",
            url,
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

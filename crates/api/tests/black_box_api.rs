//! Black-box API tests: real HTTP server on an ephemeral port, real JWTs.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::json;

use verenigingen_auth::{PrincipalId, Role};
use verenigingen_core::TenantId;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = verenigingen_api::app::build_app(jwt_secret.to_string()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// RFC 7519 wire claims (numeric iat/exp), as the validator consumes them.
#[derive(Serialize)]
struct MintClaims {
    sub: PrincipalId,
    tenant_id: TenantId,
    roles: Vec<Role>,
    iat: i64,
    exp: i64,
}

fn mint_jwt(jwt_secret: &str, tenant_id: TenantId, roles: Vec<Role>) -> String {
    let now = Utc::now().timestamp();
    let claims = MintClaims {
        sub: PrincipalId::new(),
        tenant_id,
        roles,
        iat: now - 30,
        exp: now + 600,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// Poll until a projection-backed GET succeeds (command path and read model
/// are eventually consistent).
async fn get_eventually(
    client: &reqwest::Client,
    url: &str,
    token: &str,
) -> serde_json::Value {
    for _ in 0..100 {
        let res = client.get(url).bearer_auth(token).send().await.unwrap();
        if res.status() == StatusCode::OK {
            return res.json().await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("resource did not become visible within timeout: {url}");
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn("test-secret").await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn("test-secret").await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn roles_gate_commands() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    // chapter-board cannot register members.
    let token = mint_jwt(jwt_secret, TenantId::new(), vec![Role::new("chapter-board")]);
    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/members", srv.base_url))
        .bearer_auth(token)
        .json(&json!({
            "member_number": "M-2025-0001",
            "full_name": "Jan de Vries",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn member_lifecycle_register_and_query() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("membership-manager")]);
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/members", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "member_number": "M-2025-0001",
            "full_name": "Jan de Vries",
            "contact": { "email": "jan@example.org" },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let member_id = created["id"].as_str().unwrap().to_string();

    let member = get_eventually(
        &client,
        &format!("{}/members/{}", srv.base_url, member_id),
        &token,
    )
    .await;
    assert_eq!(member["full_name"].as_str().unwrap(), "Jan de Vries");
    assert_eq!(member["status"].as_str().unwrap(), "active");

    // Suspend, then confirm the directory reflects it.
    let res = client
        .post(format!("{}/members/{}/suspend", srv.base_url, member_id))
        .bearer_auth(&token)
        .json(&json!({ "reason": "board decision" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    for _ in 0..100 {
        let member = get_eventually(
            &client,
            &format!("{}/members/{}", srv.base_url, member_id),
            &token,
        )
        .await;
        if member["status"].as_str().unwrap() == "suspended" {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("member did not become suspended in the read model");
}

#[tokio::test]
async fn invalid_member_payload_is_a_validation_error() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, TenantId::new(), vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/members", srv.base_url))
        .bearer_auth(token)
        .json(&json!({
            "member_number": "M-1",
            "full_name": "   ",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"].as_str().unwrap(), "validation_error");
}

#[tokio::test]
async fn dues_collection_via_http_end_to_end() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    // Member + membership + schedule.
    let res = client
        .post(format!("{}/members", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "member_number": "M-1", "full_name": "Jan de Vries" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let member_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(format!("{}/memberships", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "member_id": member_id,
            "membership_type": "Standard",
            "start_date": "2025-01-01",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{}/dues/schedules", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "member_id": member_id,
            "membership_type": "Standard",
            "billing_frequency": "monthly",
            "dues_rate": "12.50",
            "first_invoice_date": "2025-01-01",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let schedule_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Invoice covering January.
    let res = client
        .post(format!("{}/invoices", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "member_id": member_id,
            "schedule_id": schedule_id,
            "amount": "12.50",
            "due_date": "2025-01-31",
            "coverage_start": "2025-01-01",
            "coverage_end": "2025-01-31",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let invoice_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Invoice shows up as open.
    let invoice = get_eventually(
        &client,
        &format!("{}/invoices/{}", srv.base_url, invoice_id),
        &token,
    )
    .await;
    assert_eq!(invoice["outstanding"].as_str().unwrap(), "12.50");

    // Batch: create from the open invoice, walk the lifecycle.
    let res = client
        .post(format!("{}/batches", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "collection_date": "2025-02-03",
            "batch_type": "recurring",
            "entries": [{
                "invoice_id": invoice_id,
                "member_name": "Jan de Vries",
                "iban": "NL91ABNA0417164300",
                "bic": "ABNANL2A",
                "mandate_reference": "VV-2025-0001",
                "mandate_sign_date": "2025-01-02",
                "sequence_type": "Frst",
            }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let batch_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    for step in ["validate", "generate", "submit"] {
        let res = client
            .post(format!("{}/batches/{}/{}", srv.base_url, batch_id, step))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert!(
            res.status() == StatusCode::NO_CONTENT || res.status() == StatusCode::OK,
            "step {step} failed: {}",
            res.status()
        );
    }

    // pain.008 renders with the batch's single transaction.
    let res = client
        .get(format!("{}/batches/{}/pain008", srv.base_url, batch_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let xml = res.text().await.unwrap();
    assert!(xml.contains("pain.008.001.08"));
    assert!(xml.contains("<NbOfTxs>1</NbOfTxs>"));
    assert!(xml.contains("<MndtId>VV-2025-0001</MndtId>"));

    // Record a successful collection and close.
    let res = client
        .post(format!("{}/batches/{}/outcomes", srv.base_url, batch_id))
        .bearer_auth(&token)
        .json(&json!({
            "outcomes": [{ "invoice_id": invoice_id, "outcome": "collected" }],
            "close": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Batch reads processed; the invoice settles and leaves the open list.
    for _ in 0..100 {
        let batch = get_eventually(
            &client,
            &format!("{}/batches/{}", srv.base_url, batch_id),
            &token,
        )
        .await;
        if batch["status"].as_str().unwrap() == "processed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // Coverage for January is complete once payment lands.
    for _ in 0..100 {
        let coverage = get_eventually(
            &client,
            &format!("{}/dues/coverage/{}", srv.base_url, member_id),
            &token,
        )
        .await;
        let stats = &coverage["analysis"]["stats"];
        if stats["covered_days"].as_i64() == Some(31) {
            assert_eq!(stats["gap_days"].as_i64().unwrap() + 31, stats["total_active_days"].as_i64().unwrap());
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("coverage never reflected the settled invoice");
}

#[tokio::test]
async fn failed_outcome_flows_into_grace_period_and_retry_queue() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/members", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "member_number": "M-2", "full_name": "Fatima el Amrani" }))
        .send()
        .await
        .unwrap();
    let member_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(format!("{}/dues/schedules", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "member_id": member_id,
            "membership_type": "Standard",
            "billing_frequency": "monthly",
            "dues_rate": "12.50",
            "first_invoice_date": "2025-01-01",
        }))
        .send()
        .await
        .unwrap();
    let schedule_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(format!("{}/invoices", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "member_id": member_id,
            "schedule_id": schedule_id,
            "amount": "12.50",
            "due_date": "2025-01-31",
            "coverage_start": "2025-01-01",
            "coverage_end": "2025-01-31",
        }))
        .send()
        .await
        .unwrap();
    let invoice_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Wait for the invoice to land in the read model before batching it.
    get_eventually(
        &client,
        &format!("{}/invoices/{}", srv.base_url, invoice_id),
        &token,
    )
    .await;

    let res = client
        .post(format!("{}/batches", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "collection_date": "2025-02-03",
            "batch_type": "recurring",
            "entries": [{
                "invoice_id": invoice_id,
                "member_name": "Fatima el Amrani",
                "iban": "NL91ABNA0417164300",
                "bic": null,
                "mandate_reference": "VV-2025-0002",
                "mandate_sign_date": "2025-01-02",
                "sequence_type": "Frst",
            }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let batch_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    for step in ["validate", "generate", "submit"] {
        client
            .post(format!("{}/batches/{}/{}", srv.base_url, batch_id, step))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
    }

    // The bank refuses the debit.
    let res = client
        .post(format!("{}/batches/{}/outcomes", srv.base_url, batch_id))
        .bearer_auth(&token)
        .json(&json!({
            "outcomes": [{
                "invoice_id": invoice_id,
                "outcome": "failed",
                "reason_code": "AC04",
            }],
            "close": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // The batch closes failed and the invoice stays open.
    for _ in 0..100 {
        let batch = get_eventually(
            &client,
            &format!("{}/batches/{}", srv.base_url, batch_id),
            &token,
        )
        .await;
        if batch["status"].as_str().unwrap() == "failed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let invoice = get_eventually(
        &client,
        &format!("{}/invoices/{}", srv.base_url, invoice_id),
        &token,
    )
    .await;
    assert_eq!(invoice["status"].as_str().unwrap(), "open");
    assert_eq!(invoice["outstanding"].as_str().unwrap(), "12.50");
}

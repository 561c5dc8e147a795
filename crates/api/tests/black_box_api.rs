use chrono::{Duration as ChronoDuration, Utc};
use forgecrm_auth::{JwtClaims, Role};
use forgecrm_core::UserId;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = forgecrm_api::app::build_app(jwt_secret.to_string()).await;
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

fn mint_jwt(jwt_secret: &str, user_id: UserId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: user_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

const SECRET: &str = "test-secret";

#[tokio::test(flavor = "multi_thread")]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let token = mint_jwt(SECRET, UserId::new(), vec![Role::sales_rep()]);
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn lead_lifecycle_with_numbering_weighting_and_approval() {
    let srv = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let rep = UserId::new();
    let rep_token = mint_jwt(SECRET, rep, vec![Role::sales_rep()]);
    let manager_token = mint_jwt(SECRET, UserId::new(), vec![Role::manager()]);

    // Directory setup: company + contact.
    let res = client
        .post(format!("{}/companies", srv.base_url))
        .bearer_auth(&rep_token)
        .json(&json!({ "name": "Acme Textiles Ltd." }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let company_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(format!("{}/contacts", srv.base_url))
        .bearer_auth(&rep_token)
        .json(&json!({ "name": "Rahim Uddin", "phone": "01712345678" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let contact_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Open two leads: numbers are sequential within the month.
    let open = |value: i64, probability: u8| {
        json!({
            "title": "PLC system for textile mill",
            "contact_id": contact_id,
            "company_id": company_id,
            "estimated_value_minor": value,
            "probability": probability,
        })
    };

    let res = client
        .post(format!("{}/leads", srv.base_url))
        .bearer_auth(&rep_token)
        .json(&open(1_000_000, 40))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = res.json::<serde_json::Value>().await.unwrap();
    let lead_id = body["id"].as_str().unwrap().to_string();
    let number = body["number"].as_str().unwrap().to_string();
    let prefix = format!("LEAD-{}", Utc::now().format("%Y%m"));
    assert!(number.starts_with(&prefix), "{number}");
    assert!(number.ends_with("-0001"), "{number}");

    let res = client
        .post(format!("{}/leads", srv.base_url))
        .bearer_auth(&rep_token)
        .json(&open(500_000, 50))
        .send()
        .await
        .unwrap();
    let second = res.json::<serde_json::Value>().await.unwrap();
    assert!(second["number"].as_str().unwrap().ends_with("-0002"));

    // Weighted value is derived.
    let res = client
        .get(format!("{}/leads/{}", srv.base_url, lead_id))
        .bearer_auth(&rep_token)
        .send()
        .await
        .unwrap();
    let lead = res.json::<serde_json::Value>().await.unwrap();
    assert_eq!(lead["weighted_value_minor"], json!(400_000));
    assert_eq!(lead["owner"].as_str().unwrap(), rep.to_string());

    // Probability over 100 is rejected.
    let res = client
        .post(format!("{}/leads", srv.base_url))
        .bearer_auth(&rep_token)
        .json(&open(100, 101))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Moving into Negotiation requires approval; reps cannot approve.
    let res = client
        .post(format!("{}/leads/{}/stage", srv.base_url, lead_id))
        .bearer_auth(&rep_token)
        .json(&json!({ "stage": "Negotiation" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .post(format!("{}/leads/{}/approve", srv.base_url, lead_id))
        .bearer_auth(&rep_token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/leads/{}/approve", srv.base_url, lead_id))
        .bearer_auth(&manager_token)
        .json(&json!({ "notes": "within discount policy" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Approval is immutable: a second approval conflicts.
    let res = client
        .post(format!("{}/leads/{}/approve", srv.base_url, lead_id))
        .bearer_auth(&manager_token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Pipeline status groups the caller's visible leads per stage.
    let res = client
        .get(format!("{}/api/leads/pipeline-status", srv.base_url))
        .bearer_auth(&manager_token)
        .send()
        .await
        .unwrap();
    let status = res.json::<serde_json::Value>().await.unwrap();
    let pipeline = status["pipeline"].as_array().unwrap();
    assert_eq!(pipeline.len(), 2);
    assert_eq!(pipeline[0]["stage"], "New");
    assert_eq!(pipeline[1]["stage"], "Negotiation");
    assert_eq!(pipeline[1]["estimated_value_minor"], json!(1_000_000));
}

#[tokio::test(flavor = "multi_thread")]
async fn lead_visibility_is_scoped_to_involved_users() {
    let srv = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let rep_a = mint_jwt(SECRET, UserId::new(), vec![Role::sales_rep()]);
    let rep_b = mint_jwt(SECRET, UserId::new(), vec![Role::sales_rep()]);
    let manager = mint_jwt(SECRET, UserId::new(), vec![Role::manager()]);

    let res = client
        .post(format!("{}/contacts", srv.base_url))
        .bearer_auth(&rep_a)
        .json(&json!({ "name": "Contact", "email": "c@example.com" }))
        .send()
        .await
        .unwrap();
    let contact_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    client
        .post(format!("{}/leads", srv.base_url))
        .bearer_auth(&rep_a)
        .json(&json!({ "title": "A's deal", "contact_id": contact_id }))
        .send()
        .await
        .unwrap();

    let count = |token: String| {
        let client = client.clone();
        let url = format!("{}/leads", srv.base_url);
        async move {
            let res = client.get(url).bearer_auth(&token).send().await.unwrap();
            res.json::<serde_json::Value>().await.unwrap()["items"]
                .as_array()
                .unwrap()
                .len()
        }
    };

    assert_eq!(count(rep_a.clone()).await, 1);
    assert_eq!(count(rep_b.clone()).await, 0);
    assert_eq!(count(manager.clone()).await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn contact_duplicate_check_matches_normalized_phone() {
    let srv = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, UserId::new(), vec![Role::sales_rep()]);

    client
        .post(format!("{}/contacts", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "Rahim", "phone": "017-1234-5678" }))
        .send()
        .await
        .unwrap();

    // The stored phone is canonicalized, so the same number in another
    // spelling must be checked against the canonical form.
    let res = client
        .post(format!("{}/api/contacts/check-duplicate", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "phone": "+8801712345678" }))
        .send()
        .await
        .unwrap();
    let body = res.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["duplicates"].as_array().unwrap().len(), 1);

    let res = client
        .post(format!("{}/api/contacts/check-duplicate", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "phone": "+8801999999999" }))
        .send()
        .await
        .unwrap();
    let body = res.json::<serde_json::Value>().await.unwrap();
    assert!(body["duplicates"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn product_management_requires_permission_and_search_works() {
    let srv = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let rep = mint_jwt(SECRET, UserId::new(), vec![Role::sales_rep()]);
    let manager = mint_jwt(SECRET, UserId::new(), vec![Role::manager()]);

    let product = json!({
        "name": "Compact PLC",
        "brand": "Siemens",
        "details": { "model": "S7-1200", "category": "plc" },
        "stock_quantity": 3,
    });

    let res = client
        .post(format!("{}/products", srv.base_url))
        .bearer_auth(&rep)
        .json(&product)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/products", srv.base_url))
        .bearer_auth(&manager)
        .json(&product)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = res.json::<serde_json::Value>().await.unwrap();
    let sku = body["sku"].as_str().unwrap();
    assert!(sku.starts_with("SIE-S7-1200-"), "{sku}");

    let res = client
        .get(format!("{}/api/products/search?q=s7-12", srv.base_url))
        .bearer_auth(&rep)
        .send()
        .await
        .unwrap();
    let body = res.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn audit_trail_records_field_level_changes() {
    let srv = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let rep_id = UserId::new();
    let rep = mint_jwt(SECRET, rep_id, vec![Role::sales_rep()]);
    let manager = mint_jwt(SECRET, UserId::new(), vec![Role::manager()]);

    let res = client
        .post(format!("{}/companies", srv.base_url))
        .bearer_auth(&rep)
        .json(&json!({ "name": "Old Name" }))
        .send()
        .await
        .unwrap();
    let company_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    client
        .patch(format!("{}/companies/{}", srv.base_url, company_id))
        .bearer_auth(&rep)
        .json(&json!({ "name": "New Name" }))
        .send()
        .await
        .unwrap();

    // Audit queries are manager-territory.
    let res = client
        .get(format!(
            "{}/audit/directory.company/{}",
            srv.base_url, company_id
        ))
        .bearer_auth(&rep)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(format!(
            "{}/audit/directory.company/{}",
            srv.base_url, company_id
        ))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["change_type"], "created");
    assert_eq!(items[1]["change_type"], "updated");
    assert_eq!(items[1]["field_name"], "name");
    assert_eq!(items[1]["old_value"], "Old Name");
    assert_eq!(items[1]["new_value"], "New Name");
    assert_eq!(items[1]["changed_by"].as_str().unwrap(), rep_id.to_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_and_disallowed_uploads_are_rejected() {
    let srv = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, UserId::new(), vec![Role::sales_rep()]);

    let res = client
        .post(format!(
            "{}/documents?file_name=payload.exe",
            srv.base_url
        ))
        .bearer_auth(&token)
        .body("MZ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

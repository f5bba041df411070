use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use bioboxsys_api::app::{build_app, AppState};
use bioboxsys_auth::{
    memory::{InMemoryAuthService, InMemoryProfileStore},
    AuthService, Principal, ProfileRow, UnconfiguredAuthService,
};
use bioboxsys_core::UserId;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(state: AppState) -> Self {
        let app = build_app(state);
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

    fn users_url(&self) -> String {
        format!("{}/api/admin/users", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Backend {
    auth: Arc<InMemoryAuthService>,
    profiles: Arc<InMemoryProfileStore>,
    admin_token: String,
    seller_token: String,
}

fn profile(id: &str, role: &str) -> ProfileRow {
    ProfileRow {
        id: UserId::new(id),
        email: None,
        name: None,
        role: Some(role.to_string()),
        permissions: None,
        created_at: None,
        updated_at: None,
    }
}

fn backend() -> Backend {
    let auth = Arc::new(InMemoryAuthService::new());
    let profiles = Arc::new(InMemoryProfileStore::new());

    auth.add_account(Principal::new("admin-1", "admin@bioboxsys.com"), "pw");
    auth.add_account(Principal::new("seller-1", "carlos@bioboxsys.com"), "pw");
    profiles.insert(profile("admin-1", "admin"));
    profiles.insert(profile("seller-1", "seller"));

    let admin_token = auth.issue_token(&UserId::new("admin-1"));
    let seller_token = auth.issue_token(&UserId::new("seller-1"));
    Backend {
        auth,
        profiles,
        admin_token,
        seller_token,
    }
}

impl Backend {
    fn state(&self) -> AppState {
        AppState::new(self.auth.clone(), self.profiles.clone())
    }
}

fn new_user() -> serde_json::Value {
    json!({
        "email": "ana@bioboxsys.com",
        "password": "initial-pw",
        "name": "Ana Vendedora",
        "permissions": ["orders-full", "customers:read"],
    })
}

async fn error_code(res: reqwest::Response) -> String {
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    body["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn(backend().state()).await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_provisions_account_with_profile() {
    let backend = backend();
    let srv = TestServer::spawn(backend.state()).await;

    let res = reqwest::Client::new()
        .post(srv.users_url())
        .bearer_auth(&backend.admin_token)
        .json(&new_user())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["email"], "ana@bioboxsys.com");
    assert_eq!(body["name"], "Ana Vendedora");
    assert_eq!(body["role"], "seller");
    assert_eq!(body["permissions"], json!(["orders-full", "customers:read"]));

    let id = UserId::new(body["id"].as_str().unwrap());
    let row = backend.profiles.get(&id).expect("profile row stored");
    assert_eq!(row.role.as_deref(), Some("seller"));
    assert!(row.created_at.is_some() && row.updated_at.is_some());
}

#[tokio::test]
async fn explicit_role_is_kept() {
    let backend = backend();
    let srv = TestServer::spawn(backend.state()).await;

    let mut body = new_user();
    body["role"] = json!("operator");
    let res = reqwest::Client::new()
        .post(srv.users_url())
        .bearer_auth(&backend.admin_token)
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["role"], "operator");
}

#[tokio::test]
async fn token_is_required() {
    let backend = backend();
    let srv = TestServer::spawn(backend.state()).await;
    let client = reqwest::Client::new();

    let res = client.post(srv.users_url()).json(&new_user()).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "missing_token");

    let res = client
        .post(srv.users_url())
        .bearer_auth("not-a-token")
        .json(&new_user())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "invalid_token");
}

#[tokio::test]
async fn non_admin_is_forbidden() {
    let backend = backend();
    let srv = TestServer::spawn(backend.state()).await;

    let res = reqwest::Client::new()
        .post(srv.users_url())
        .bearer_auth(&backend.seller_token)
        .json(&new_user())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "forbidden");
    let err = backend
        .auth
        .sign_in_with_password("ana@bioboxsys.com", "initial-pw")
        .await
        .unwrap_err();
    assert!(!err.is_unavailable(), "no account was created");
}

#[tokio::test]
async fn missing_fields_are_rejected_after_authorization() {
    let backend = backend();
    let srv = TestServer::spawn(backend.state()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.users_url())
        .bearer_auth(&backend.admin_token)
        .json(&json!({"email": "ana@bioboxsys.com", "password": "pw"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "missing_fields");

    let res = client
        .post(srv.users_url())
        .bearer_auth(&backend.admin_token)
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "missing_fields");

    // Unauthenticated garbage is still an auth failure.
    let res = client.post(srv.users_url()).body("not json").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_account_reports_create_failure() {
    let backend = backend();
    let srv = TestServer::spawn(backend.state()).await;

    let mut body = new_user();
    body["email"] = json!("carlos@bioboxsys.com");
    let res = reqwest::Client::new()
        .post(srv.users_url())
        .bearer_auth(&backend.admin_token)
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "create_user_failed");
    assert!(body["details"].as_str().is_some_and(|d| d.contains("already been registered")));
}

#[tokio::test]
async fn unconfigured_backend_refuses_every_token() {
    let state = AppState::new(
        Arc::new(UnconfiguredAuthService::new()),
        Arc::new(InMemoryProfileStore::new()),
    );
    let srv = TestServer::spawn(state).await;

    let res = reqwest::Client::new()
        .post(srv.users_url())
        .bearer_auth("anything")
        .json(&new_user())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "invalid_token");
}

#[tokio::test]
async fn lowercase_bearer_scheme_is_accepted() {
    let backend = backend();
    let srv = TestServer::spawn(backend.state()).await;

    let res = reqwest::Client::new()
        .post(srv.users_url())
        .header("Authorization", format!("bearer {}", backend.admin_token))
        .json(&new_user())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn role_names_are_matched_case_insensitively() {
    let backend = backend();
    let srv = TestServer::spawn(backend.state()).await;
    let client = reqwest::Client::new();

    let mut body = new_user();
    body["role"] = json!("Admin");
    let res = client
        .post(srv.users_url())
        .bearer_auth(&backend.admin_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["role"], "admin");

    let mut body = new_user();
    body["email"] = json!("joao@bioboxsys.com");
    body["role"] = json!("manager");
    let res = client
        .post(srv.users_url())
        .bearer_auth(&backend.admin_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_role");
}

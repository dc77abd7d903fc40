//! End-to-end HTTP flow over a live listener: login, code exchange, session
//! lookup, validation, and logout, with a scripted identity provider.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use auth_gateway::{
    Error, Result,
    auth::AuthService,
    config::Config,
    gateway::{AppState, create_router},
    idp::{IdentityProvider, Jwk, JwksResponse, TokenData},
    store::InMemoryTtlStore,
};

const SIGNING_PEM: &[u8] = include_bytes!("fixtures/rsa_a.pem");
const SIGNING_JWK: &str = include_str!("fixtures/rsa_a.jwk.json");

/// Identity provider double: hands out a pre-programmed identity token and
/// serves a one-key JWKS.
struct ScriptedIdp {
    id_token: Mutex<Option<String>>,
}

impl ScriptedIdp {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            id_token: Mutex::new(None),
        })
    }

    fn issue_for_nonce(&self, nonce: &str) {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("key-a".to_string());
        let claims = json!({
            "name": "Mario",
            "familyName": "Rossi",
            "fiscalNumber": "RSSMRA80A01H501U",
            "nonce": nonce,
        });
        let token = encode(
            &header,
            &claims,
            &EncodingKey::from_rsa_pem(SIGNING_PEM).unwrap(),
        )
        .unwrap();
        *self.id_token.lock().unwrap() = Some(token);
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdp {
    async fn exchange_code(&self, _auth_code: &str, state: &str) -> Result<TokenData> {
        let token = self.id_token.lock().unwrap().clone();
        token.map(|id_token| TokenData { id_token }).ok_or_else(|| {
            Error::AuthFailed {
                state: state.to_string(),
                message: "error retrieving id token, http response code: [401]".to_string(),
            }
        })
    }

    async fn fetch_jwks(&self) -> Result<JwksResponse> {
        let jwk: Jwk = serde_json::from_str(SIGNING_JWK).unwrap();
        Ok(JwksResponse { keys: vec![jwk] })
    }
}

/// Boot the gateway on an ephemeral port and return its base URL.
async fn start_gateway(idp: Arc<ScriptedIdp>) -> String {
    let mut config = Config::default();
    config.idp.base_url = "https://idp.example.org".to_string();
    config.idp.redirect_uri = "https://rp.example.org/callback".to_string();
    config.idp.client_id = "client-id".to_string();
    config.idp.client_secret = "client-secret".to_string();

    let auth = Arc::new(AuthService::new(
        &config,
        Arc::new(InMemoryTtlStore::new()),
        idp,
    ));
    let app = create_router(Arc::new(AppState { auth }), Duration::from_secs(5));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn query_param(url: &str, name: &str) -> String {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| panic!("missing query parameter {name}"))
}

#[tokio::test]
async fn full_login_to_logout_flow() {
    let idp = ScriptedIdp::new();
    let base = start_gateway(Arc::clone(&idp)).await;
    let http = reqwest::Client::new();

    // Login: the redirect URL carries state and nonce
    let login: Value = http
        .get(format!("{base}/auth/login"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let redirect = login["urlRedirect"].as_str().unwrap();
    assert!(redirect.starts_with("https://idp.example.org/login?"));
    let state = query_param(redirect, "state");
    let nonce = query_param(redirect, "nonce");
    assert_eq!(query_param(redirect, "response_type"), "code");
    assert_eq!(query_param(redirect, "scope"), "openid");

    // Callback: exchange the code for a session token
    idp.issue_for_nonce(&nonce);
    let exchange = http
        .post(format!("{base}/auth/token"))
        .json(&json!({"authCode": "code-1", "state": state}))
        .send()
        .await
        .unwrap();
    assert_eq!(exchange.status(), 200);
    let auth_token = exchange.json::<Value>().await.unwrap()["authToken"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(!auth_token.is_empty());

    // The session resolves to the verified identity
    let user: Value = http
        .get(format!("{base}/auth/users"))
        .bearer_auth(&auth_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(user["name"], "Mario");
    assert_eq!(user["familyName"], "Rossi");
    assert_eq!(user["taxId"], "RSSMRA80A01H501U");

    // Validation passes while the session is live
    let validate = http
        .get(format!("{base}/auth/validate"))
        .bearer_auth(&auth_token)
        .send()
        .await
        .unwrap();
    assert_eq!(validate.status(), 200);

    // Logout revokes it; a repeat logout still succeeds
    for _ in 0..2 {
        let logout = http
            .post(format!("{base}/auth/logout"))
            .bearer_auth(&auth_token)
            .send()
            .await
            .unwrap();
        assert_eq!(logout.status(), 204);
    }

    let revoked = http
        .get(format!("{base}/auth/validate"))
        .bearer_auth(&auth_token)
        .send()
        .await
        .unwrap();
    assert_eq!(revoked.status(), 401);
}

#[tokio::test]
async fn replayed_auth_code_returns_the_same_token() {
    let idp = ScriptedIdp::new();
    let base = start_gateway(Arc::clone(&idp)).await;
    let http = reqwest::Client::new();

    let login: Value = http
        .get(format!("{base}/auth/login"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let redirect = login["urlRedirect"].as_str().unwrap();
    let state = query_param(redirect, "state");
    idp.issue_for_nonce(&query_param(redirect, "nonce"));

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let response: Value = http
            .post(format!("{base}/auth/token"))
            .json(&json!({"authCode": "code-1", "state": state}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        tokens.push(response["authToken"].as_str().unwrap().to_string());
    }

    assert_eq!(tokens[0], tokens[1]);
}

#[tokio::test]
async fn unknown_state_yields_problem_json_401() {
    let idp = ScriptedIdp::new();
    let base = start_gateway(idp).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{base}/auth/token"))
        .json(&json!({"authCode": "code-1", "state": "never-issued"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    let problem: Value = response.json().await.unwrap();
    assert_eq!(problem["status"], 401);
    assert_eq!(problem["title"], "Unauthorized");
    assert!(
        problem["detail"]
            .as_str()
            .unwrap()
            .contains("[never-issued]")
    );
}

#[tokio::test]
async fn session_endpoints_reject_missing_bearer() {
    let idp = ScriptedIdp::new();
    let base = start_gateway(idp).await;
    let http = reqwest::Client::new();

    for (method, path) in [
        (reqwest::Method::GET, "/auth/users"),
        (reqwest::Method::GET, "/auth/validate"),
        (reqwest::Method::POST, "/auth/logout"),
    ] {
        let response = http
            .request(method, format!("{base}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401, "{path} without a bearer token");
    }
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let idp = ScriptedIdp::new();
    let base = start_gateway(idp).await;

    let health: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["status"], "ok");
}

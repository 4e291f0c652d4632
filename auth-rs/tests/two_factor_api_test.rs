//! Integration tests for the login and 2FA REST endpoints

use auth_rs::api::{AppState, ApiServer};
use auth_rs::config::AuthConfig;
use auth_rs::store;
use auth_rs::token::{Token, TokenCodec};
use auth_rs::totp::TotpService;
use auth_rs::TwoFactorService;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

const WURSTBROT_SECRET: &str = "IFTXE3SPOEYVURT2MRYGI52TKJ4HC3KH";
const WURSTBROT_EMAIL: &str = "wurstbrot@juice-sh.op";
const WURSTBROT_PASSWORD: &str = "EinBelegtesBrotMitSchinkenSCHINKEN!";

struct TestServer {
    base_url: String,
    state: Arc<AppState>,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn codec(&self) -> Arc<TokenCodec> {
        self.state.service.codec().await
    }

    async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/Users/"))
            .json(&json!({
                "email": email,
                "password": password,
                "passwordRepeat": password,
            }))
            .send()
            .await
            .unwrap()
    }

    /// Log in, completing the second factor when the server asks for it
    async fn login(&self, email: &str, password: &str, totp_secret: Option<&str>) -> Value {
        let response = self
            .client
            .post(self.url("/rest/user/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "login failed for {}", email);

        let body: Value = response.json().await.unwrap();
        if body["status"] != "totp_token_required" {
            return body["authentication"].clone();
        }

        let secret = totp_secret.expect("server asked for a second factor");
        let response = self
            .client
            .post(self.url("/rest/2fa/verify"))
            .json(&json!({
                "tmpToken": body["data"]["tmpToken"],
                "totpToken": totp_code(secret),
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        body["authentication"].clone()
    }

    async fn get_status(&self, token: &str) -> reqwest::Response {
        self.client
            .get(self.url("/rest/2fa/status"))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn setup(&self, token: &str, password: &str, secret: &str) -> reqwest::Response {
        let setup_token = self
            .codec()
            .await
            .issue(&Token::TotpSetup {
                secret: secret.to_string(),
            })
            .unwrap();

        self.client
            .post(self.url("/rest/2fa/setup"))
            .bearer_auth(token)
            .json(&json!({
                "password": password,
                "setupToken": setup_token,
                "initialToken": totp_code(secret),
            }))
            .send()
            .await
            .unwrap()
    }
}

fn totp_code(secret: &str) -> String {
    TotpService::new().generate_current(secret).unwrap()
}

fn test_auth_config(secret: &str) -> AuthConfig {
    AuthConfig {
        jwt_secret: secret.to_string(),
        ..AuthConfig::default()
    }
}

/// Helper function to start the API server on an ephemeral port
async fn start_test_server() -> TestServer {
    let db = store::connect("sqlite::memory:").await.unwrap();
    let service = TwoFactorService::new(db, &test_auth_config("integration-secret")).unwrap();

    // Seed an account that already has 2FA enabled
    let user = service
        .users()
        .create(WURSTBROT_EMAIL, WURSTBROT_PASSWORD)
        .await
        .unwrap();
    service
        .two_factor_store()
        .set_secret(user.id, WURSTBROT_SECRET)
        .await
        .unwrap();

    let server = ApiServer::new(service, "127.0.0.1:0".to_string());
    let state = server.state();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.serve(listener, std::future::pending::<()>()).await;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        state,
        client: reqwest::Client::new(),
    }
}

async fn wurstbrot_id(server: &TestServer) -> i64 {
    server
        .state
        .service
        .users()
        .find_by_email(WURSTBROT_EMAIL)
        .await
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn test_verify_with_valid_tmp_token_and_totp() {
    let server = start_test_server().await;
    let user_id = wurstbrot_id(&server).await;

    let tmp_token = server
        .codec()
        .await
        .issue(&Token::SecondFactorPending { user_id })
        .unwrap();

    let response = server
        .client
        .post(server.url("/rest/2fa/verify"))
        .json(&json!({ "tmpToken": tmp_token, "totpToken": totp_code(WURSTBROT_SECRET) }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.contains("application/json"));

    let body: Value = response.json().await.unwrap();
    let authentication = &body["authentication"];
    assert!(authentication["token"].is_string());
    assert!(authentication["bid"].is_number());
    assert_eq!(authentication["umail"], WURSTBROT_EMAIL);
}

#[tokio::test]
async fn test_verify_with_invalid_totp() {
    let server = start_test_server().await;
    let user_id = wurstbrot_id(&server).await;

    let tmp_token = server
        .codec()
        .await
        .issue(&Token::SecondFactorPending { user_id })
        .unwrap();
    let totp_token = totp_code("INVALIDSECRET");
    if totp_token == totp_code(WURSTBROT_SECRET) {
        return;
    }

    let response = server
        .client
        .post(server.url("/rest/2fa/verify"))
        .json(&json!({ "tmpToken": tmp_token, "totpToken": totp_token }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_with_unsigned_tmp_token() {
    let server = start_test_server().await;
    let user_id = wurstbrot_id(&server).await;

    let foreign = TokenCodec::new(&test_auth_config("invalid_key")).unwrap();
    let tmp_token = foreign
        .issue(&Token::SecondFactorPending { user_id })
        .unwrap();

    let response = server
        .client
        .post(server.url("/rest/2fa/verify"))
        .json(&json!({ "tmpToken": tmp_token, "totpToken": totp_code(WURSTBROT_SECRET) }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_with_missing_fields() {
    let server = start_test_server().await;

    let response = server
        .client
        .post(server.url("/rest/2fa/verify"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_with_2fa_returns_tmp_token_only() {
    let server = start_test_server().await;

    let response = server
        .client
        .post(server.url("/rest/user/login"))
        .json(&json!({ "email": WURSTBROT_EMAIL, "password": WURSTBROT_PASSWORD }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "totp_token_required");
    assert!(body["data"]["tmpToken"].is_string());
    assert!(body.get("authentication").is_none());

    // The temporary token does not open protected routes
    let tmp_token = body["data"]["tmpToken"].as_str().unwrap();
    let response = server.get_status(tmp_token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_failures_are_indistinguishable() {
    let server = start_test_server().await;

    let wrong_password = server
        .client
        .post(server.url("/rest/user/login"))
        .json(&json!({ "email": WURSTBROT_EMAIL, "password": "nope" }))
        .send()
        .await
        .unwrap();
    let unknown_user = server
        .client
        .post(server.url("/rest/user/login"))
        .json(&json!({ "email": "ghost@juice-sh.op", "password": "nope" }))
        .send()
        .await
        .unwrap();
    let bad_token = server
        .client
        .post(server.url("/rest/2fa/verify"))
        .json(&json!({ "tmpToken": "garbage", "totpToken": "123456" }))
        .send()
        .await
        .unwrap();

    let mut bodies = Vec::new();
    for response in [wrong_password, unknown_user, bad_token] {
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(response.json::<Value>().await.unwrap());
    }
    assert!(bodies.iter().all(|b| *b == bodies[0]));
}

#[tokio::test]
async fn test_status_for_account_with_2fa() {
    let server = start_test_server().await;

    let auth = server
        .login(WURSTBROT_EMAIL, WURSTBROT_PASSWORD, Some(WURSTBROT_SECRET))
        .await;
    let response = server.get_status(auth["token"].as_str().unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["setup"], true);
    assert!(body.get("secret").is_none());
}

#[tokio::test]
async fn test_status_for_account_without_2fa() {
    let server = start_test_server().await;
    server.register("J12934@juice-sh.op", "0Y8rMnww$*9VFYE59-!Fg1L6t&6lB").await;

    let auth = server
        .login("J12934@juice-sh.op", "0Y8rMnww$*9VFYE59-!Fg1L6t&6lB", None)
        .await;
    let response = server.get_status(auth["token"].as_str().unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["setup"], false);
    assert_eq!(body["email"], "J12934@juice-sh.op");
}

#[tokio::test]
async fn test_status_when_not_authenticated() {
    let server = start_test_server().await;

    let response = server
        .client
        .get(server.url("/rest/2fa/status"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_setup_enables_2fa() {
    let server = start_test_server().await;
    let email = "fooooo1@bar.com";
    let password = "123456";
    let secret = "ASDVAJSDUASZGDIADBJS";

    let response = server.register(email, password).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let auth = server.login(email, password, None).await;
    let token = auth["token"].as_str().unwrap();

    let response = server.setup(token, password, secret).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = server.get_status(token).await.json().await.unwrap();
    assert_eq!(body["setup"], true);

    // Subsequent logins need the second factor
    let auth = server.login(email, password, Some(secret)).await;
    assert_eq!(auth["umail"], email);
}

#[tokio::test]
async fn test_setup_with_wrong_password() {
    let server = start_test_server().await;
    server.register("fooooo2@bar.com", "123456").await;

    let auth = server.login("fooooo2@bar.com", "123456", None).await;
    let token = auth["token"].as_str().unwrap();

    let response = server.setup(token, "654321", "ASDVAJSDUASZGDIADBJS").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = server.get_status(token).await.json().await.unwrap();
    assert_eq!(body["setup"], false);
}

#[tokio::test]
async fn test_setup_via_status_bootstrap() {
    let server = start_test_server().await;
    server.register("fooooo3@bar.com", "123456").await;

    let auth = server.login("fooooo3@bar.com", "123456", None).await;
    let token = auth["token"].as_str().unwrap();

    let status: Value = server.get_status(token).await.json().await.unwrap();
    let secret = status["secret"].as_str().unwrap();

    let response = server
        .client
        .post(server.url("/rest/2fa/setup"))
        .bearer_auth(token)
        .json(&json!({
            "password": "123456",
            "setupToken": status["setupToken"],
            "initialToken": totp_code(secret),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = server.get_status(token).await.json().await.unwrap();
    assert_eq!(body["setup"], true);
}

#[tokio::test]
async fn test_disable_2fa() {
    let server = start_test_server().await;
    let email = "fooooodisable1@bar.com";
    let password = "123456";
    let secret = "ASDVAJSDUASZGDIADBJS";

    server.register(email, password).await;
    let auth = server.login(email, password, None).await;
    let response = server.setup(auth["token"].as_str().unwrap(), password, secret).await;
    assert_eq!(response.status(), StatusCode::OK);

    let auth = server.login(email, password, Some(secret)).await;
    let token = auth["token"].as_str().unwrap();

    let body: Value = server.get_status(token).await.json().await.unwrap();
    assert_eq!(body["setup"], true);

    let response = server
        .client
        .post(server.url("/rest/2fa/disable"))
        .bearer_auth(token)
        .json(&json!({ "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = server.get_status(token).await.json().await.unwrap();
    assert_eq!(body["setup"], false);
}

#[tokio::test]
async fn test_disable_with_wrong_password() {
    let server = start_test_server().await;

    let auth = server
        .login(WURSTBROT_EMAIL, WURSTBROT_PASSWORD, Some(WURSTBROT_SECRET))
        .await;
    let token = auth["token"].as_str().unwrap();

    let response = server
        .client
        .post(server.url("/rest/2fa/disable"))
        .bearer_auth(token)
        .json(&json!({ "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = server.get_status(token).await.json().await.unwrap();
    assert_eq!(body["setup"], true);
}

#[tokio::test]
async fn test_register_validation() {
    let server = start_test_server().await;

    let response = server
        .client
        .post(server.url("/api/Users"))
        .json(&json!({
            "email": "mismatch@bar.com",
            "password": "123456",
            "passwordRepeat": "1234567",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server.register(WURSTBROT_EMAIL, "whatever").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

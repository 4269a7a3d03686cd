use accounts_server::media::UploadedMedia;
use accounts_server::{configure_routes, AppState, MediaUploader, MemoryCredentialStore, Settings};
use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::{test, web, App};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const BOUNDARY: &str = "----accounts-test-boundary";

struct StubUploader;

#[async_trait]
impl MediaUploader for StubUploader {
    async fn upload(&self, _local_path: &Path) -> accounts_server::Result<UploadedMedia> {
        Ok(UploadedMedia {
            url: "https://media.example/upload.png".to_string(),
        })
    }
}

fn test_state() -> (AppState, Arc<MemoryCredentialStore>) {
    let config = Settings::new_for_test().expect("Failed to load test config");
    let store = Arc::new(MemoryCredentialStore::new());
    let state = AppState::with_parts(config, store.clone(), Arc::new(StubUploader))
        .expect("Failed to build app state");
    (state, store)
}

fn register_body(username: &str, email: &str, password: &str) -> Vec<u8> {
    let mut body = String::new();
    for (name, value) in [
        ("username", username),
        ("email", email),
        ("fullName", "Ann Example"),
        ("password", password),
    ] {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\nContent-Type: text/plain\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"avatar.png\"\r\nContent-Type: image/png\r\n\r\nnot-really-a-png\r\n"
    ));
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body.into_bytes()
}

fn cookie_value<B>(resp: &ServiceResponse<B>, name: &str) -> Option<String> {
    resp.response()
        .cookies()
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

fn register_request(username: &str, email: &str, password: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/v1/users/register")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(register_body(username, email, password))
}

fn login_request(username: &str, password: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "username": username, "password": password }))
}

fn refresh_request(token: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .set_json(json!({ "refreshToken": token }))
}

fn account_id(registered: &Value) -> Uuid {
    registered["data"]["id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("registered account id")
}

macro_rules! register {
    ($app:expr, $username:expr) => {{
        let email = format!("{}@example.com", $username);
        let req = register_request($username, &email, "secret-pw").to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 201);
        let body: Value = test::read_body_json(resp).await;
        body
    }};
}

#[actix_web::test]
async fn test_register_hides_credentials() {
    let (state, _) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let body = register!(app, "Ann");
    assert_eq!(body["statusCode"], 201);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["username"], "ann");
    assert_eq!(body["data"]["avatar"], "https://media.example/upload.png");
    assert!(body["data"].get("password").is_none());
    assert!(body["data"].get("passwordHash").is_none());
    assert!(body["data"].get("refreshToken").is_none());
}

#[actix_web::test]
async fn test_register_duplicate_is_conflict() {
    let (state, _) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    register!(app, "ann");
    let req = register_request("ann", "other@example.com", "secret-pw").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
}

#[actix_web::test]
async fn test_login_sets_cookies_matching_body() {
    let (state, store) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let registered = register!(app, "ann");
    let id = account_id(&registered);

    let resp = test::call_service(&app, login_request("ann", "secret-pw").to_request()).await;
    assert_eq!(resp.status(), 200);
    let access_cookie = cookie_value(&resp, "accessToken").expect("access cookie");
    let refresh_cookie = cookie_value(&resp, "refreshToken").expect("refresh cookie");

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["accessToken"], access_cookie.as_str());
    assert_eq!(body["data"]["refreshToken"], refresh_cookie.as_str());
    assert_eq!(body["data"]["user"]["username"], "ann");
    assert_eq!(store.stored_refresh_token(id).await, Some(refresh_cookie));
}

#[actix_web::test]
async fn test_login_rejections() {
    let (state, _) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;
    register!(app, "ann");

    let resp = test::call_service(&app, login_request("ann", "wrong-pw").to_request()).await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Password is incorrect");

    let resp = test::call_service(&app, login_request("nobody", "secret-pw").to_request()).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "password": "secret-pw" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_refresh_token_is_single_use() {
    let (state, _) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;
    register!(app, "ann");

    let resp = test::call_service(&app, login_request("ann", "secret-pw").to_request()).await;
    let original = cookie_value(&resp, "refreshToken").unwrap();

    let resp = test::call_service(&app, refresh_request(&original).to_request()).await;
    assert_eq!(resp.status(), 200);
    let rotated = cookie_value(&resp, "refreshToken").unwrap();
    assert_ne!(rotated, original);

    let resp = test::call_service(&app, refresh_request(&original).to_request()).await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Invalid refresh token");

    // The rotated token is still good after the replay was rejected.
    let resp = test::call_service(&app, refresh_request(&rotated).to_request()).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_refresh_prefers_cookie() {
    let (state, _) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;
    register!(app, "ann");
    let resp = test::call_service(&app, login_request("ann", "secret-pw").to_request()).await;
    let token = cookie_value(&resp, "refreshToken").unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .cookie(Cookie::new("refreshToken", token))
        .set_json(json!({ "refreshToken": "garbage" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Unauthorized request");
}

#[actix_web::test]
async fn test_logout_revokes_refresh_token() {
    let (state, store) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;
    let registered = register!(app, "ann");
    let id = account_id(&registered);

    let resp = test::call_service(&app, login_request("ann", "secret-pw").to_request()).await;
    let access = cookie_value(&resp, "accessToken").unwrap();
    let refresh = cookie_value(&resp, "refreshToken").unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/users/logout")
        .cookie(Cookie::new("accessToken", access))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(cookie_value(&resp, "accessToken").as_deref(), Some(""));
    assert_eq!(store.stored_refresh_token(id).await, None);

    let resp = test::call_service(&app, refresh_request(&refresh).to_request()).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_logout_requires_authentication() {
    let (state, _) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post().uri("/api/v1/users/logout").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_same_refresh_token_sent_twice_has_one_winner() {
    let (state, store) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;
    let registered = register!(app, "ann");
    let id = account_id(&registered);
    let resp = test::call_service(&app, login_request("ann", "secret-pw").to_request()).await;
    let token = cookie_value(&resp, "refreshToken").unwrap();

    let (first, second) = futures::join!(
        test::call_service(&app, refresh_request(&token).to_request()),
        test::call_service(&app, refresh_request(&token).to_request()),
    );

    let statuses = [first.status().as_u16(), second.status().as_u16()];
    assert!(statuses.contains(&200));
    assert!(statuses.contains(&401));

    let winner = if first.status() == 200 { &first } else { &second };
    let winning_token = cookie_value(winner, "refreshToken");
    assert_eq!(store.stored_refresh_token(id).await, winning_token);
}

#[actix_web::test]
async fn test_change_password_with_wrong_old_password() {
    let (state, store) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;
    let registered = register!(app, "ann");
    let id = account_id(&registered);
    let before = store.stored_password_hash(id).await;

    let resp = test::call_service(&app, login_request("ann", "secret-pw").to_request()).await;
    let access = cookie_value(&resp, "accessToken").unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/users/change-password")
        .insert_header(("Authorization", format!("Bearer {access}")))
        .set_json(json!({ "oldPassword": "nope", "newPassword": "next-pw" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(store.stored_password_hash(id).await, before);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/change-password")
        .insert_header(("Authorization", format!("Bearer {access}")))
        .set_json(json!({ "oldPassword": "secret-pw", "newPassword": "next-pw" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    assert_eq!(test::call_service(&app, login_request("ann", "secret-pw").to_request()).await.status(), 401);
    assert_eq!(test::call_service(&app, login_request("ann", "next-pw").to_request()).await.status(), 200);
}

#[actix_web::test]
async fn test_current_user_accepts_cookie_or_bearer() {
    let (state, _) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;
    register!(app, "ann");
    let resp = test::call_service(&app, login_request("ann", "secret-pw").to_request()).await;
    let access = cookie_value(&resp, "accessToken").unwrap();
    let refresh = cookie_value(&resp, "refreshToken").unwrap();

    let req = test::TestRequest::get()
        .uri("/api/v1/users/current-user")
        .cookie(Cookie::new("accessToken", access.clone()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["username"], "ann");

    let req = test::TestRequest::get()
        .uri("/api/v1/users/current-user")
        .insert_header(("Authorization", format!("Bearer {access}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    // A refresh token is signed with a different secret.
    let req = test::TestRequest::get()
        .uri("/api/v1/users/current-user")
        .insert_header(("Authorization", format!("Bearer {refresh}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Invalid access token");
}

#[actix_web::test]
async fn test_update_account_details() {
    let (state, _) = test_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;
    register!(app, "ann");
    register!(app, "bob");
    let resp = test::call_service(&app, login_request("ann", "secret-pw").to_request()).await;
    let access = cookie_value(&resp, "accessToken").unwrap();

    let req = test::TestRequest::patch()
        .uri("/api/v1/users/update-account")
        .cookie(Cookie::new("accessToken", access.clone()))
        .set_json(json!({ "fullName": "Ann Updated", "email": "ann.new@example.com" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["fullName"], "Ann Updated");
    assert_eq!(body["data"]["email"], "ann.new@example.com");

    let req = test::TestRequest::patch()
        .uri("/api/v1/users/update-account")
        .cookie(Cookie::new("accessToken", access))
        .set_json(json!({ "fullName": "Ann", "email": "bob@example.com" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);
}

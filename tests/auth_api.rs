use actix_web::{http::StatusCode, test, App};
use authgate::{configure, AppState, Settings};
use serde_json::{json, Value};

async fn test_state() -> AppState {
    let config = Settings::new_for_test().expect("Failed to load test config");
    test_state_with(config).await
}

async fn test_state_with(config: Settings) -> AppState {
    AppState::new(config).await.expect("memory backend")
}

#[actix_web::test]
async fn test_register_and_login() {
    let state = test_state().await;
    let app = test::init_service(App::new().configure(configure(state.clone()))).await;

    let register_response = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "password123"
        }))
        .send_request(&app)
        .await;
    assert_eq!(register_response.status(), StatusCode::CREATED);
    let body = test::read_body(register_response).await;
    assert!(body.is_empty());

    let login_response = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({
            "identifier": "alice",
            "password": "password123"
        }))
        .send_request(&app)
        .await;
    assert_eq!(login_response.status(), StatusCode::OK);

    let login_body: Value = test::read_body_json(login_response).await;
    assert_eq!(login_body["expires_in_seconds"], 15 * 60);
    let access_token = login_body["access_token"].as_str().unwrap();
    assert!(login_body["refresh_token"].as_str().is_some());

    let me_response = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", access_token)))
        .send_request(&app)
        .await;
    assert_eq!(me_response.status(), StatusCode::OK);

    let me_body: Value = test::read_body_json(me_response).await;
    let user = state
        .auth_service
        .store()
        .find_by_identifier("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(me_body["user_id"], user.id.to_string());
}

#[actix_web::test]
async fn test_invalid_login_is_uniform() {
    let app = test::init_service(App::new().configure(configure(test_state().await))).await;

    test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "password123"
        }))
        .send_request(&app)
        .await;

    let wrong_password = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identifier": "alice", "password": "wrongpassword" }))
        .send_request(&app)
        .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password: Value = test::read_body_json(wrong_password).await;

    let unknown_user = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identifier": "nonexistent@example.com", "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    let unknown_user: Value = test::read_body_json(unknown_user).await;

    assert_eq!(wrong_password, unknown_user);
    assert_eq!(unknown_user["error"]["message"], "invalid credentials");
}

#[actix_web::test]
async fn test_duplicate_registration_does_not_name_field() {
    let app = test::init_service(App::new().configure(configure(test_state().await))).await;

    let first = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "password123"
        }))
        .send_request(&app)
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let same_email = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "username": "alice2",
            "email": "alice@example.com",
            "password": "password123"
        }))
        .send_request(&app)
        .await;
    assert_eq!(same_email.status(), StatusCode::CONFLICT);
    let same_email: Value = test::read_body_json(same_email).await;

    let same_username = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "username": "alice",
            "email": "other@example.com",
            "password": "password123"
        }))
        .send_request(&app)
        .await;
    assert_eq!(same_username.status(), StatusCode::CONFLICT);
    let same_username: Value = test::read_body_json(same_username).await;

    assert_eq!(same_email, same_username);
}

#[actix_web::test]
async fn test_email_cannot_be_claimed_as_username() {
    let app = test::init_service(App::new().configure(configure(test_state().await))).await;

    let alice = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "password123"
        }))
        .send_request(&app)
        .await;
    assert_eq!(alice.status(), StatusCode::CREATED);

    let squatter = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "username": "alice@example.com",
            "email": "m@evil.test",
            "password": "mallory-password"
        }))
        .send_request(&app)
        .await;
    assert_eq!(squatter.status(), StatusCode::BAD_REQUEST);

    let by_email = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identifier": "alice@example.com", "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(by_email.status(), StatusCode::OK);

    let hijack = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identifier": "alice@example.com", "password": "mallory-password" }))
        .send_request(&app)
        .await;
    assert_eq!(hijack.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_invalid_registration() {
    let app = test::init_service(App::new().configure(configure(test_state().await))).await;

    for body in [
        json!({ "username": "al", "email": "alice@example.com", "password": "password123" }),
        json!({ "username": "alice", "email": "not-an-email", "password": "password123" }),
        json!({ "username": "alice", "email": "alice@example.com", "password": "short" }),
        json!({ "username": "alice", "email": "alice@example.com" }),
    ] {
        let response = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(body)
            .send_request(&app)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[actix_web::test]
async fn test_protected_route_requires_valid_bearer() {
    let app = test::init_service(App::new().configure(configure(test_state().await))).await;

    let missing = test::TestRequest::get().uri("/auth/me").send_request(&app).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let missing: Value = test::read_body_json(missing).await;

    let garbage = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(("Authorization", "Bearer not.a.token"))
        .send_request(&app)
        .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    let garbage: Value = test::read_body_json(garbage).await;

    assert_eq!(missing, garbage);
    assert_eq!(garbage["error"]["message"], "unauthorized");
}

#[actix_web::test]
async fn test_global_rate_limit() {
    let mut config = Settings::new_for_test().unwrap();
    config.rate_limit.requests = 3;
    let app = test::init_service(App::new().configure(configure(test_state_with(config).await))).await;

    for _ in 0..3 {
        let response = test::TestRequest::get().uri("/health").send_request(&app).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = test::TestRequest::get().uri("/health").send_request(&app).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"]["message"], "too many requests");
}

#[actix_web::test]
async fn test_credential_endpoints_are_throttled_per_caller() {
    let mut config = Settings::new_for_test().unwrap();
    config.rate_limit.auth_requests = 2;
    let app = test::init_service(App::new().configure(configure(test_state_with(config).await))).await;

    let attempt = |ip: &'static str| {
        test::TestRequest::post()
            .uri("/auth/login")
            .peer_addr(ip.parse().unwrap())
            .set_json(json!({ "identifier": "alice", "password": "guess" }))
    };

    for _ in 0..2 {
        let response = attempt("198.51.100.1:40000").send_request(&app).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = attempt("198.51.100.1:40001").send_request(&app).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = attempt("198.51.100.2:40000").send_request(&app).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_rate_limit_can_be_disabled() {
    let mut config = Settings::new_for_test().unwrap();
    config.rate_limit.enabled = false;
    config.rate_limit.requests = 1;
    let app = test::init_service(App::new().configure(configure(test_state_with(config).await))).await;

    for _ in 0..3 {
        let response = test::TestRequest::get().uri("/health").send_request(&app).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

//! End-to-end tests driving the full router in-process.

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use rpg_vault::{create_router, store::StoreClient, AppState, Config};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: AppState,
    _blobs: TempDir,
}

fn create_test_app(extra: &[&str]) -> TestApp {
    let blobs = TempDir::new().unwrap();
    let blob_dir = blobs.path().to_str().unwrap().to_string();

    let mut args = vec![
        "rpg-vault",
        "--bcrypt-cost",
        "4",
        "--blob-dir",
        blob_dir.as_str(),
        "--limiter-enabled",
        "false",
    ];
    args.extend_from_slice(extra);
    let config = Config::parse_from(args);

    let state = AppState::with_store(config, StoreClient::in_memory().unwrap());
    TestApp {
        router: create_router(state.clone()),
        state,
        _blobs: blobs,
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

async fn register(app: &TestApp, email: &str, password: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(
        app,
        request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({"name": "Alice", "email": email, "password": password})),
        ),
    )
    .await;
    (status, body)
}

async fn login(app: &TestApp, email: &str, password: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(
        app,
        request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({"email": email, "password": password})),
        ),
    )
    .await;
    (status, body)
}

async fn signed_in(app: &TestApp, email: &str) -> String {
    let (status, _) = register(app, email, "pa55word!").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = login(app, email, "pa55word!").await;
    assert_eq!(status, StatusCode::CREATED);
    body["authentication_token"]["token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_healthcheck() {
    let app = create_test_app(&[]);
    let (status, headers, body) =
        send(&app, request(Method::GET, "/v1/healthcheck", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(headers
        .get_all(header::VARY)
        .iter()
        .any(|v| v == "Authorization"));
}

#[tokio::test]
async fn test_anonymous_request_needs_authentication_for_worlds() {
    let app = create_test_app(&[]);
    let (status, _, body) = send(&app, request(Method::GET, "/v1/worlds", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["error"],
        "you must be authenticated to access this resource"
    );
}

#[tokio::test]
async fn test_malformed_authorization_header_rejected() {
    let app = create_test_app(&[]);
    let req = Request::builder()
        .uri("/v1/healthcheck")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");

    let (status, _, _) = send(
        &app,
        request(Method::GET, "/v1/healthcheck", Some("too-short"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        request(
            Method::GET,
            "/v1/healthcheck",
            Some("AAAAAAAAAAAAAAAAAAAAAAAAAA"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registration_and_login_errors() {
    let app = create_test_app(&[]);
    signed_in(&app, "alice@example.com").await;

    let (status, body) = register(&app, "alice@example.com", "pa55word!").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["error"]["email"],
        "a user with this email address already exists"
    );

    let (status, body) = register(&app, "bob@example.com", "short").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["password"], "must be at least 8 bytes long");

    let (status, body) = login(&app, "alice@example.com", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid authentication credentials");

    let (status, _) = login(&app, "nobody@example.com", "pa55word!").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/v1/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_world_lifecycle_with_cascading_delete() {
    let app = create_test_app(&[]);
    let token = signed_in(&app, "alice@example.com").await;

    let cover = format!("data:image/png;base64,{}", STANDARD.encode(b"\x89PNG cover"));
    let (status, headers, body) = send(
        &app,
        request(
            Method::POST,
            "/v1/worlds",
            Some(token.as_str()),
            Some(json!({"name": "Eberron", "genres": ["fantasy", "noir"], "cover": cover})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let world_id = body["world"]["id"].as_str().unwrap().to_string();
    assert_eq!(
        headers[header::LOCATION].to_str().unwrap(),
        format!("/v1/worlds/{world_id}")
    );
    assert_eq!(body["world"]["userId"], "alice@example.com");
    let cover_url = body["world"]["coverImage"].as_str().unwrap();
    assert!(cover_url.ends_with(&format!("/blobs/{world_id}/world/cover.png")));

    let blob = app
        .router
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/blobs/{world_id}/world/cover.png"),
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(blob.status(), StatusCode::OK);
    let bytes = to_bytes(blob.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"\x89PNG cover");

    let (status, _, body) = send(
        &app,
        request(
            Method::PATCH,
            &format!("/v1/worlds/{world_id}"),
            Some(token.as_str()),
            Some(json!({"intro": "A world of magic and trains"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["world"]["name"], "Eberron");
    assert_eq!(body["world"]["intro"], "A world of magic and trains");

    let characters_uri = format!("/v1/worlds/{world_id}/characters");
    let mut character_ids = Vec::new();
    for name in ["Vax", "Keyleth", "Grog"] {
        let (status, _, body) = send(
            &app,
            request(
                Method::POST,
                &characters_uri,
                Some(token.as_str()),
                Some(json!({"name": name, "attributes": {"level": 5}})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["character"]["attributes"]["level"], 5);
        character_ids.push(body["character"]["id"].as_str().unwrap().to_string());
    }

    let (status, _, body) = send(
        &app,
        request(
            Method::PATCH,
            &format!("{characters_uri}/{}", character_ids[0]),
            Some(token.as_str()),
            Some(json!({"attributes": {"level": 6, "class": "rogue"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["character"]["attributes"]["class"], "rogue");
    assert_eq!(body["character"]["name"], "Vax");

    let (status, _, body) = send(&app, request(Method::GET, &characters_uri, Some(token.as_str()), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["characters"].as_array().unwrap().len(), 3);

    let (status, _, _) = send(
        &app,
        request(Method::DELETE, &format!("/v1/worlds/{world_id}"), Some(token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        &app,
        request(Method::GET, &format!("/v1/worlds/{world_id}"), Some(token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.state.services.characters.list(&world_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_worlds_are_private_to_their_owner() {
    let app = create_test_app(&[]);
    let alice = signed_in(&app, "alice@example.com").await;
    let bob = signed_in(&app, "bob@example.com").await;

    let (_, _, body) = send(
        &app,
        request(Method::POST, "/v1/worlds", Some(alice.as_str()), Some(json!({"name": "Eberron"}))),
    )
    .await;
    let world_id = body["world"]["id"].as_str().unwrap().to_string();

    let (status, _, _) = send(
        &app,
        request(Method::GET, &format!("/v1/worlds/{world_id}"), Some(bob.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(
        &app,
        request(
            Method::POST,
            &format!("/v1/worlds/{world_id}/characters"),
            Some(bob.as_str()),
            Some(json!({"name": "Intruder"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, _, body) = send(&app, request(Method::GET, "/v1/worlds", Some(bob.as_str()), None)).await;
    assert!(body["worlds"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let app = create_test_app(&["--default-permissions", ""]);
    let token = signed_in(&app, "alice@example.com").await;

    let (status, _, body) = send(&app, request(Method::GET, "/v1/worlds", Some(token.as_str()), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "your user account doesn't have the necessary permissions to access this resource"
    );
}

#[tokio::test]
async fn test_inactive_account_is_forbidden() {
    let app = create_test_app(&[]);
    let token = signed_in(&app, "alice@example.com").await;

    let users = &app.state.auth.users;
    let mut alice = users.get_by_email("alice@example.com").unwrap();
    alice.activated = false;
    users.update(&mut alice).unwrap();

    let (status, _, body) = send(&app, request(Method::GET, "/v1/worlds", Some(token.as_str()), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "your user account must be activated to access this resource"
    );
}

#[tokio::test]
async fn test_rate_limiter_rejects_after_burst() {
    let app = create_test_app(&[
        "--limiter-enabled",
        "true",
        "--limiter-rps",
        "0.01",
        "--limiter-burst",
        "4",
    ]);

    let from = |ip: &str| {
        Request::builder()
            .uri("/v1/healthcheck")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..4 {
        let (status, _, _) = send(&app, from("203.0.113.1")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, body) = send(&app, from("203.0.113.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({"error": "rate limit exceeded"}));

    let (status, _, _) = send(&app, from("203.0.113.2")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_rate_limiter_never_rejects() {
    let app = create_test_app(&["--limiter-rps", "0.01", "--limiter-burst", "1"]);

    for _ in 0..50 {
        let (status, _, _) = send(&app, request(Method::GET, "/v1/healthcheck", None, None)).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_cors_preflight_for_trusted_origin() {
    let app = create_test_app(&["--cors-trusted-origins", "https://vault.example"]);
    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/worlds")
        .header(header::ORIGIN, "https://vault.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, preflight).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://vault.example"
    );
    assert!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_lowercase()
        .contains("authorization"));
}

#[tokio::test]
async fn test_cors_preflight_from_untrusted_origin_is_forwarded() {
    let app = create_test_app(&["--cors-trusted-origins", "https://vault.example"]);
    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/worlds")
        .header(header::ORIGIN, "https://evil.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, preflight).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "the method is not supported for this resource");
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).is_none());
}

#[tokio::test]
async fn test_unknown_route_and_method_are_json() {
    let app = create_test_app(&[]);

    let (status, _, body) = send(&app, request(Method::GET, "/v1/nowhere", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "the requested resource could not be found");

    let (status, _, body) = send(&app, request(Method::PUT, "/v1/healthcheck", None, None)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        body["error"],
        "the method is not supported for this resource"
    );
}

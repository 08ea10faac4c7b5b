//! REST routes driven through the router with `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use hive_core::model::{Command, Notification};
use hive_frontend::server::build_router;
use hive_proto::messages::{
    CommandInsertResponse, CommandSearchResponse, CommandUpdateSubscribeResponse, CommandEvent,
    NotificationSearchResponse,
};
use hive_proto::{RequestBody, ResponseBody};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tower::ServiceExt;

use common::{ADMIN_TOKEN, CLIENT_TOKEN, FakeBackend, Frontend};

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

fn spawn_call(router: &Router, req: Request<Body>) -> JoinHandle<(StatusCode, Value)> {
    let router = router.clone();
    tokio::spawn(async move {
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    })
}

async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    spawn_call(router, req).await.unwrap()
}

async fn setup() -> (Router, FakeBackend, Frontend) {
    let backend = FakeBackend::start().await;
    let frontend = Frontend::start(&[&backend], 5).await;
    (build_router(frontend.state.clone()), backend, frontend)
}

fn stored_command(id: i64) -> Command {
    let mut c = Command::new("dev-1", Utc::now());
    c.id = Some(id);
    c.command = Some("reboot".into());
    c
}

#[tokio::test]
async fn health_reports_connected_shards() {
    let (router, _backend, _frontend) = setup().await;
    let (status, body) = call(&router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["busShards"], 1);
    assert_eq!(body["connectedShards"], 1);
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthorized() {
    let (router, _backend, _frontend) = setup().await;
    let (status, body) =
        call(&router, request(Method::GET, "/device/dev-1/command", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(
        &router,
        request(Method::GET, "/device/dev-1/command", Some("nope"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn insert_command_returns_created_record() {
    let (router, mut backend, _frontend) = setup().await;
    let task = spawn_call(
        &router,
        request(
            Method::POST,
            "/device/dev-1/command",
            Some(ADMIN_TOKEN),
            Some(json!({"command": "reboot", "lifetime": 60})),
        ),
    );

    let frame = backend.next_frame().await;
    let RequestBody::CommandInsertRequest(r) = frame.body else {
        panic!("expected command insert");
    };
    assert_eq!(r.command.lifetime, Some(60));
    let mut command = r.command;
    command.id = Some(12);
    backend.reply(
        frame.correlation_id,
        ResponseBody::CommandInsertResponse(CommandInsertResponse { command }),
    );

    let (status, body) = task.await.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], 12);
    assert_eq!(body["deviceGuid"], "dev-1");
}

#[tokio::test]
async fn invalid_json_body_is_bad_request() {
    let (router, mut backend, _frontend) = setup().await;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/device/dev-1/command")
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"command\": "))
        .unwrap();
    let (status, body) = call(&router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
    assert!(backend.frame_within(std::time::Duration::from_millis(100)).await.is_none());
}

#[tokio::test]
async fn unknown_command_is_not_found() {
    let (router, mut backend, _frontend) = setup().await;
    let task = spawn_call(
        &router,
        request(Method::GET, "/device/dev-1/command/5", Some(ADMIN_TOKEN), None),
    );
    let frame = backend.next_frame().await;
    backend.reply(
        frame.correlation_id,
        ResponseBody::CommandSearchResponse(CommandSearchResponse::default()),
    );
    let (status, body) = task.await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn device_scope_is_enforced() {
    let (router, _backend, _frontend) = setup().await;

    let (status, _) = call(
        &router,
        request(Method::GET, "/device/dev-2/command", Some(CLIENT_TOKEN), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &router,
        request(Method::GET, "/device/orphan/notification", Some(ADMIN_TOKEN), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn update_returns_no_content() {
    let (router, mut backend, _frontend) = setup().await;
    let task = spawn_call(
        &router,
        request(
            Method::PUT,
            "/device/dev-1/command/3",
            Some(ADMIN_TOKEN),
            Some(json!({"status": "done"})),
        ),
    );
    let search = backend.next_frame().await;
    backend.reply(
        search.correlation_id,
        ResponseBody::CommandSearchResponse(CommandSearchResponse {
            commands: vec![stored_command(3)],
        }),
    );
    let update = backend.next_frame().await;
    assert!(matches!(update.body, RequestBody::CommandUpdateRequest(_)));
    backend.reply(
        update.correlation_id,
        ResponseBody::CommandUpdateResponse(Default::default()),
    );
    let (status, _) = task.await.unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn poll_returns_the_next_update() {
    let (router, mut backend, frontend) = setup().await;
    let task = spawn_call(
        &router,
        request(
            Method::GET,
            "/device/dev-1/command/3/poll?waitTimeout=1",
            Some(ADMIN_TOKEN),
            None,
        ),
    );

    let frame = backend.next_frame().await;
    let RequestBody::CommandUpdateSubscribeRequest(r) = &frame.body else {
        panic!("expected update subscribe, got {:?}", frame.body);
    };
    assert_eq!(r.command_id, 3);
    backend.reply(
        frame.correlation_id,
        ResponseBody::CommandUpdateSubscribeResponse(CommandUpdateSubscribeResponse {
            subscription_id: r.subscription_id,
            command: Some(stored_command(3)),
        }),
    );
    let mut updated = stored_command(3);
    updated.status = Some("done".into());
    updated.is_updated = true;
    backend.reply(
        frame.correlation_id,
        ResponseBody::CommandEvent(CommandEvent { command: updated }),
    );

    let (status, body) = task.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "done");

    for _ in 0..100 {
        if frontend.state.subscriptions.len().await == 0 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("poll subscription was not released");
}

#[tokio::test]
async fn poll_without_update_is_no_content() {
    let (router, mut backend, _frontend) = setup().await;
    let task = spawn_call(
        &router,
        request(
            Method::GET,
            "/device/dev-1/command/3/poll?waitTimeout=30",
            Some(ADMIN_TOKEN),
            None,
        ),
    );
    let frame = backend.next_frame().await;
    let RequestBody::CommandUpdateSubscribeRequest(r) = &frame.body else {
        panic!("expected update subscribe");
    };
    backend.reply(
        frame.correlation_id,
        ResponseBody::CommandUpdateSubscribeResponse(CommandUpdateSubscribeResponse {
            subscription_id: r.subscription_id,
            command: Some(stored_command(3)),
        }),
    );
    // waitTimeout is capped by the one-second server maximum
    let (status, body) = task.await.unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn list_notifications_passes_filters() {
    let (router, mut backend, _frontend) = setup().await;
    let task = spawn_call(
        &router,
        request(
            Method::GET,
            "/device/dev-1/notification?names=temperature,humidity&take=5",
            Some(ADMIN_TOKEN),
            None,
        ),
    );
    let frame = backend.next_frame().await;
    let RequestBody::NotificationSearchRequest(r) = &frame.body else {
        panic!("expected notification search");
    };
    assert_eq!(r.take, Some(5));
    assert_eq!(r.names.as_ref().map(|n| n.len()), Some(2));
    backend.reply(
        frame.correlation_id,
        ResponseBody::NotificationSearchResponse(NotificationSearchResponse {
            notifications: vec![Notification {
                id: Some(1),
                device_guid: "dev-1".into(),
                notification: "temperature".into(),
                parameters: Some(json!({"celsius": 20})),
                timestamp: Utc::now(),
            }],
        }),
    );
    let (status, body) = task.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["parameters"]["celsius"], 20);
}

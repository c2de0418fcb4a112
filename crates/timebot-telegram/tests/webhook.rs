//! HTTP routes: Telegram webhook and account-link completion.

mod common;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use common::*;
use serde_json::json;
use timebot_persistence::DataStore;
use timebot_telegram::webhook::{LINK_SECRET_HEADER, TELEGRAM_SECRET_HEADER};
use timebot_telegram::{create_router, WebhookRoutes};

const HOOK: &str = "/telegram/webhook";
const HOOK_SECRET: &str = "hook-secret";
const API_SECRET: &str = "api-secret";

fn server(h: &Harness) -> TestServer {
    let app = create_router(
        Arc::clone(&h.dispatcher),
        WebhookRoutes {
            path: HOOK.to_string(),
            secret: Some(HOOK_SECRET.to_string()),
            link_secret: Some(API_SECRET.to_string()),
        },
    );
    TestServer::new(app).unwrap()
}

fn header(name: &'static str, value: &'static str) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static(name), HeaderValue::from_static(value))
}

fn message_update(update_id: u32, telegram_id: i64, text: &str) -> serde_json::Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": 5,
            "date": 1_792_000_000,
            "chat": { "id": telegram_id, "type": "private", "first_name": "Alice" },
            "from": { "id": telegram_id, "is_bot": false, "first_name": "Alice" },
            "text": text
        }
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = Harness::new().await;
    let server = server(&h);

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(!body["version"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_rejects_wrong_secret() {
    let h = Harness::new().await;
    let server = server(&h);

    let response = server
        .post(HOOK)
        .json(&message_update(1, ALICE_TG, "/add alpha 2"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let (name, _) = header(TELEGRAM_SECRET_HEADER, HOOK_SECRET);
    let response = server
        .post(HOOK)
        .add_header(name, HeaderValue::from_static("nope"))
        .json(&message_update(2, ALICE_TG, "/add alpha 2"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    assert_eq!(h.store.time_entry_count().await, 2);
    assert!(h.client.calls().is_empty());
}

#[tokio::test]
async fn test_webhook_dispatches_update() {
    let h = Harness::new().await;
    let server = server(&h);
    let (name, value) = header(TELEGRAM_SECRET_HEADER, HOOK_SECRET);

    let response = server
        .post(HOOK)
        .add_header(name, value)
        .json(&message_update(10, ALICE_TG, "/add alpha 2 webhook"))
        .await;
    response.assert_status_ok();

    assert_eq!(h.store.time_entry_count().await, 3);
    assert!(h.client.last_text().contains("Logged <b>2h</b>"));
}

#[tokio::test]
async fn test_webhook_acknowledges_redelivery_once() {
    let h = Harness::new().await;
    let server = server(&h);

    for _ in 0..2 {
        let (name, value) = header(TELEGRAM_SECRET_HEADER, HOOK_SECRET);
        server
            .post(HOOK)
            .add_header(name, value)
            .json(&message_update(11, ALICE_TG, "/add alpha 1"))
            .await
            .assert_status_ok();
    }
    assert_eq!(h.store.time_entry_count().await, 3);
}

#[tokio::test]
async fn test_webhook_acknowledges_garbage() {
    let h = Harness::new().await;
    let server = server(&h);
    let (name, value) = header(TELEGRAM_SECRET_HEADER, HOOK_SECRET);

    let response = server
        .post(HOOK)
        .add_header(name, value)
        .json(&json!({ "not": "an update" }))
        .await;
    response.assert_status_ok();
    assert!(h.client.calls().is_empty());
}

#[tokio::test]
async fn test_link_completion() {
    let h = Harness::new().await;
    let server = server(&h);
    let token = h.dispatcher.context().links.issue(STRANGER_TG, STRANGER_TG).unwrap();

    let (name, value) = header(LINK_SECRET_HEADER, API_SECRET);
    let response = server
        .post("/link")
        .add_header(name, value)
        .json(&json!({ "token": token, "user_id": BOB.get() }))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "linked");
    assert_eq!(body["telegram_id"], STRANGER_TG);

    let linked = h.store.find_user_by_telegram_id(STRANGER_TG).await.unwrap();
    assert_eq!(linked.map(|u| u.id), Some(BOB));
    assert!(h.client.last_text().contains("now linked"));

    // Tokens work once.
    let (name, value) = header(LINK_SECRET_HEADER, API_SECRET);
    let response = server
        .post("/link")
        .add_header(name, value)
        .json(&json!({ "token": token, "user_id": BOB.get() }))
        .await;
    response.assert_status(StatusCode::GONE);
}

#[tokio::test]
async fn test_link_rejections() {
    let h = Harness::new().await;
    let server = server(&h);

    let token = h.dispatcher.context().links.issue(STRANGER_TG, STRANGER_TG).unwrap();
    let response = server
        .post("/link")
        .json(&json!({ "token": token, "user_id": BOB.get() }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let (name, value) = header(LINK_SECRET_HEADER, API_SECRET);
    let response = server
        .post("/link")
        .add_header(name, value)
        .json(&json!({ "token": "garbage", "user_id": BOB.get() }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let (name, value) = header(LINK_SECRET_HEADER, API_SECRET);
    let response = server
        .post("/link")
        .add_header(name, value)
        .json(&json!({ "token": token, "user_id": 999 }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    assert!(h.store.find_user_by_telegram_id(STRANGER_TG).await.unwrap().is_none());
}

#[tokio::test]
async fn test_link_route_absent_without_secret() {
    let h = Harness::new().await;
    let app = create_router(Arc::clone(&h.dispatcher), WebhookRoutes::default());
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/link")
        .json(&json!({ "token": "x", "user_id": 1 }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

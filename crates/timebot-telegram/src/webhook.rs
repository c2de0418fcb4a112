//! HTTP transport: Telegram webhook and account-link completion.
//!
//! The update route answers `200 OK` for every request carrying the right
//! secret, including updates that fail to parse or fail while processing.
//! A non-2xx answer would make Telegram redeliver the update and repeat its
//! side effects.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use timebot_core::table::html_escape;
use timebot_models::UserId;
use timebot_persistence::PersistenceError;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::BotError;
use crate::link::{complete_link, LinkError};
use crate::update::Update;

/// Header Telegram sends with the secret given to `setWebhook`.
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Header the account service sends with link completions.
pub const LINK_SECRET_HEADER: &str = "x-timebot-link-secret";

#[derive(Clone)]
struct WebhookState {
    dispatcher: Arc<Dispatcher>,
    secret: Option<Arc<str>>,
    link_secret: Option<Arc<str>>,
}

/// Routes served by the webhook listener.
#[derive(Debug, Clone)]
pub struct WebhookRoutes {
    /// Path Telegram posts updates to.
    pub path: String,
    pub secret: Option<String>,
    /// Enables `POST /link` when set.
    pub link_secret: Option<String>,
}

impl Default for WebhookRoutes {
    fn default() -> Self {
        Self {
            path: "/telegram/webhook".to_string(),
            secret: None,
            link_secret: None,
        }
    }
}

/// Builds the webhook router.
pub fn create_router(dispatcher: Arc<Dispatcher>, routes: WebhookRoutes) -> Router {
    let state = WebhookState {
        dispatcher,
        secret: routes.secret.map(Arc::from),
        link_secret: routes.link_secret.map(Arc::from),
    };

    let mut router = Router::new()
        .route("/health", get(health))
        .route(&routes.path, post(receive_update));
    if state.link_secret.is_some() {
        router = router.route("/link", post(link_account));
    }

    router
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn header_matches(headers: &HeaderMap, name: &str, expected: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn receive_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = &state.secret {
        if !header_matches(&headers, TELEGRAM_SECRET_HEADER, secret) {
            warn!("Webhook request with missing or wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let tg: teloxide::types::Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Ignoring undecodable webhook payload");
            return StatusCode::OK;
        }
    };
    match Update::from_telegram(&tg) {
        Some(update) => {
            let outcome = state.dispatcher.dispatch(update).await;
            debug!(update_id = tg.id.0, ?outcome, "Webhook update handled");
        }
        None => debug!(update_id = tg.id.0, "Ignoring unsupported update kind"),
    }
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct LinkRequest {
    token: String,
    user_id: u64,
}

#[derive(Debug, Serialize)]
struct LinkResponse {
    status: &'static str,
    user_id: u64,
    telegram_id: i64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn link_account(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Json(request): Json<LinkRequest>,
) -> axum::response::Response {
    let Some(secret) = &state.link_secret else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !header_matches(&headers, LINK_SECRET_HEADER, secret) {
        return error_response(StatusCode::UNAUTHORIZED, "bad link secret");
    }

    let ctx = state.dispatcher.context();
    let result = complete_link(
        &ctx.links,
        ctx.store.as_ref(),
        &request.token,
        UserId::new(request.user_id),
    )
    .await;

    match result {
        Ok((user, claims)) => {
            info!(user_id = %user.id, chat_id = claims.chat_id, "Account link completed");
            let text = format!(
                "✅ Your Telegram account is now linked to <b>{}</b>. Send /help to get started.",
                html_escape(&user.name)
            );
            if let Err(e) = state
                .dispatcher
                .client()
                .send_message(claims.chat_id, &text, None)
                .await
            {
                warn!(chat_id = claims.chat_id, error = %e, "Failed to confirm account link");
            }
            (
                StatusCode::OK,
                Json(LinkResponse {
                    status: "linked",
                    user_id: user.id.get(),
                    telegram_id: claims.telegram_id,
                }),
            )
                .into_response()
        }
        Err(BotError::Link(e @ (LinkError::Malformed | LinkError::BadSignature))) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(BotError::Link(e @ (LinkError::Expired | LinkError::AlreadyUsed))) => {
            error_response(StatusCode::GONE, e.to_string())
        }
        Err(BotError::Store(PersistenceError::NotFound { kind, .. })) => {
            error_response(StatusCode::NOT_FOUND, format!("{kind} not found"))
        }
        Err(e) => {
            warn!(error = %e, "Account link failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "link failed")
        }
    }
}

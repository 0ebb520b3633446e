//! HTTP endpoint receiving the payment gateway's invoice callbacks.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use teloxide::types::ChatId;
use tracing::{debug, error, info, warn};

use super::{NotificationOutcome, PaymentAdapter};
use crate::errors::{StoreError, TransportError};

/// Header carrying the gateway's verification token
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// Pushes text to a chat outside of a conversation turn
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn notify(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;
}

pub struct WebhookState {
    pub payments: Arc<PaymentAdapter>,
    pub notifier: Option<Arc<dyn ChatNotifier>>,
    /// Expected `x-callback-token`; `None` accepts every call
    pub callback_token: Option<String>,
}

/// Invoice callback body. Only the fields used for reconciliation.
#[derive(Debug, Deserialize)]
pub struct InvoiceCallback {
    pub id: Option<String>,
    pub external_id: Option<String>,
    pub status: Option<String>,
}

impl InvoiceCallback {
    /// Callbacks without a status are treated as payment notifications
    fn is_paid(&self) -> bool {
        self.status
            .as_deref()
            .map_or(true, |status| matches!(status.to_uppercase().as_str(), "PAID" | "SETTLED"))
    }
}

#[derive(Debug)]
pub enum WebhookError {
    Unauthorized,
    Store(StoreError),
}

impl From<StoreError> for WebhookError {
    fn from(err: StoreError) -> Self {
        WebhookError::Store(err)
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "invalid callback token").into_response()
            }
            WebhookError::Store(err) => {
                error!(error = %err, "Failed to process payment notification");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage error").into_response()
            }
        }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook/xendit", post(xendit_callback))
        .route("/healthz", get(healthz))
        .with_state(Arc::new(state))
}

async fn healthz() -> &'static str {
    "ok"
}

// POST /webhook/xendit
async fn xendit_callback(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    Json(callback): Json<InvoiceCallback>,
) -> Result<impl IntoResponse, WebhookError> {
    if let Some(expected) = state.callback_token.as_deref() {
        let provided = headers
            .get(CALLBACK_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !constant_time_eq(expected, provided) {
            warn!("Payment webhook token verification failed");
            return Err(WebhookError::Unauthorized);
        }
    }

    if !callback.is_paid() {
        debug!(status = ?callback.status, id = ?callback.id, "Ignoring non-paid invoice callback");
        return Ok((StatusCode::OK, "ok"));
    }

    let now = Utc::now();
    let mut outcome = NotificationOutcome::Unknown;
    for reference in [callback.id.as_deref(), callback.external_id.as_deref()]
        .into_iter()
        .flatten()
    {
        outcome = state.payments.on_payment_notification(reference, now).await?;
        if outcome != NotificationOutcome::Unknown {
            break;
        }
    }

    if let NotificationOutcome::Confirmed {
        chat_id,
        message,
        ready_groups,
        ..
    } = outcome
    {
        for group in &ready_groups {
            info!(product_id = group.product_id, paid = group.paid_count, "Group order can be processed");
        }
        if let Some(notifier) = state.notifier.clone() {
            tokio::spawn(async move {
                if let Err(err) = notifier.notify(chat_id, &message).await {
                    warn!(chat_id = %chat_id, error = %err, "Failed to deliver payment confirmation");
                }
            });
        }
    }

    Ok((StatusCode::OK, "ok"))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

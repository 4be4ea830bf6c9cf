//! GitHub webhook ingress.
//!
//! Gate order is load-bearing: the signature is verified over the raw bytes
//! before anything is parsed, the event and ref filters run before a trigger
//! is emitted, and the trigger never blocks the response.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::server::{error, AppState};

type HmacSha256 = Hmac<Sha256>;

/// GitHub push event payload, reduced to the fields the filter needs.
#[derive(Debug, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub pusher: Pusher,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pusher {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PushCommit {
    pub id: String,
    #[serde(default)]
    pub message: String,
}

pub async fn handle_github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.record_webhook_received();

    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !verify_signature(state.webhook_secret.as_bytes(), &body, signature) {
        warn!("webhook signature verification failed");
        return error::unauthorized("invalid webhook signature");
    }

    let event = headers
        .get("X-GitHub-Event")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let delivery_id = headers
        .get("X-GitHub-Delivery")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    info!(event, delivery_id, "webhook received");

    if event != "push" {
        debug!(event, "ignoring non-push event");
        state.metrics.record_webhook_ignored();
        return ignored("not a push event");
    }

    let push: PushEvent = match serde_json::from_slice(&body) {
        Ok(push) => push,
        Err(err) => {
            warn!(error = %err, "failed to parse push event");
            return error::bad_request("invalid push payload");
        }
    };

    let expected_ref = format!("refs/heads/{}", state.branch);
    if push.git_ref != expected_ref {
        debug!(git_ref = %push.git_ref, expected = %expected_ref, "ignoring push to different branch");
        state.metrics.record_webhook_ignored();
        return ignored("different branch");
    }

    info!(
        git_ref = %push.git_ref,
        before = %push.before,
        after = %push.after,
        commit_count = push.commits.len(),
        pusher = %push.pusher.name,
        "push event for tracked branch"
    );

    state.trigger.trigger();
    (StatusCode::OK, Json(json!({"status": "accepted"}))).into_response()
}

fn ignored(reason: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({"status": "ignored", "reason": reason})),
    )
        .into_response()
}

/// Verify `sha256=<hex>` as the HMAC-SHA256 of `body` under `secret`.
/// The comparison is constant-time.
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

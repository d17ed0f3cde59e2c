// Relaymux Admin HTTP handlers — relay CRUD, the crypto smoke-test
// endpoint, and config get/set. Grounded in the original source's
// `views_api.py` contract; persistence goes through `crate::store`,
// live status through `crate::manager`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto;
use crate::session::RelayStatus;
use crate::store::{Config, Relay};

use super::{AdminPrincipal, AppState};

#[derive(Debug, Serialize)]
pub struct RelayView {
    #[serde(flatten)]
    pub relay: Relay,
    pub connected: bool,
    pub ping_ms: i64,
    pub status: RelayStatus,
}

fn relay_view(state: &AppState, relay: Relay) -> RelayView {
    match state.manager.session(&relay.url) {
        Some(session) => {
            let status = session.status();
            RelayView { relay, connected: session.is_connected(), ping_ms: status.ping_ms(), status }
        }
        None => RelayView { relay, connected: false, ping_ms: 0, status: RelayStatus::default() },
    }
}

pub async fn list_relays(
    _admin: AdminPrincipal,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RelayView>>, (StatusCode, String)> {
    let relays = state.store.load_relays().map_err(internal_error)?;
    Ok(Json(relays.into_iter().map(|r| relay_view(&state, r)).collect()))
}

#[derive(Debug, Deserialize)]
pub struct RelayUrlBody {
    pub url: String,
}

pub async fn add_relay(
    _admin: AdminPrincipal,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RelayUrlBody>,
) -> Result<Json<Vec<RelayView>>, (StatusCode, String)> {
    if body.url.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "url must not be empty".into()));
    }

    let created = state.store.create_relay(&body.url).map_err(internal_error)?;
    match created {
        Some(_) => {
            state.manager.add_relay(body.url.clone());
        }
        None => return Err((StatusCode::BAD_REQUEST, "relay url already registered".into())),
    }

    let relays = state.store.load_relays().map_err(internal_error)?;
    Ok(Json(relays.into_iter().map(|r| relay_view(&state, r)).collect()))
}

pub async fn remove_relay(
    _admin: AdminPrincipal,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RelayUrlBody>,
) -> Result<StatusCode, (StatusCode, String)> {
    let deleted = state.store.delete_relay(&body.url).map_err(internal_error)?;
    if deleted {
        state.manager.remove_relay(&body.url);
        Ok(StatusCode::OK)
    } else {
        Err((StatusCode::NOT_FOUND, "relay url not registered".into()))
    }
}

#[derive(Debug, Deserialize)]
pub struct TestMessage {
    /// Hex-encoded secp256k1 secret key. A fresh one is generated when
    /// omitted, mirroring the admin page's "just show me it works" mode.
    #[serde(default)]
    pub sender_private_key: Option<String>,
    pub reciever_public_key: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TestMessageResponse {
    pub private_key: String,
    pub public_key: String,
    pub event_json: Value,
}

/// Builds a throwaway NIP-04 DM to `reciever_public_key`, signed by
/// `sender_private_key` (or a freshly generated one), proving the crypto
/// stack is wired correctly end to end without touching any relay.
pub async fn test_relay_crypto(
    _admin: AdminPrincipal,
    Json(body): Json<TestMessage>,
) -> Result<Json<TestMessageResponse>, (StatusCode, String)> {
    let secret_key = match &body.sender_private_key {
        Some(hex_key) => {
            hex::decode(hex_key).map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid secret key: {e}")))?
        }
        None => crypto::generate_secret_key(),
    };
    let pubkey_bytes = hex::decode(&body.reciever_public_key)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid receiver pubkey: {e}")))?;
    if pubkey_bytes.len() != 32 {
        return Err((StatusCode::BAD_REQUEST, "receiver pubkey must be 32 bytes hex-encoded".into()));
    }

    let own_pubkey = crypto::derive_pubkey(&secret_key)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid secret key: {e}")))?;
    let own_pubkey_hex = hex::encode(&own_pubkey);
    let secret_key_hex = hex::encode(&secret_key);

    let created_at = chrono::Utc::now().timestamp();
    let event = crypto::build_dm_event(
        &secret_key,
        &own_pubkey_hex,
        &body.reciever_public_key,
        &body.message,
        created_at,
    )
    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    Ok(Json(TestMessageResponse { private_key: secret_key_hex, public_key: own_pubkey_hex, event_json: event }))
}

pub async fn get_config(
    _admin: AdminPrincipal,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Config>, (StatusCode, String)> {
    Ok(Json(state.store.load_config().map_err(internal_error)?))
}

pub async fn set_config(
    _admin: AdminPrincipal,
    State(state): State<Arc<AppState>>,
    Json(config): Json<Config>,
) -> Result<Json<Config>, (StatusCode, String)> {
    Ok(Json(state.store.save_config(config).map_err(internal_error)?))
}

fn internal_error<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

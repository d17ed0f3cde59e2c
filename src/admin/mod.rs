// Relaymux Admin Surface — axum router serving the relay/config control
// API plus the inbound client websocket. Every `/api/v1/*` route requires
// a bearer token compared in constant time; the real authn/authz filter
// is explicitly out of scope (spec §1) and assumed to sit in front of
// this service in production.

pub mod http;
pub mod ws;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::intake::Intake;
use crate::manager::RelayManager;
use crate::pool::MessagePool;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub manager: Arc<RelayManager>,
    pub pool: Arc<MessagePool>,
    pub intake: Arc<Intake>,
    pub admin_token: String,
    pub private_ws_key: Option<Vec<u8>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/relays", get(http::list_relays))
        .route("/api/v1/relay", put(http::add_relay).post(http::add_relay).delete(http::remove_relay))
        .route("/api/v1/relay/test", put(http::test_relay_crypto))
        .route("/api/v1/config", get(http::get_config).put(http::set_config))
        .route("/api/v1/:ws_id", get(ws::handle_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Extracted once per admin request; its mere presence in a handler's
/// signature is the authorization check.
pub struct AdminPrincipal;

#[async_trait]
impl<S> FromRequestParts<S> for AdminPrincipal
where
    Arc<AppState>: axum::extract::FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or((StatusCode::UNAUTHORIZED, "expected a Bearer token"))?;

        if constant_time_eq(token.as_bytes(), app_state.admin_token.as_bytes()) {
            Ok(AdminPrincipal)
        } else {
            Err((StatusCode::UNAUTHORIZED, "invalid admin token"))
        }
    }
}

/// Manual constant-time byte comparison: unequal lengths short-circuit
/// (length itself isn't secret), equal lengths always touch every byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_standard_equality() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secre7"));
        assert!(!constant_time_eq(b"secret", b"secretx"));
    }
}

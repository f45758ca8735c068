use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Axum middleware that requires a valid `Authorization: Bearer <token>` header.
///
/// Returns 401 for missing, malformed, or incorrect tokens. Applied only to
/// the operator-facing `/nodes` and `/drivers` routes — the agent-facing
/// `/lookup` and `/heartbeat` endpoints carry their own authentication
/// (unauthenticated by design, and per-node-UUID respectively; spec.md §4.6)
/// and are mounted outside this layer.
pub async fn require_bearer_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == state.auth_token.as_str() => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, "Unauthorized\n").into_response(),
    }
}

use axum::{
    Extension,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use notecast_auth::Principal;
use notecast_types::models::Role;

use crate::AppState;
use crate::error::ApiError;

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Run the auth gate on the bearer token and attach the `Principal`.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let principal = state.gate.authenticate(bearer_token(req.headers())).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Admin-only routes. Layer inside `require_auth`.
pub async fn require_admin(
    Extension(principal): Extension<Principal>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    principal.require_role(&[Role::Admin])?;
    Ok(next.run(req).await)
}

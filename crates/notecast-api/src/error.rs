//! Handler errors and their JSON rendering.
//!
//! Client errors render `{"status": "fail", "message": ...}`. Anything else
//! is logged and rendered as a generic `{"status": "error"}` body. In
//! development mode [`expose_details`] adds a `detail` field with the full
//! error chain.

use axum::{
    Json,
    extract::{
        Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use notecast_auth::AuthError;
use notecast_types::api::{MessageResponse, Status};

use crate::AppState;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Auth(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Carried on every error response so the development middleware can
/// re-render it with the detail attached.
#[derive(Debug, Clone)]
struct ErrorReport {
    status: Status,
    message: String,
    detail: String,
}

#[derive(Serialize)]
struct DetailedErrorBody {
    status: Status,
    message: String,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let detail = self.to_string();

        let (status, message) = if code.is_server_error() {
            error!("Request failed: {}", detail);
            (Status::Error, "Something went wrong".to_string())
        } else {
            (Status::Fail, detail.clone())
        };

        let mut response = (
            code,
            Json(MessageResponse {
                status,
                message: message.clone(),
            }),
        )
            .into_response();
        response.extensions_mut().insert(ErrorReport {
            status,
            message,
            detail,
        });
        response
    }
}

/// In development mode, attach the raw error chain to error bodies.
pub async fn expose_details(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    if !state.config.mode.is_development() {
        return response;
    }

    match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (
            response.status(),
            Json(DetailedErrorBody {
                status: report.status,
                message: report.message,
                detail: report.detail,
            }),
        )
            .into_response(),
        None => response,
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::BadRequest(format!("Multipart error: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn client_errors_render_as_fail() {
        let response = ApiError::bad_request("Invalid OTP").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["status"], "fail");
        assert_eq!(json["message"], "Invalid OTP");
    }

    #[tokio::test]
    async fn auth_rejections_keep_their_status() {
        let response = ApiError::from(AuthError::SessionRevoked).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Your session has expired, please login again");

        let response = ApiError::from(AuthError::EmailNotConfirmed).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn internal_errors_hide_detail() {
        let response = ApiError::from(anyhow::anyhow!("disk full")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Something went wrong");
        assert!(json.get("detail").is_none());
    }
}

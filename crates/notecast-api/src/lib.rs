//! HTTP surface of notecast: REST handlers, auth middleware, media serving
//! and the WebSocket upgrade.

pub mod auth;
pub mod config;
pub mod digest;
pub mod error;
pub mod mailer;
pub mod media;
pub mod middleware;
pub mod notes;
pub mod users;
pub mod validation;
pub mod ws;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::Uri,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use notecast_auth::otp::OtpKey;
use notecast_auth::{AuthGate, JwtKeys, TokenLedger};
use notecast_db::Database;
use notecast_gateway::{NotificationDispatcher, SessionRegistry};
use notecast_types::api::MessageResponse;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::media::MediaStore;

/// Profile pictures are capped at 5 MB; leave room for multipart framing.
const PICTURE_BODY_LIMIT: usize = 6 * 1024 * 1024;
/// Five attachments of up to 30 MB each, plus the text fields.
const NOTE_BODY_LIMIT: usize = 152 * 1024 * 1024;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub config: ApiConfig,
    pub ledger: TokenLedger,
    pub gate: AuthGate,
    pub otp: OtpKey,
    pub registry: SessionRegistry,
    pub dispatcher: NotificationDispatcher,
    pub mailer: Arc<dyn Mailer>,
    pub media: Arc<dyn MediaStore>,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        config: ApiConfig,
        mailer: Arc<dyn Mailer>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        let keys = Arc::new(JwtKeys::new(&config.jwt_secret, config.token_ttl));
        let ledger = TokenLedger::new(db.clone(), keys.clone());
        let gate = AuthGate::new(db.clone(), keys, ledger.clone());
        let registry = SessionRegistry::new();
        let dispatcher = NotificationDispatcher::new(registry.clone());
        let otp = OtpKey::new(&config.jwt_secret);

        Self {
            db,
            config,
            ledger,
            gate,
            otp,
            registry,
            dispatcher,
            mailer,
            media,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let auth_layer = from_fn_with_state(state.clone(), middleware::require_auth);

    let public_routes = Router::new()
        .route("/api/v1/auth/signup", post(auth::signup))
        .route("/api/v1/auth/confirmEmail", post(auth::confirm_email))
        .route("/api/v1/auth/resendOtp", post(auth::resend_otp))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/forgotPassword", post(auth::forgot_password))
        .route("/api/v1/auth/resetPassword", patch(auth::reset_password))
        .route("/media/{key}", get(media::serve_media))
        .route("/ws", get(ws::gateway_upgrade))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/updatePassword", patch(auth::update_password))
        .route("/api/v1/users/me", get(users::get_me))
        .route("/api/v1/users/profile", patch(users::update_profile))
        .route(
            "/api/v1/users/profile/picture",
            patch(users::update_profile_picture)
                .delete(users::delete_profile_picture)
                .layer(DefaultBodyLimit::max(PICTURE_BODY_LIMIT)),
        )
        .route(
            "/api/v1/notes",
            post(notes::send_note)
                .get(notes::get_notes)
                .delete(notes::delete_notes)
                .layer(DefaultBodyLimit::max(NOTE_BODY_LIMIT)),
        )
        .route_layer(auth_layer.clone());

    let admin_routes = Router::new()
        .route("/api/v1/admin/digest", post(digest::trigger_digest))
        .route_layer(from_fn(middleware::require_admin))
        .route_layer(auth_layer);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), error::expose_details))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<MessageResponse> {
    Json(MessageResponse::success("ok"))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Can't find {} on this server", uri.path()))
}

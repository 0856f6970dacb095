//! Account lifecycle: signup with emailed OTP, login, logout and the two
//! password-change flows. Every flow that hands out a token goes through
//! the token ledger.

use axum::{Extension, Json, extract::State};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use notecast_auth::Principal;
use notecast_auth::password::{hash_password_blocking, verify_password_blocking};
use notecast_db::models::UserRow;
use notecast_db::now_ms;
use notecast_types::api::{
    ConfirmEmailRequest, EmailRequest, LoginRequest, MessageResponse, ResetPasswordRequest, SignupRequest, Status,
    TokenResponse, UpdatePasswordRequest,
};

use crate::error::{ApiError, ApiResult};
use crate::mailer::{self, confirm_email_mail, reset_password_mail};
use crate::validation::{ValidJson, normalize_email, require_same, validate_otp, validate_password, validate_text};
use crate::{AppState, AppStateInner};

const OTP_SENT: &str = "Your email confirmation OTP has been sent to your email";

#[derive(Clone, Copy)]
enum OtpPurpose {
    ConfirmEmail,
    ResetPassword,
}

pub(crate) fn user_uuid(user: &UserRow) -> ApiResult<Uuid> {
    Uuid::parse_str(&user.id).map_err(|e| ApiError::Internal(anyhow::anyhow!("bad user id {}: {}", user.id, e)))
}

/// A concurrent signup that won the race on the same email is the caller's
/// problem; anything else is ours.
fn signup_failure(email: &str, err: anyhow::Error) -> ApiError {
    if notecast_db::is_unique_violation(&err) {
        warn!("Signup for {} lost a race on the same account: {:#}", email, err);
        ApiError::bad_request("Couldn't signup, please try again")
    } else {
        ApiError::Internal(err)
    }
}

async fn find_user_by_email(state: &AppStateInner, email: &str) -> ApiResult<Option<UserRow>> {
    let email = email.to_string();
    Ok(state.db.blocking(move |db| db.get_user_by_email(&email)).await?)
}

/// Store a fresh OTP for the user and mail it. The OTP must be persisted;
/// the mail is best-effort.
async fn send_otp(state: &AppStateInner, user: &UserRow, purpose: OtpPurpose) -> ApiResult<()> {
    let otp = state.otp.issue(Utc::now());

    let id = user.id.clone();
    let hash = otp.hash.clone();
    let expires_at = otp.expires_at.timestamp_millis();
    state.db.blocking(move |db| db.set_otp(&id, &hash, expires_at)).await?;

    let mail = match purpose {
        OtpPurpose::ConfirmEmail => confirm_email_mail(&user.email, &otp.code),
        OtpPurpose::ResetPassword => reset_password_mail(&user.email, &otp.code),
    };
    mailer::deliver(state.mailer.as_ref(), mail).await;
    Ok(())
}

fn check_otp(state: &AppStateInner, user: &UserRow, otp: &str) -> ApiResult<()> {
    let matches = user
        .otp_hash
        .as_deref()
        .is_some_and(|stored| state.otp.verify(otp, stored));
    if !matches {
        return Err(ApiError::bad_request("Invalid OTP"));
    }
    if user.otp_expires_at.unwrap_or(0) < now_ms() {
        return Err(ApiError::bad_request(
            "Your OTP has expired, Please click resend to resend a new OTP to your Email",
        ));
    }
    Ok(())
}

fn otp_still_live(user: &UserRow) -> bool {
    user.otp_expires_at.is_some_and(|exp| exp > now_ms())
}

/// Store the new password, revoke every session and issue a fresh token.
///
/// The change is stamped before the revoke: a token issued concurrently is
/// either older than the stamp (stale) or recorded before the revoke
/// (blacklisted).
async fn rotate_password(state: &AppStateInner, user_id: Uuid, new_password: String) -> ApiResult<String> {
    let hash = hash_password_blocking(new_password).await?;

    let changed_at = now_ms();
    state
        .db
        .blocking(move |db| db.update_password(&user_id.to_string(), &hash, changed_at))
        .await?;

    state.ledger.revoke_all_for_user(user_id).await?;

    info!("Password changed for user {}", user_id);
    Ok(state.ledger.issue(user_id).await?)
}

/// POST /api/v1/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<SignupRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let name = validate_text("name", &req.name)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;
    require_same(&req.password, &req.password_confirm, "password and passwordConfirm must be the same")?;

    if let Some(existing) = find_user_by_email(&state, &email).await? {
        if existing.email_confirmed {
            return Err(ApiError::bad_request("This email already exists"));
        }
        if otp_still_live(&existing) {
            return Err(ApiError::bad_request(
                "Use the OTP that was sent to your Email to verify your Email",
            ));
        }
        send_otp(&state, &existing, OtpPurpose::ConfirmEmail).await?;
        return Ok(Json(MessageResponse::success(OTP_SENT)));
    }

    let password_hash = hash_password_blocking(req.password).await?;
    let id = Uuid::new_v4().to_string();

    let user = {
        let (id, name, email) = (id.clone(), name.clone(), email.clone());
        state
            .db
            .blocking(move |db| {
                db.create_user(&id, &name, &email, &password_hash, now_ms())?;
                db.get_user_by_id(&id)
            })
            .await
    };
    let user = match user {
        Ok(Some(user)) => user,
        Ok(None) => return Err(ApiError::Internal(anyhow::anyhow!("user {} vanished after insert", id))),
        Err(e) => return Err(signup_failure(&email, e)),
    };

    info!("New user {} ({})", user.id, user.email);
    send_otp(&state, &user, OtpPurpose::ConfirmEmail).await?;
    Ok(Json(MessageResponse::success(OTP_SENT)))
}

/// POST /api/v1/auth/confirmEmail
pub async fn confirm_email(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ConfirmEmailRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = normalize_email(&req.email)?;
    validate_otp(&req.otp)?;

    let user = find_user_by_email(&state, &email)
        .await?
        .ok_or_else(|| ApiError::not_found("This Email doesn't exist, Please Signup first"))?;
    check_otp(&state, &user, &req.otp)?;

    let user_id = user_uuid(&user)?;
    let id = user.id.clone();
    state.db.blocking(move |db| db.confirm_email(&id)).await?;

    let token = state.ledger.issue(user_id).await?;
    Ok(Json(TokenResponse {
        status: Status::Success,
        message: Some("Your email has been successfully confirmed".into()),
        token,
    }))
}

/// POST /api/v1/auth/resendOtp
pub async fn resend_otp(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = normalize_email(&req.email)?;
    let user = find_user_by_email(&state, &email)
        .await?
        .ok_or_else(|| ApiError::not_found("This user doesn't exist"))?;

    if user.email_confirmed {
        return Err(ApiError::bad_request("This email is already confirmed"));
    }
    if otp_still_live(&user) {
        return Err(ApiError::bad_request("Your OTP hasn't expired yet"));
    }

    send_otp(&state, &user, OtpPurpose::ConfirmEmail).await?;
    Ok(Json(MessageResponse::success(OTP_SENT)))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = normalize_email(&req.email)?;
    let incorrect = || ApiError::Unauthorized("Incorrect email or password".into());

    let user = find_user_by_email(&state, &email).await?.ok_or_else(incorrect)?;
    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        return Err(incorrect());
    }
    if !user.email_confirmed {
        return Err(ApiError::Forbidden("Please confirm your email first".into()));
    }

    let token = state.ledger.issue(user_uuid(&user)?).await?;
    Ok(Json(TokenResponse {
        status: Status::Success,
        message: None,
        token,
    }))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<MessageResponse>> {
    state.ledger.revoke_all_for_user(principal.user_id).await?;
    Ok(Json(MessageResponse::success("logged out successfully")))
}

/// POST /api/v1/auth/forgotPassword
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = normalize_email(&req.email)?;
    let user = find_user_by_email(&state, &email)
        .await?
        .filter(|u| u.email_confirmed)
        .ok_or_else(|| ApiError::not_found("There is no user with this email"))?;

    send_otp(&state, &user, OtpPurpose::ResetPassword).await?;
    Ok(Json(MessageResponse::success("Your reset OTP has been sent to your email")))
}

/// PATCH /api/v1/auth/resetPassword
pub async fn reset_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ResetPasswordRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = normalize_email(&req.email)?;
    validate_otp(&req.otp)?;
    validate_password(&req.password)?;
    require_same(&req.password, &req.password_confirm, "password and passwordConfirm must be the same")?;

    let user = find_user_by_email(&state, &email)
        .await?
        .filter(|u| u.email_confirmed)
        .ok_or_else(|| ApiError::not_found("There is no user with this email"))?;
    check_otp(&state, &user, &req.otp)?;

    let token = rotate_password(&state, user_uuid(&user)?, req.password).await?;
    Ok(Json(TokenResponse {
        status: Status::Success,
        message: Some("Your password has been reset successfully".into()),
        token,
    }))
}

/// PATCH /api/v1/auth/updatePassword
pub async fn update_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ValidJson(req): ValidJson<UpdatePasswordRequest>,
) -> ApiResult<Json<TokenResponse>> {
    validate_password(&req.new_password)?;
    require_same(
        &req.new_password,
        &req.new_password_confirm,
        "newPassword and newPasswordConfirm must be the same",
    )?;

    let user_id = principal.user_id;
    let user = state
        .db
        .blocking(move |db| db.get_user_by_id(&user_id.to_string()))
        .await?
        .ok_or(notecast_auth::AuthError::UserGone)?;

    if !verify_password_blocking(req.current_password, user.password_hash).await? {
        return Err(ApiError::bad_request("Your current password isn't correct"));
    }

    let token = rotate_password(&state, user_id, req.new_password).await?;
    Ok(Json(TokenResponse {
        status: Status::Success,
        message: Some("Your Password has been updated successfully".into()),
        token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notecast_db::Database;

    #[test]
    fn duplicate_signup_is_a_bad_request() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "Ada", "ada@example.com", "hash", 1_000).unwrap();
        let err = db
            .create_user("u2", "Ada", "ada@example.com", "hash", 2_000)
            .unwrap_err();

        match signup_failure("ada@example.com", err) {
            ApiError::BadRequest(message) => assert_eq!(message, "Couldn't signup, please try again"),
            other => panic!("expected a bad request, got {:?}", other),
        }
    }

    #[test]
    fn storage_failure_is_internal() {
        let err = anyhow::anyhow!("DB lock poisoned");
        assert!(matches!(signup_failure("ada@example.com", err), ApiError::Internal(_)));
    }
}

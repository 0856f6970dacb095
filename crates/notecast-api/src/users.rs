use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
};
use tracing::info;

use notecast_auth::Principal;
use notecast_types::api::{Data, ProfileResponse, Status, UpdateProfileRequest, UserProfile};
use notecast_types::models::mime;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::media::read_field_capped;
use crate::validation::{ValidJson, validate_text};

const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

fn profile(principal: &Principal) -> UserProfile {
    UserProfile {
        id: principal.user_id,
        email: principal.email.clone(),
        name: principal.name.clone(),
        profile_picture: principal.profile_picture.clone(),
        notifications: principal.notifications,
    }
}

fn respond(data: UserProfile) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        status: Status::Success,
        data: Data { data },
    })
}

/// GET /api/v1/users/me
pub async fn get_me(Extension(principal): Extension<Principal>) -> Json<ProfileResponse> {
    respond(profile(&principal))
}

/// PATCH /api/v1/users/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let name = req.name.as_deref().map(|n| validate_text("name", n)).transpose()?;
    let notifications = req.notifications;

    let user_id = principal.user_id;
    {
        let name = name.clone();
        state
            .db
            .blocking(move |db| db.update_profile(&user_id.to_string(), name.as_deref(), notifications))
            .await?;
    }

    let mut updated = profile(&principal);
    if let Some(name) = name {
        updated.name = name;
    }
    if let Some(notifications) = notifications {
        updated.notifications = notifications;
    }
    Ok(respond(updated))
}

/// PATCH /api/v1/users/profile/picture, multipart field `image`.
pub async fn update_profile_picture(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ProfileResponse>> {
    let mut multipart = multipart?;
    let mut image = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field
            .content_type()
            .and_then(|ct| mime::IMAGES.iter().copied().find(|allowed| *allowed == ct))
            .ok_or_else(|| ApiError::bad_request("Profile picture must be a png or jpeg image"))?;
        let data = read_field_capped(field, MAX_PICTURE_BYTES, "Profile picture must be at most 5 MB").await?;
        image = Some((data, content_type));
    }

    let (data, content_type) = image.ok_or_else(|| ApiError::bad_request("image is required"))?;
    let url = state.media.upload(data, content_type).await?;

    let user_id = principal.user_id;
    {
        let url = url.clone();
        state
            .db
            .blocking(move |db| db.set_profile_picture(&user_id.to_string(), Some(&url)))
            .await?;
    }
    info!("User {} set a new profile picture", user_id);

    let mut updated = profile(&principal);
    updated.profile_picture = Some(url);
    Ok(respond(updated))
}

/// DELETE /api/v1/users/profile/picture
pub async fn delete_profile_picture(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<StatusCode> {
    let user_id = principal.user_id;
    state
        .db
        .blocking(move |db| db.set_profile_picture(&user_id.to_string(), None))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Sending, reading and deleting notes.
//!
//! A note sent to N receivers becomes N rows, each owned by its receiver.
//! Live receivers are told about their row once the insert has committed.

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Multipart, Query, State, multipart::MultipartRejection, rejection::QueryRejection},
    http::StatusCode,
};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use notecast_auth::Principal;
use notecast_db::models::{NewNotes, NoteRow};
use notecast_db::now_ms;
use notecast_gateway::NoteNotice;
use notecast_types::api::{Data, DeleteNotesRequest, NoteResponse, NotesResponse, SendNoteResponse, Status};
use notecast_types::models::mime;

use crate::error::{ApiError, ApiResult};
use crate::media::read_field_capped;
use crate::validation::{ValidJson, validate_text};
use crate::{AppState, AppStateInner};

/// Receivers only see notes from the last 30 days.
pub const VISIBILITY_DAYS: i64 = 30;

pub const MAX_MEDIA_FILES: usize = 5;
const MAX_MEDIA_BYTES: usize = 30 * 1024 * 1024;
const MAX_PAGE_SIZE: u32 = 100;

/// Start of the visibility window, in unix ms.
pub fn visible_since() -> i64 {
    (Utc::now() - Duration::days(VISIBILITY_DAYS)).timestamp_millis()
}

/// A validated note, ready to fan out.
#[derive(Debug)]
pub struct NoteDraft {
    pub receivers: Vec<Uuid>,
    pub type_id: i64,
    pub title: String,
    pub message: String,
    pub media: Vec<(Bytes, &'static str)>,
}

/// Store one row per receiver, then push `newNoteReceived` to the ones
/// that are connected. Returns the new note ids, in receiver order.
pub async fn create_notes(state: &AppStateInner, sender: Uuid, draft: NoteDraft) -> ApiResult<Vec<Uuid>> {
    let type_id = draft.type_id;
    let note_type = state.db.blocking(move |db| db.get_note_type(type_id)).await?;
    if !note_type.is_some_and(|t| !t.disabled) {
        return Err(ApiError::bad_request("Unknown note type"));
    }

    let receiver_ids: Vec<String> = draft.receivers.iter().map(Uuid::to_string).collect();
    let wanted = receiver_ids.len();
    let found = {
        let ids = receiver_ids.clone();
        state.db.blocking(move |db| db.count_existing_users(&ids)).await?
    };
    if found != wanted {
        return Err(ApiError::bad_request("Some receivers don't exist"));
    }

    let mut media_urls = Vec::with_capacity(draft.media.len());
    for (data, content_type) in draft.media {
        media_urls.push(state.media.upload(data, content_type).await?);
    }

    let note_ids: Vec<Uuid> = draft.receivers.iter().map(|_| Uuid::new_v4()).collect();
    let rows: Vec<(String, String)> = note_ids
        .iter()
        .map(Uuid::to_string)
        .zip(receiver_ids)
        .collect();

    let sender_id = sender.to_string();
    let (title, message) = (draft.title.clone(), draft.message);
    state
        .db
        .blocking(move |db| {
            db.insert_notes(&NewNotes {
                sender_id: &sender_id,
                receivers: &rows,
                type_id,
                title: &title,
                message: &message,
                media_urls: &media_urls,
                created_at: now_ms(),
            })
        })
        .await?;

    let notices: Vec<NoteNotice> = note_ids
        .iter()
        .zip(&draft.receivers)
        .map(|(note_id, receiver_id)| NoteNotice {
            note_id: *note_id,
            receiver_id: *receiver_id,
            title: draft.title.clone(),
        })
        .collect();
    let pushed = state.dispatcher.notify_note_created(&notices);

    info!(
        "User {} sent note to {} receiver(s), {} notified live",
        sender,
        notices.len(),
        pushed
    );
    Ok(note_ids)
}

fn parse_receivers(raw: &str) -> ApiResult<Vec<Uuid>> {
    let ids: Vec<Uuid> = serde_json::from_str(raw)
        .map_err(|_| ApiError::bad_request("receiverUserIds must be a JSON array of user ids"))?;
    if ids.is_empty() {
        return Err(ApiError::bad_request("receiverUserIds must not be empty"));
    }

    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    Ok(unique)
}

/// POST /api/v1/notes, multipart.
pub async fn send_note(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<SendNoteResponse>> {
    let mut multipart = multipart?;

    let mut receivers = None;
    let mut type_id = None;
    let mut title = None;
    let mut message = None;
    let mut media = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "receiverUserIds" => receivers = Some(parse_receivers(&field.text().await?)?),
            "typeId" => {
                let raw = field.text().await?;
                type_id = Some(
                    raw.trim()
                        .parse::<i64>()
                        .map_err(|_| ApiError::bad_request("typeId must be an integer"))?,
                );
            }
            "title" => title = Some(validate_text("title", &field.text().await?)?),
            "message" => message = Some(validate_text("message", &field.text().await?)?),
            "media" => {
                if media.len() == MAX_MEDIA_FILES {
                    return Err(ApiError::bad_request("At most 5 media files are allowed"));
                }
                let content_type = field
                    .content_type()
                    .and_then(|ct| mime::NOTE_MEDIA.iter().copied().find(|allowed| *allowed == ct))
                    .ok_or_else(|| ApiError::bad_request("Media must be png, jpeg or pdf"))?;
                let data = read_field_capped(field, MAX_MEDIA_BYTES, "Each media file must be at most 30 MB").await?;
                media.push((data, content_type));
            }
            other => debug!("Ignoring multipart field {}", other),
        }
    }

    let draft = NoteDraft {
        receivers: receivers.ok_or_else(|| ApiError::bad_request("receiverUserIds is required"))?,
        type_id: type_id.ok_or_else(|| ApiError::bad_request("typeId is required"))?,
        title: title.ok_or_else(|| ApiError::bad_request("title is required"))?,
        message: message.ok_or_else(|| ApiError::bad_request("message is required"))?,
        media,
    };

    let note_ids = create_notes(&state, principal.user_id, draft).await?;
    Ok(Json(SendNoteResponse {
        status: Status::Success,
        message: "Notes were sent successfully".into(),
        note_ids,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineQuery {
    /// Space separated type ids, e.g. `types=1 3`.
    pub types: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

fn parse_types(raw: Option<&str>) -> ApiResult<Vec<i64>> {
    raw.unwrap_or_default()
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<i64>()
                .map_err(|_| ApiError::bad_request("types must be a list of note type ids"))
        })
        .collect()
}

fn parse_uuid(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ApiError::Internal(anyhow::anyhow!("bad id {} in notes table: {}", raw, e)))
}

fn to_response(row: NoteRow, media: Vec<String>) -> ApiResult<NoteResponse> {
    let created_at = DateTime::<Utc>::from_timestamp_millis(row.created_at)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("bad timestamp on note {}", row.id)))?;

    Ok(NoteResponse {
        id: parse_uuid(&row.id)?,
        sender_id: parse_uuid(&row.sender_id)?,
        receiver_id: parse_uuid(&row.receiver_id)?,
        type_id: row.type_id,
        type_name: row.type_name,
        title: row.title,
        message: row.message,
        active: row.active,
        created_at,
        media,
    })
}

/// GET /api/v1/notes?types=1 2&page=1&pageSize=5
pub async fn get_notes(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<TimelineQuery>, QueryRejection>,
) -> ApiResult<Json<NotesResponse>> {
    let Query(query) = query?;
    let types = parse_types(query.types.as_deref())?;
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(5);
    if page == 0 {
        return Err(ApiError::bad_request("page must be at least 1"));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ApiError::bad_request("pageSize must be between 1 and 100"));
    }
    let offset = (page - 1).saturating_mul(page_size);

    let receiver = principal.user_id.to_string();
    let since = visible_since();
    let (rows, media) = state
        .db
        .blocking(move |db| {
            let rows = db.get_timeline(&receiver, &types, since, page_size, offset)?;
            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let media = db.get_media_for_notes(&ids)?;
            Ok((rows, media))
        })
        .await?;

    if rows.is_empty() {
        return Err(ApiError::not_found("No notes were found"));
    }

    let mut media_by_note: HashMap<String, Vec<String>> = HashMap::new();
    for m in media {
        media_by_note.entry(m.note_id).or_default().push(m.media_url);
    }

    let notes = rows
        .into_iter()
        .map(|row| {
            let media = media_by_note.remove(&row.id).unwrap_or_default();
            to_response(row, media)
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(NotesResponse {
        status: Status::Success,
        length: notes.len(),
        page,
        page_size,
        data: Data { data: notes },
    }))
}

/// DELETE /api/v1/notes with `{"notes": [ids]}`. Soft delete, receiver's rows only.
pub async fn delete_notes(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ValidJson(req): ValidJson<DeleteNotesRequest>,
) -> ApiResult<StatusCode> {
    if req.notes.is_empty() {
        return Err(ApiError::bad_request("notes must not be empty"));
    }

    let receiver = principal.user_id.to_string();
    let ids: Vec<String> = req.notes.iter().map(Uuid::to_string).collect();
    let deleted = state
        .db
        .blocking(move |db| db.deactivate_notes(&receiver, &ids))
        .await?;

    if deleted == 0 {
        return Err(ApiError::not_found("There were no notes to be deleted"));
    }
    Ok(StatusCode::NO_CONTENT)
}

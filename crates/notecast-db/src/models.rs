/// Database row types, mapped directly from SQLite rows.
/// Distinct from notecast-types API models to keep the DB layer independent.
/// Every `*_at` field is unix milliseconds.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub email_confirmed: bool,
    pub notifications: bool,
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<i64>,
    pub password_changed_at: Option<i64>,
    pub role: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct TokenRow {
    pub id: i64,
    pub user_id: String,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct NoteTypeRow {
    pub id: i64,
    pub name: String,
    pub disabled: bool,
}

#[derive(Debug, Clone)]
pub struct NoteRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub type_id: i64,
    pub type_name: String,
    pub title: String,
    pub message: String,
    pub active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct MediaRow {
    pub note_id: String,
    pub media_url: String,
}

/// One logical send: fanned out to a row per receiver.
#[derive(Debug, Clone)]
pub struct NewNotes<'a> {
    pub sender_id: &'a str,
    pub receivers: &'a [(String, String)],
    pub type_id: i64,
    pub title: &'a str,
    pub message: &'a str,
    pub media_urls: &'a [String],
    pub created_at: i64,
}

/// A user who opted into the daily digest.
#[derive(Debug, Clone)]
pub struct DigestRecipient {
    pub id: String,
    pub email: String,
    pub name: String,
}

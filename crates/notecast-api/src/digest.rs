//! Daily digest: one mail per opted-in user summarising what is waiting in
//! their timeline.

use axum::{Json, extract::State};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{error, info};

use notecast_types::api::{DigestResponse, Status};

use crate::error::ApiResult;
use crate::mailer::{self, digest_mail};
use crate::notes::visible_since;
use crate::{AppState, AppStateInner};

/// `You got new 3 Congrats notes, 1 Reminders notes.`, or `None` when there
/// is nothing to report.
pub fn compose_digest_message(counts: &[(String, i64)]) -> Option<String> {
    let parts: Vec<String> = counts
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(name, count)| format!("{} {} notes", count, name))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("You got new {}.", parts.join(", ")))
}

/// Mail every confirmed, opted-in user their per-type counts. Returns how
/// many mails were handed to the mailer.
pub async fn send_daily_digest(state: &AppStateInner) -> anyhow::Result<usize> {
    let recipients = state.db.blocking(|db| db.get_digest_recipients()).await?;
    let since = visible_since();

    let mut sent = 0;
    for recipient in recipients {
        let id = recipient.id.clone();
        let counts = state
            .db
            .blocking(move |db| db.count_visible_notes_by_type(&id, since))
            .await?;
        let Some(summary) = compose_digest_message(&counts) else {
            continue;
        };
        if mailer::deliver(state.mailer.as_ref(), digest_mail(&recipient.email, &summary)).await {
            sent += 1;
        }
    }

    info!("Daily digest sent to {} user(s)", sent);
    Ok(sent)
}

/// First instant strictly after `now` at `hour`:00 UTC.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour % 24, 0, 0).unwrap_or_default();
    let today = now.date_naive().and_time(at).and_utc();
    if today > now { today } else { today + Duration::days(1) }
}

/// Runs forever, sending the digest once a day at the configured hour.
pub async fn run_digest_loop(state: AppState) {
    loop {
        let now = Utc::now();
        let next = next_run_after(now, state.config.digest_hour);
        info!("Next daily digest at {}", next);

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if let Err(e) = send_daily_digest(&state).await {
            error!("Daily digest failed: {:#}", e);
        }
    }
}

/// POST /api/v1/admin/digest
pub async fn trigger_digest(State(state): State<AppState>) -> ApiResult<Json<DigestResponse>> {
    let sent = send_daily_digest(&state).await?;
    Ok(Json(DigestResponse {
        status: Status::Success,
        sent,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn message_lists_each_type() {
        let counts = vec![("Congrats".to_string(), 3), ("Reminders".to_string(), 1)];
        assert_eq!(
            compose_digest_message(&counts).as_deref(),
            Some("You got new 3 Congrats notes, 1 Reminders notes.")
        );
    }

    #[test]
    fn nothing_to_report() {
        assert_eq!(compose_digest_message(&[]), None);
        assert_eq!(compose_digest_message(&[("Congrats".to_string(), 0)]), None);
    }

    #[test]
    fn next_run_is_today_or_tomorrow() {
        let early = Utc.with_ymd_and_hms(2024, 5, 1, 2, 30, 0).unwrap();
        assert_eq!(next_run_after(early, 4), Utc.with_ymd_and_hms(2024, 5, 1, 4, 0, 0).unwrap());

        let late = Utc.with_ymd_and_hms(2024, 5, 1, 4, 0, 0).unwrap();
        assert_eq!(next_run_after(late, 4), Utc.with_ymd_and_hms(2024, 5, 2, 4, 0, 0).unwrap());
    }
}

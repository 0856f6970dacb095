use tracing::{debug, warn};
use uuid::Uuid;

use notecast_types::events::NoteEvent;

use crate::registry::SessionRegistry;

/// One freshly stored note row, as seen by its receiver.
#[derive(Debug, Clone)]
pub struct NoteNotice {
    pub note_id: Uuid,
    pub receiver_id: Uuid,
    pub title: String,
}

/// Best-effort push of note events to whoever is connected right now.
/// Offline receivers are skipped; there is no queue and no retry.
#[derive(Clone)]
pub struct NotificationDispatcher {
    registry: SessionRegistry,
}

impl NotificationDispatcher {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Push `newNoteReceived` to every live receiver. Call only after the
    /// notes are committed. Returns how many pushes were accepted.
    pub fn notify_note_created(&self, notices: &[NoteNotice]) -> usize {
        let mut delivered = 0;

        for notice in notices {
            let Some(handle) = self.registry.lookup(notice.receiver_id) else {
                debug!("Receiver {} offline, skipping note {}", notice.receiver_id, notice.note_id);
                continue;
            };

            let event = NoteEvent::NewNoteReceived {
                note_id: notice.note_id,
                note_title: notice.title.clone(),
            };

            if handle.send(event) {
                delivered += 1;
            } else {
                warn!(
                    "Failed to push note {} to user {} (connection {} closed)",
                    notice.note_id, notice.receiver_id, handle.conn_id
                );
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;

    fn notice(receiver_id: Uuid, title: &str) -> NoteNotice {
        NoteNotice {
            note_id: Uuid::new_v4(),
            receiver_id,
            title: title.into(),
        }
    }

    #[test]
    fn pushes_only_to_live_receivers() {
        let registry = SessionRegistry::new();
        let dispatcher = NotificationDispatcher::new(registry.clone());
        let (b, c) = (Uuid::new_v4(), Uuid::new_v4());
        let (handle, mut rx) = ConnectionHandle::new();
        registry.register(b, handle);

        let notices = [notice(b, "Party"), notice(c, "Party")];
        assert_eq!(dispatcher.notify_note_created(&notices), 1);

        match rx.try_recv().unwrap() {
            NoteEvent::NewNoteReceived { note_id, note_title } => {
                assert_eq!(note_id, notices[0].note_id);
                assert_eq!(note_title, "Party");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_connection_is_swallowed() {
        let registry = SessionRegistry::new();
        let dispatcher = NotificationDispatcher::new(registry.clone());
        let user = Uuid::new_v4();
        let (handle, rx) = ConnectionHandle::new();
        registry.register(user, handle);
        drop(rx);

        assert_eq!(dispatcher.notify_note_created(&[notice(user, "t")]), 0);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let dispatcher = NotificationDispatcher::new(SessionRegistry::new());
        assert_eq!(dispatcher.notify_note_created(&[]), 0);
    }
}

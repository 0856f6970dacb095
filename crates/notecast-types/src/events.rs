use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum NoteEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// A note addressed to this user was just created
    NewNoteReceived { note_id: Uuid, note_title: String },

    /// The handshake was refused; the server closes the socket after this
    Rejected { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection when no token was given on upgrade
    Identify { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_event_wire_shape() {
        let id = Uuid::new_v4();
        let event = NoteEvent::NewNoteReceived {
            note_id: id,
            note_title: "hi".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "newNoteReceived");
        assert_eq!(json["data"]["noteId"], id.to_string());
        assert_eq!(json["data"]["noteTitle"], "hi");
    }

    #[test]
    fn identify_command_parses() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"identify","data":{"token":"abc"}}"#).unwrap();
        let GatewayCommand::Identify { token } = cmd;
        assert_eq!(token, "abc");
    }
}

//! Real-time side of notecast: who is connected, and pushing note events
//! to them over the WebSocket gateway.

pub mod connection;
pub mod dispatcher;
pub mod registry;

pub use dispatcher::{NoteNotice, NotificationDispatcher};
pub use registry::{ConnectionHandle, SessionRegistry};

//! Session authentication for notecast.
//!
//! Token issuing and revocation ([`ledger`]), the bearer-token check shared
//! by the REST middleware and the WebSocket handshake ([`gate`]), and the
//! credential helpers used by the signup and password flows.

pub mod error;
pub mod gate;
pub mod jwt;
pub mod ledger;
pub mod otp;
pub mod password;

pub use error::AuthError;
pub use gate::{AuthGate, Principal};
pub use jwt::JwtKeys;
pub use ledger::TokenLedger;

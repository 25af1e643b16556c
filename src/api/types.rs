//! API response types.
//!
//! Field names (`con`, `qrcode`, `send`, `destroy`) are the wire contract
//! existing clients poll against.

use serde::Serialize;

use crate::render::LoginImage;
use crate::session::{DestroyOutcome, SendOutcome, SessionStatus};

/// Response for `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Whether the session is authenticated.
    pub con: bool,
    /// Login QR image while awaiting login, otherwise null.
    pub qrcode: Option<LoginImage>,
}

impl From<SessionStatus> for StatusResponse {
    fn from(status: SessionStatus) -> Self {
        Self {
            con: status.connected,
            qrcode: status.login_image,
        }
    }
}

/// Response for `GET /send/{id}/{recipient}/{body}`.
#[derive(Debug, Clone, Serialize)]
pub struct SendResponse {
    pub con: bool,
    pub qrcode: Option<LoginImage>,
    /// Send outcome; absent when not connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<bool>,
}

impl From<SendOutcome> for SendResponse {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::NotConnected { login_image } => Self {
                con: false,
                qrcode: login_image,
                send: None,
            },
            SendOutcome::Sent => Self {
                con: true,
                qrcode: None,
                send: Some(true),
            },
            SendOutcome::Failed => Self {
                con: true,
                qrcode: None,
                send: Some(false),
            },
        }
    }
}

/// Response for `GET /destroy/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct DestroyResponse {
    pub con: bool,
    /// Always null: a fresh token cannot exist yet when this is returned.
    pub qrcode: Option<LoginImage>,
    pub destroy: bool,
}

impl From<DestroyOutcome> for DestroyResponse {
    fn from(outcome: DestroyOutcome) -> Self {
        Self {
            con: false,
            qrcode: None,
            destroy: outcome == DestroyOutcome::Destroyed,
        }
    }
}

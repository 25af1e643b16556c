//! Session management module.
//!
//! This module provides the lifecycle state machine for the single chat
//! session, the credential artifact store it wipes on reset, and the
//! manager tying both to the chat engine.

mod manager;
mod state;
mod store;

pub use manager::{
    DestroyOutcome, ManagerOptions, SendOutcome, SessionManager, SessionStatus,
    DEFAULT_DESTROY_TIMEOUT, DEFAULT_REARM_DELAY,
};
pub use state::SessionState;
pub use store::{SessionStore, WipeReport, DEFAULT_AUTH_DIR, DEFAULT_CACHE_DIR};

//! # chat-gateway
//!
//! Single-account HTTP gateway over an automated chat-network session.
//!
//! The gateway keeps exactly one logged-in session with a chat network,
//! driven by an external automation engine. Clients poll `/status` for the
//! login QR image, send messages through `/send`, and log the account out
//! through `/destroy`, which wipes the stored credentials and arms a fresh
//! session waiting for the next login.
//!
//! ## Features
//!
//! - **Session lifecycle**: explicit state machine with serialized resets
//! - **Pluggable engines**: a JSON-lines process bridge, or an in-process engine for tests
//! - **Credential store**: authentication and cache areas wiped on logout
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_gateway::api::{serve, AppState, ServerConfig};
//! use chat_gateway::engine::{BridgeConfig, BridgeEngineFactory};
//! use chat_gateway::session::{ManagerOptions, SessionManager, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> chat_gateway::Result<()> {
//!     chat_gateway::logging::try_init().ok();
//!
//!     let store = SessionStore::in_dir(".");
//!     let bridge = BridgeConfig::new(
//!         "node",
//!         store.auth_dir().to_path_buf(),
//!         store.cache_dir().to_path_buf(),
//!     )
//!     .with_args(["bridge.js"]);
//!
//!     let manager = SessionManager::start(
//!         store,
//!         Arc::new(BridgeEngineFactory::new(bridge)),
//!         ManagerOptions::default(),
//!     )
//!     .await;
//!
//!     serve(ServerConfig::default(), AppState::new(manager)).await
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod render;
pub mod session;

// Re-export commonly used types
pub use error::{GatewayError, Result};
pub use session::{SessionManager, SessionState, SessionStore};

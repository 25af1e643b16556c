//! HTTP API for chat-gateway.
//!
//! All routes are `GET` and answer JSON, matching what existing clients
//! already call.
//!
//! ## Endpoints
//!
//! - `GET /` - Service information
//! - `GET /health` - Health check
//! - `GET /status` - `{con, qrcode}`
//! - `GET /send/{id}/{recipient}/{body}` - `{con, qrcode, send?}`
//! - `GET /destroy/{id}` - `{con, qrcode, destroy}`
//!
//! While the session is not authenticated, `con` is `false` and `qrcode`
//! carries the login QR image once the network has issued one.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_gateway::api::{serve, AppState, ServerConfig};
//! use chat_gateway::engine::MemoryEngineFactory;
//! use chat_gateway::session::{ManagerOptions, SessionManager, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> chat_gateway::Result<()> {
//!     let manager = SessionManager::start(
//!         SessionStore::in_dir("."),
//!         Arc::new(MemoryEngineFactory::new()),
//!         ManagerOptions::default(),
//!     )
//!     .await;
//!     serve(ServerConfig::default(), AppState::new(manager)).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;

// Re-export commonly used types
pub use handlers::AppState;
pub use router::{create_router, serve, ServerConfig};
pub use types::{DestroyResponse, SendResponse, StatusResponse};

//! Chat engine abstraction layer.
//!
//! The engine is the external capability that actually talks to the chat
//! network. This module narrows it down to:
//!
//! - three events, delivered through an [`EventSink`]: login token issued,
//!   session ready, session disconnected
//! - imperative commands on [`ChatEngine`]: connect, send a message, destroy
//!
//! Engines are built by an [`EngineFactory`], one per session generation.
//! [`bridge`] drives an external bridge process; [`memory`] is an
//! in-process engine for tests and local development.

pub mod bridge;
mod chat_id;
pub mod memory;

pub use bridge::{BridgeConfig, BridgeEngine, BridgeEngineFactory};
pub use chat_id::{ChatId, MAX_RECIPIENT_LEN, USER_CHAT_SUFFIX};
pub use memory::{MemoryEngine, MemoryEngineFactory};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Event emitted by a chat engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The network issued a (possibly rotated) pairing token.
    LoginToken(String),
    /// The session is authenticated.
    Ready,
    /// The session was lost; the handle is dead.
    Disconnected(String),
}

/// An [`EngineEvent`] tagged with the generation of the handle that emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Sending half of the manager's event queue, bound to one engine handle.
///
/// Emission order is preserved. `Disconnected` is emitted at most once, and
/// nothing is emitted after it or after [`EventSink::close`].
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    /// Create a sink for the handle of the given generation.
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self {
            generation,
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a standalone sink and its receiver.
    pub fn channel(generation: u64) -> (Self, mpsc::UnboundedReceiver<TaggedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(generation, tx), rx)
    }

    /// Generation of the handle this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the sink has stopped delivering events.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Report a new login token.
    pub fn login_token(&self, token: impl Into<String>) -> bool {
        self.emit(EngineEvent::LoginToken(token.into()))
    }

    /// Report that the session is authenticated.
    pub fn ready(&self) -> bool {
        self.emit(EngineEvent::Ready)
    }

    /// Report that the session was lost. Only the first call is delivered.
    pub fn disconnected(&self, reason: impl Into<String>) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.send(EngineEvent::Disconnected(reason.into()))
    }

    /// Silence the sink without reporting a disconnect.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn emit(&self, event: EngineEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        self.send(event)
    }

    fn send(&self, event: EngineEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// A live handle to one chat-network session.
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// Start connecting. Login tokens and readiness arrive as events.
    async fn connect(&self) -> crate::Result<()>;

    /// Send a text message to a chat.
    async fn send_message(&self, chat: &ChatId, body: &str) -> crate::Result<()>;

    /// Log out and release the underlying session.
    ///
    /// Returns once the engine no longer touches its credential areas.
    async fn destroy(&self) -> crate::Result<()>;

    /// Release local resources of a handle whose session is already gone.
    ///
    /// Unlike [`ChatEngine::destroy`] this does not talk to the network.
    async fn close(&self) {}
}

/// Builds a fresh engine handle for each session generation.
pub trait EngineFactory: Send + Sync {
    /// Create an engine that reports its events through `events`.
    fn create(&self, events: EventSink) -> crate::Result<Arc<dyn ChatEngine>>;
}

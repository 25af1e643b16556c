//! Session lifecycle manager.
//!
//! Owns the single chat session: at most one engine handle, the current login
//! image, and the state machine tying them together. All mutations happen
//! under one write lock, either from the event pump (engine events, applied
//! in arrival order) or from a caller-initiated [`SessionManager::destroy`].
//! A reset holds that lock from engine teardown through credential wipe to
//! the new handle being armed, so no caller ever sees a half-torn-down
//! session.
//!
//! Every mutation publishes a [`SessionStatus`] snapshot on a watch channel;
//! [`SessionManager::status`] reads the snapshot and never waits on the lock.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use super::{SessionState, SessionStore};
use crate::engine::{ChatEngine, ChatId, EngineEvent, EngineFactory, EventSink, TaggedEvent};
use crate::render::{render_login_token, LoginImage};

/// Default upper bound on a caller-initiated engine destroy.
pub const DEFAULT_DESTROY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay before retrying a failed engine arm.
pub const DEFAULT_REARM_DELAY: Duration = Duration::from_secs(5);

/// Tunables for [`SessionManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Upper bound on engine teardown during a reset.
    pub destroy_timeout: Duration,
    /// Delay before retrying when a new engine cannot be armed.
    pub rearm_delay: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            destroy_timeout: DEFAULT_DESTROY_TIMEOUT,
            rearm_delay: DEFAULT_REARM_DELAY,
        }
    }
}

/// Snapshot returned by [`SessionManager::status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub connected: bool,
    pub login_image: Option<LoginImage>,
}

/// Result of [`SessionManager::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Not authenticated; nothing was sent.
    NotConnected { login_image: Option<LoginImage> },
    /// The engine accepted the message.
    Sent,
    /// Authenticated, but the send failed. Not retried.
    Failed,
}

impl SendOutcome {
    pub fn is_connected(&self) -> bool {
        !matches!(self, SendOutcome::NotConnected { .. })
    }
}

/// Result of [`SessionManager::destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// The session was torn down and a fresh one is awaiting login.
    Destroyed,
    /// There was no authenticated session to destroy.
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResetCause {
    /// The caller asked for it; the engine is still live and must be destroyed.
    Requested,
    /// The network dropped the session; the engine is already dead.
    Disconnected,
}

#[derive(Default)]
struct Session {
    state: SessionState,
    login_image: Option<LoginImage>,
    engine: Option<Arc<dyn ChatEngine>>,
    generation: u64,
}

/// Manages the lifecycle of the single chat session.
pub struct SessionManager {
    me: Weak<SessionManager>,
    session: RwLock<Session>,
    status: watch::Sender<SessionStatus>,
    store: SessionStore,
    factory: Arc<dyn EngineFactory>,
    events: mpsc::UnboundedSender<TaggedEvent>,
    options: ManagerOptions,
}

impl SessionManager {
    /// Create the manager, start its event pump and arm the first engine.
    ///
    /// Must be called within a tokio runtime.
    pub async fn start(
        store: SessionStore,
        factory: Arc<dyn EngineFactory>,
        options: ManagerOptions,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SessionStatus::default());
        let manager = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            session: RwLock::new(Session::default()),
            status,
            store,
            factory,
            events: tx,
            options,
        });

        tokio::spawn(pump(Arc::downgrade(&manager), rx));

        {
            let mut session = manager.session.write().await;
            manager.arm(&mut session).await;
        }

        manager
    }

    /// Current connection status and login image. No side effects.
    ///
    /// Reads the last published snapshot, so it answers even while a reset
    /// or a slow engine call is in progress.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.session.read().await.state
    }

    /// Generation of the most recently armed engine.
    pub async fn generation(&self) -> u64 {
        self.session.read().await.generation
    }

    /// Credential store this manager wipes on reset.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Send a text message to a bare recipient identifier.
    ///
    /// The engine handle is picked under a read guard, so a send never starts
    /// while a reset is in progress. The guard is released before the engine
    /// call: sends may overlap each other, and a reset that discards the
    /// handle fails the sends still in flight on it.
    pub async fn send_message(&self, recipient: &str, body: &str) -> SendOutcome {
        let engine = {
            let session = self.session.read().await;

            if !session.state.is_connected() {
                return SendOutcome::NotConnected {
                    login_image: session.login_image.clone(),
                };
            }

            match session.engine.as_ref() {
                Some(engine) => Arc::clone(engine),
                None => {
                    warn!("no engine available for send");
                    return SendOutcome::Failed;
                }
            }
        };

        let chat = match ChatId::for_recipient(recipient) {
            Ok(chat) => chat,
            Err(e) => {
                warn!(recipient, "rejecting send: {}", e);
                return SendOutcome::Failed;
            }
        };

        match engine.send_message(&chat, body).await {
            Ok(()) => {
                debug!(chat = %chat, "message sent");
                SendOutcome::Sent
            }
            Err(e) => {
                warn!(chat = %chat, "failed to send message: {}", e);
                SendOutcome::Failed
            }
        }
    }

    /// Log out, wipe credentials and arm a fresh session.
    ///
    /// A no-op unless the session is authenticated. Concurrent calls
    /// serialize on the session lock, so only the first one resets.
    pub async fn destroy(&self) -> DestroyOutcome {
        let mut session = self.session.write().await;

        if !session.state.is_connected() {
            debug!(state = ?session.state, "destroy ignored, not connected");
            return DestroyOutcome::NotConnected;
        }

        self.reset(&mut session, ResetCause::Requested).await;
        DestroyOutcome::Destroyed
    }

    /// Release the engine without logging out, keeping credentials on disk.
    ///
    /// Used at process shutdown. The session ends up [`SessionState::Closed`]:
    /// later sends report not connected and engine events are ignored.
    pub async fn shutdown(&self) {
        let mut session = self.session.write().await;
        session.generation += 1;
        session.login_image = None;
        if let Err(e) = session.state.transition_to(SessionState::Closed) {
            debug!("{}", e);
        }
        self.publish(&session);

        if let Some(engine) = session.engine.take() {
            info!("closing engine for shutdown");
            self.close_engine(engine).await;
        }
    }

    fn publish(&self, session: &Session) {
        self.status.send_replace(SessionStatus {
            connected: session.state.is_connected(),
            login_image: session.login_image.clone(),
        });
    }

    async fn handle_event(&self, tagged: TaggedEvent) {
        let mut session = self.session.write().await;

        if tagged.generation != session.generation {
            debug!(
                event_generation = tagged.generation,
                generation = session.generation,
                "dropping event from discarded engine"
            );
            return;
        }

        match tagged.event {
            EngineEvent::LoginToken(raw) => {
                if !session.state.accepts_login_token() {
                    debug!(state = ?session.state, "ignoring login token");
                    return;
                }
                session.login_image = render_login_token(&raw);
                self.publish(&session);
                debug!(
                    generation = session.generation,
                    available = session.login_image.is_some(),
                    "login token updated"
                );
            }
            EngineEvent::Ready => {
                if session.state != SessionState::AwaitingLogin {
                    debug!(state = ?session.state, "ignoring ready event");
                    return;
                }
                if let Err(e) = session.state.transition_to(SessionState::Active) {
                    warn!("{}", e);
                    return;
                }
                session.login_image = None;
                self.publish(&session);
                info!(generation = session.generation, "session authenticated");
            }
            EngineEvent::Disconnected(reason) => match session.state {
                SessionState::Active | SessionState::AwaitingLogin => {
                    warn!(
                        generation = session.generation,
                        reason = %reason,
                        "session disconnected"
                    );
                    self.reset(&mut session, ResetCause::Disconnected).await;
                }
                state => debug!(?state, "ignoring disconnect"),
            },
        }
    }

    /// Tear down the current engine, wipe credentials and arm a new engine.
    async fn reset(&self, session: &mut Session, cause: ResetCause) {
        if let Err(e) = session.state.transition_to(SessionState::Resetting) {
            warn!("cannot reset: {}", e);
            return;
        }
        session.login_image = None;
        self.publish(session);
        info!(generation = session.generation, ?cause, "resetting session");

        if let Some(engine) = session.engine.take() {
            match cause {
                ResetCause::Requested => self.destroy_engine(engine).await,
                ResetCause::Disconnected => self.close_engine(engine).await,
            }
        }

        let report = self.store.wipe();
        if report.is_clean() {
            info!(removed = report.removed.len(), "session credentials wiped");
        } else {
            warn!(
                failed = report.failed.len(),
                "credential wipe incomplete, continuing"
            );
        }

        self.arm(session).await;
    }

    /// Destroy and drop a live engine. Faults are logged, never propagated.
    ///
    /// A destroy that overruns the timeout is abandoned and the engine is
    /// closed instead, so it has released its credential areas on return.
    async fn destroy_engine(&self, engine: Arc<dyn ChatEngine>) {
        let result = tokio::time::timeout(self.options.destroy_timeout, engine.destroy()).await;
        match result {
            Ok(Ok(())) => debug!("engine destroyed"),
            Ok(Err(e)) => warn!("engine destroy failed: {}", e),
            Err(_) => {
                warn!(
                    timeout_ms = self.options.destroy_timeout.as_millis() as u64,
                    "engine destroy timed out, closing it"
                );
                self.close_engine(engine).await;
            }
        }
    }

    async fn close_engine(&self, engine: Arc<dyn ChatEngine>) {
        if tokio::time::timeout(self.options.destroy_timeout, engine.close())
            .await
            .is_err()
        {
            warn!("engine close timed out");
        }
    }

    /// Construct and connect a fresh engine; on failure, retry later.
    async fn arm(&self, session: &mut Session) {
        session.generation += 1;
        session.login_image = None;
        let generation = session.generation;

        if session.state != SessionState::AwaitingLogin {
            if let Err(e) = session.state.transition_to(SessionState::AwaitingLogin) {
                error!("cannot arm engine: {}", e);
                return;
            }
        }
        self.publish(session);

        let sink = EventSink::new(generation, self.events.clone());
        let engine = match self.factory.create(sink) {
            Ok(engine) => engine,
            Err(e) => {
                error!(generation, "failed to create engine: {}", e);
                self.schedule_rearm(generation);
                return;
            }
        };

        if let Err(e) = engine.connect().await {
            error!(generation, "failed to connect engine: {}", e);
            self.close_engine(engine).await;
            self.schedule_rearm(generation);
            return;
        }

        session.engine = Some(engine);
        info!(generation, "engine armed, awaiting login");
    }

    fn schedule_rearm(&self, generation: u64) {
        let me = self.me.clone();
        let delay = self.options.rearm_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = me.upgrade() {
                manager.rearm(generation).await;
            }
        });
    }

    async fn rearm(&self, generation: u64) {
        let mut session = self.session.write().await;

        if session.generation != generation
            || session.engine.is_some()
            || session.state != SessionState::AwaitingLogin
        {
            debug!(generation, "skipping stale re-arm");
            return;
        }

        info!(generation, "retrying engine arm");
        self.arm(&mut session).await;
    }
}

async fn pump(manager: Weak<SessionManager>, mut rx: mpsc::UnboundedReceiver<TaggedEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.handle_event(event).await;
    }
    debug!("session event pump stopped");
}

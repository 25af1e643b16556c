//! In-process chat engine.
//!
//! Nothing leaves the process: the factory hands out engines whose events are
//! triggered by hand ([`MemoryEngineFactory::login_token`],
//! [`MemoryEngineFactory::ready`], [`MemoryEngineFactory::disconnect`]) and
//! whose sends are recorded. Used by the test-suite and for exercising the
//! HTTP surface without a real network session.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use super::{ChatEngine, ChatId, EngineFactory, EventSink};
use crate::error::GatewayError;
use crate::Result;

#[derive(Debug, Default)]
struct Shared {
    created: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    connects: AtomicUsize,
    destroys: AtomicUsize,
    closes: AtomicUsize,
    send_attempts: AtomicUsize,
    fail_sends: AtomicBool,
    fail_create: AtomicBool,
    fail_connect: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
    destroy_delay: Mutex<Option<Duration>>,
    current: Mutex<Option<EventSink>>,
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl Shared {
    fn current_sink(&self) -> Option<EventSink> {
        self.current.lock().ok().and_then(|s| s.clone())
    }
}

/// Factory for [`MemoryEngine`] handles, plus the controls to drive them.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngineFactory {
    shared: Arc<Shared>,
}

impl MemoryEngineFactory {
    /// Create a new factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a login token from the most recently created engine.
    pub fn login_token(&self, token: &str) -> bool {
        self.shared
            .current_sink()
            .map(|s| s.login_token(token))
            .unwrap_or(false)
    }

    /// Mark the most recently created engine as authenticated.
    pub fn ready(&self) -> bool {
        self.shared
            .current_sink()
            .map(|s| s.ready())
            .unwrap_or(false)
    }

    /// Simulate the network dropping the most recently created engine.
    pub fn disconnect(&self, reason: &str) -> bool {
        self.shared
            .current_sink()
            .map(|s| s.disconnected(reason))
            .unwrap_or(false)
    }

    /// Make subsequent sends fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.shared.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `create` calls fail.
    pub fn set_fail_create(&self, fail: bool) {
        self.shared.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `connect` calls fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Delay every send by the given duration. A send still waiting when its
    /// engine is destroyed or closed fails with [`GatewayError::EngineClosed`].
    pub fn set_send_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.shared.send_delay.lock() {
            *d = delay;
        }
    }

    /// Delay every `destroy` by the given duration.
    pub fn set_destroy_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.shared.destroy_delay.lock() {
            *d = delay;
        }
    }

    /// Number of engines created so far.
    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    /// Number of engines currently alive (created and not yet dropped).
    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Highest number of engines ever alive at the same time.
    pub fn peak_live(&self) -> usize {
        self.shared.peak_live.load(Ordering::SeqCst)
    }

    /// Number of `connect` calls.
    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Number of `destroy` calls.
    pub fn destroys(&self) -> usize {
        self.shared.destroys.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Number of `send_message` calls, successful or not.
    pub fn send_attempts(&self) -> usize {
        self.shared.send_attempts.load(Ordering::SeqCst)
    }

    /// Messages delivered so far.
    pub fn sent_messages(&self) -> Vec<(ChatId, String)> {
        self.shared
            .sent
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl EngineFactory for MemoryEngineFactory {
    fn create(&self, events: EventSink) -> Result<Arc<dyn ChatEngine>> {
        if self.shared.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Engine("engine creation disabled".into()));
        }

        self.shared.created.fetch_add(1, Ordering::SeqCst);
        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak_live.fetch_max(live, Ordering::SeqCst);

        if let Ok(mut current) = self.shared.current.lock() {
            *current = Some(events.clone());
        }

        debug!(generation = events.generation(), "memory engine created");
        let (released, _) = watch::channel(false);
        Ok(Arc::new(MemoryEngine {
            shared: Arc::clone(&self.shared),
            events,
            released,
        }))
    }
}

/// Engine handle created by [`MemoryEngineFactory`].
#[derive(Debug)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
    events: EventSink,
    released: watch::Sender<bool>,
}

impl MemoryEngine {
    fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    fn release(&self) {
        self.events.close();
        self.released.send_replace(true);
    }
}

#[async_trait]
impl ChatEngine for MemoryEngine {
    async fn connect(&self) -> Result<()> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(GatewayError::Engine("network unreachable".into()));
        }
        Ok(())
    }

    async fn send_message(&self, chat: &ChatId, body: &str) -> Result<()> {
        self.shared.send_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.shared.send_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            let mut released = self.released.subscribe();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = released.wait_for(|closed| *closed) => {
                    return Err(GatewayError::EngineClosed);
                }
            }
        }

        if self.is_released() {
            return Err(GatewayError::EngineClosed);
        }
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(GatewayError::Engine(format!("chat {} unreachable", chat)));
        }

        if let Ok(mut sent) = self.shared.sent.lock() {
            sent.push((chat.clone(), body.to_string()));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.shared.destroys.fetch_add(1, Ordering::SeqCst);
        self.events.close();

        let delay = self.shared.destroy_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.release();
        Ok(())
    }

    async fn close(&self) {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.release();
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineEvent;

    #[tokio::test]
    async fn test_send_records_message() {
        let factory = MemoryEngineFactory::new();
        let (sink, _rx) = EventSink::channel(1);
        let engine = factory.create(sink).unwrap();

        let chat = ChatId::for_recipient("5511999999999").unwrap();
        engine.send_message(&chat, "hi").await.unwrap();

        assert_eq!(factory.sent_messages(), vec![(chat, "hi".to_string())]);
    }

    #[tokio::test]
    async fn test_send_after_destroy_fails() {
        let factory = MemoryEngineFactory::new();
        let (sink, _rx) = EventSink::channel(1);
        let engine = factory.create(sink).unwrap();
        engine.destroy().await.unwrap();

        let chat = ChatId::for_recipient("1").unwrap();
        let err = engine.send_message(&chat, "late").await.unwrap_err();
        assert!(matches!(err, GatewayError::EngineClosed));
        assert!(factory.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_close_fails_waiting_send() {
        let factory = MemoryEngineFactory::new();
        factory.set_send_delay(Some(Duration::from_secs(3600)));
        let (sink, _rx) = EventSink::channel(1);
        let engine = factory.create(sink).unwrap();

        let send = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let chat = ChatId::for_recipient("1").unwrap();
                engine.send_message(&chat, "slow").await
            })
        };
        while factory.send_attempts() == 0 {
            tokio::task::yield_now().await;
        }

        engine.close().await;

        let result = tokio::time::timeout(Duration::from_secs(2), send)
            .await
            .expect("send still pending after close")
            .unwrap();
        assert!(matches!(result, Err(GatewayError::EngineClosed)));
        assert_eq!(factory.closes(), 1);
        assert!(factory.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_controls_emit_on_current_sink() {
        let factory = MemoryEngineFactory::new();
        let (sink, mut rx) = EventSink::channel(4);
        let _engine = factory.create(sink).unwrap();

        assert!(factory.login_token("tok"));
        assert!(factory.ready());

        assert_eq!(
            rx.recv().await.unwrap().event,
            EngineEvent::LoginToken("tok".into())
        );
        assert_eq!(rx.recv().await.unwrap().event, EngineEvent::Ready);
    }

    #[test]
    fn test_live_count_tracks_drop() {
        let factory = MemoryEngineFactory::new();
        let (a, _rx_a) = EventSink::channel(1);
        let (b, _rx_b) = EventSink::channel(2);

        let first = factory.create(a).unwrap();
        let second = factory.create(b).unwrap();
        assert_eq!(factory.live(), 2);
        drop(first);
        assert_eq!(factory.live(), 1);
        drop(second);
        assert_eq!(factory.live(), 0);
        assert_eq!(factory.created(), 2);
        assert_eq!(factory.peak_live(), 2);
    }

    #[test]
    fn test_fail_create() {
        let factory = MemoryEngineFactory::new();
        factory.set_fail_create(true);
        let (sink, _rx) = EventSink::channel(1);
        assert!(factory.create(sink).is_err());
        assert_eq!(factory.created(), 0);
        assert_eq!(factory.live(), 0);
    }
}

//! Bridge-process chat engine.
//!
//! The chat network is driven by an external automation process (typically a
//! small script around the network's web client). The gateway spawns it with
//! piped stdio and talks newline-delimited JSON:
//!
//! ```text
//! gateway -> bridge   {"id":1,"method":"sendMessage","params":{"chatId":"5511...@c.us","body":"hi"}}
//! bridge  -> gateway  {"id":1,"result":{}}
//! bridge  -> gateway  {"id":2,"error":{"message":"chat not found"}}
//! bridge  -> gateway  {"event":"qr","params":{"token":"2@abc..."}}
//! bridge  -> gateway  {"event":"ready"}
//! bridge  -> gateway  {"event":"disconnected","params":{"reason":"LOGOUT"}}
//! ```
//!
//! Lines carrying an `id` are responses and are matched to the pending
//! request; everything else is an event. The credential areas are passed to
//! the process through [`AUTH_DIR_ENV`] and [`CACHE_DIR_ENV`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{ChatEngine, ChatId, EngineFactory, EventSink};
use crate::error::GatewayError;
use crate::Result;

/// Environment variable carrying the authentication area path.
pub const AUTH_DIR_ENV: &str = "CHAT_GATEWAY_AUTH_DIR";

/// Environment variable carrying the cache area path.
pub const CACHE_DIR_ENV: &str = "CHAT_GATEWAY_CACHE_DIR";

/// How long to wait for the bridge to exit on its own before killing it.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Reason reported when the bridge output stream ends.
const EXITED_REASON: &str = "bridge process exited";

/// How to launch the bridge process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Authentication material area.
    pub auth_dir: PathBuf,
    /// Runtime cache area.
    pub cache_dir: PathBuf,
    /// Working directory for the process.
    pub working_dir: Option<PathBuf>,
}

impl BridgeConfig {
    pub fn new(command: impl Into<String>, auth_dir: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            auth_dir,
            cache_dir,
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Creates one [`BridgeEngine`] (and thus one bridge process) per generation.
#[derive(Debug, Clone)]
pub struct BridgeEngineFactory {
    config: BridgeConfig,
}

impl BridgeEngineFactory {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for BridgeEngineFactory {
    fn create(&self, events: EventSink) -> Result<Arc<dyn ChatEngine>> {
        Ok(Arc::new(BridgeEngine::new(self.config.clone(), events)))
    }
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Event {
    event: String,
    #[serde(default)]
    params: Value,
}

/// Responses carry an `id`; events do not.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Incoming {
    Response(Response),
    Event(Event),
}

type Callback = oneshot::Sender<Result<Value>>;

/// Pending requests, closed once the output stream ends.
#[derive(Debug, Default)]
struct PendingTable {
    closed: bool,
    callbacks: HashMap<u64, Callback>,
}

type Pending = Arc<Mutex<PendingTable>>;

fn lock(pending: &Pending) -> MutexGuard<'_, PendingTable> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Refuse new requests and fail every waiter with `EngineClosed`.
fn close_pending(pending: &Pending) {
    let mut table = lock(pending);
    table.closed = true;
    table.callbacks.clear();
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Engine handle backed by a bridge process (or any attached byte stream).
pub struct BridgeEngine {
    config: Option<BridgeConfig>,
    events: EventSink,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    child: tokio::sync::Mutex<Option<Child>>,
    pending: Pending,
    next_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeEngine {
    /// Create an engine that will spawn the bridge on [`ChatEngine::connect`].
    pub fn new(config: BridgeConfig, events: EventSink) -> Self {
        Self {
            config: Some(config),
            events,
            writer: tokio::sync::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            pending: Arc::default(),
            next_id: AtomicU64::new(1),
            reader: Mutex::new(None),
        }
    }

    /// Create an engine over an already-connected stream pair.
    ///
    /// Must be called within a tokio runtime.
    pub fn attach<W, R>(writer: W, reader: R, events: EventSink) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let engine = Self {
            config: None,
            events,
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            child: tokio::sync::Mutex::new(None),
            pending: Arc::default(),
            next_id: AtomicU64::new(1),
            reader: Mutex::new(None),
        };
        engine.start_reader(reader);
        engine
    }

    fn start_reader<R>(&self, reader: R)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let handle = tokio::spawn(read_loop(
            reader,
            Arc::clone(&self.pending),
            self.events.clone(),
        ));
        if let Ok(mut slot) = self.reader.lock() {
            *slot = Some(handle);
        }
    }

    fn spawn_process(config: &BridgeConfig) -> Result<Child> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .env(AUTH_DIR_ENV, &config.auth_dir)
            .env(CACHE_DIR_ENV, &config.cache_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(ref dir) = config.working_dir {
            command.current_dir(dir);
        }

        command.spawn().map_err(GatewayError::Io)
    }

    /// Send a request and wait for the matching response.
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(GatewayError::EngineClosed);
            }
            pending.callbacks.insert(id, tx);
        }

        if let Err(e) = self.write_request(id, method, params).await {
            lock(&self.pending).callbacks.remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| GatewayError::EngineClosed)?
    }

    async fn write_request(&self, id: u64, method: &str, params: Value) -> Result<()> {
        let mut line = serde_json::to_string(&Request { id, method, params })?;
        line.push('\n');
        trace!(id, method, "bridge request");

        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(GatewayError::EngineUnavailable)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Fail in-flight requests, close stdin and make sure the process is gone.
    async fn release(&self) {
        close_pending(&self.pending);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "bridge process exited"),
            Ok(Err(e)) => warn!("failed to wait for bridge process: {}", e),
            Err(_) => {
                warn!("bridge process did not exit in time, killing it");
                if let Err(e) = child.kill().await {
                    warn!("failed to kill bridge process: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl ChatEngine for BridgeEngine {
    async fn connect(&self) -> Result<()> {
        if self.writer.lock().await.is_some() {
            return Ok(());
        }
        let config = self.config.as_ref().ok_or(GatewayError::EngineUnavailable)?;

        let mut child = Self::spawn_process(config)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::Protocol("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::Protocol("bridge stdout unavailable".into()))?;

        info!(
            generation = self.events.generation(),
            pid = child.id(),
            command = %config.command,
            "bridge process started"
        );

        *self.writer.lock().await = Some(Box::new(stdin));
        *self.child.lock().await = Some(child);
        self.start_reader(stdout);
        Ok(())
    }

    async fn send_message(&self, chat: &ChatId, body: &str) -> Result<()> {
        self.request(
            "sendMessage",
            json!({ "chatId": chat.as_str(), "body": body }),
        )
        .await
        .map(|_| ())
    }

    async fn destroy(&self) -> Result<()> {
        // Caller-initiated: the resulting stream end is not a disconnect.
        self.events.close();
        let result = self.request("destroy", json!({})).await.map(|_| ());
        self.release().await;
        result
    }

    async fn close(&self) {
        self.events.close();
        self.release().await;
    }
}

impl Drop for BridgeEngine {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.reader.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

async fn read_loop<R>(reader: R, pending: Pending, events: EventSink)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch_line(&line, &pending, &events),
            Ok(None) => {
                debug!("bridge output closed");
                break;
            }
            Err(e) => {
                warn!("bridge read error: {}", e);
                break;
            }
        }
    }

    close_pending(&pending);
    events.disconnected(EXITED_REASON);
}

fn dispatch_line(line: &str, pending: &Pending, events: &EventSink) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let message: Incoming = match serde_json::from_str(line) {
        Ok(m) => m,
        Err(e) => {
            warn!("ignoring malformed bridge line: {}", e);
            return;
        }
    };

    match message {
        Incoming::Response(response) => {
            let Some(callback) = lock(pending).callbacks.remove(&response.id) else {
                debug!(id = response.id, "response for unknown request");
                return;
            };
            let result = match response.error {
                Some(error) => Err(GatewayError::Engine(error.message)),
                None => Ok(response.result.unwrap_or(Value::Null)),
            };
            let _ = callback.send(result);
        }
        Incoming::Event(event) => dispatch_event(event, events),
    }
}

fn dispatch_event(event: Event, events: &EventSink) {
    match event.event.as_str() {
        "qr" => match event.params.get("token").and_then(Value::as_str) {
            Some(token) => {
                events.login_token(token);
            }
            None => warn!("qr event without token"),
        },
        "ready" => {
            events.ready();
        }
        "disconnected" => {
            let reason = event
                .params
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            events.disconnected(reason);
        }
        other => debug!(event = other, "ignoring bridge event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineEvent, TaggedEvent};
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::sync::mpsc;

    struct FakeBridge {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeBridge {
        async fn next_request(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn send(&mut self, value: Value) {
            let mut line = value.to_string();
            line.push('\n');
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }
    }

    fn setup() -> (
        Arc<BridgeEngine>,
        FakeBridge,
        mpsc::UnboundedReceiver<TaggedEvent>,
    ) {
        let (engine_side, bridge_side) = tokio::io::duplex(4096);
        let (engine_read, engine_write) = tokio::io::split(engine_side);
        let (bridge_read, bridge_write) = tokio::io::split(bridge_side);
        let (sink, rx) = EventSink::channel(3);

        let engine = Arc::new(BridgeEngine::attach(engine_write, engine_read, sink));
        let bridge = FakeBridge {
            lines: BufReader::new(bridge_read).lines(),
            writer: bridge_write,
        };
        (engine, bridge, rx)
    }

    #[tokio::test]
    async fn test_events_are_forwarded() {
        let (_engine, mut bridge, mut rx) = setup();

        bridge
            .send(json!({"event": "qr", "params": {"token": "2@abc"}}))
            .await;
        bridge.send(json!({"event": "ready"})).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.generation, 3);
        assert_eq!(first.event, EngineEvent::LoginToken("2@abc".into()));
        assert_eq!(rx.recv().await.unwrap().event, EngineEvent::Ready);
    }

    #[tokio::test]
    async fn test_send_message_roundtrip() {
        let (engine, mut bridge, _rx) = setup();
        let chat = ChatId::for_recipient("5511999999999").unwrap();

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.send_message(&chat, "hi").await })
        };

        let request = bridge.next_request().await;
        assert_eq!(request["method"], "sendMessage");
        assert_eq!(request["params"]["chatId"], "5511999999999@c.us");
        assert_eq!(request["params"]["body"], "hi");

        bridge
            .send(json!({"id": request["id"], "result": {}}))
            .await;
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_error_response() {
        let (engine, mut bridge, _rx) = setup();
        let chat = ChatId::for_recipient("1").unwrap();

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.send_message(&chat, "x").await })
        };

        let request = bridge.next_request().await;
        bridge
            .send(json!({"id": request["id"], "error": {"message": "chat not found"}}))
            .await;

        match task.await.unwrap() {
            Err(GatewayError::Engine(msg)) => assert_eq!(msg, "chat not found"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let (_engine, mut bridge, mut rx) = setup();

        bridge.writer.write_all(b"not json\n\n").await.unwrap();
        bridge.send(json!({"event": "ready"})).await;

        assert_eq!(rx.recv().await.unwrap().event, EngineEvent::Ready);
    }

    #[tokio::test]
    async fn test_eof_fails_pending_and_disconnects_once() {
        let (engine, mut bridge, mut rx) = setup();
        let chat = ChatId::for_recipient("1").unwrap();

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.send_message(&chat, "x").await })
        };
        let _ = bridge.next_request().await;
        drop(bridge);

        assert!(matches!(
            task.await.unwrap(),
            Err(GatewayError::EngineClosed)
        ));
        assert_eq!(
            rx.recv().await.unwrap().event,
            EngineEvent::Disconnected(EXITED_REASON.into())
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_requests_after_close_fail_fast() {
        let (engine, bridge, mut rx) = setup();
        drop(bridge);
        let _ = rx.recv().await;

        let chat = ChatId::for_recipient("1").unwrap();
        assert!(engine.send_message(&chat, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_destroy_is_not_reported_as_disconnect() {
        let (engine, mut bridge, mut rx) = setup();

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.destroy().await })
        };

        let request = bridge.next_request().await;
        assert_eq!(request["method"], "destroy");
        bridge.send(json!({"id": request["id"], "result": null})).await;
        assert!(task.await.unwrap().is_ok());

        drop(bridge);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_fails_in_flight_request() {
        let (engine, mut bridge, mut rx) = setup();
        let chat = ChatId::for_recipient("1").unwrap();

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.send_message(&chat, "x").await })
        };
        let request = bridge.next_request().await;
        assert_eq!(request["method"], "sendMessage");

        engine.close().await;

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("request still pending after close")
            .unwrap();
        assert!(matches!(result, Err(GatewayError::EngineClosed)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_without_config_on_attached_engine() {
        let (engine, _bridge, _rx) = setup();
        assert!(engine.connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let (sink, _rx) = EventSink::channel(1);
        let config = BridgeConfig::new(
            "/nonexistent/chat-gateway-bridge",
            PathBuf::from("/tmp/auth"),
            PathBuf::from("/tmp/cache"),
        );
        let engine = BridgeEngine::new(config, sink);
        assert!(matches!(engine.connect().await, Err(GatewayError::Io(_))));
    }

    #[test]
    fn test_incoming_discrimination() {
        let response: Incoming = serde_json::from_str(r#"{"id":4,"result":{}}"#).unwrap();
        assert!(matches!(response, Incoming::Response(Response { id: 4, .. })));

        let event: Incoming = serde_json::from_str(r#"{"event":"ready"}"#).unwrap();
        assert!(matches!(event, Incoming::Event(_)));
    }
}

//! Backend connection: one language server process and its JSON-RPC stream.
//!
//! Each connection runs on its own thread with a single-threaded tokio
//! runtime, mirroring how the editor client kept LSP traffic off the
//! caller's thread. Inside the runtime there is one writer task (the only
//! place frames are written), one reader pump and one supervisor that owns
//! the child process. Callers stay synchronous: they enqueue frames and block
//! on a [`PendingRequest`] with a deadline.

use crate::request_table::{PendingRequest, RequestTable};
use crate::transport::{
    parse_message, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId, TransportReader, TransportWriter, METHOD_NOT_FOUND,
};
use lsp_types::ServerCapabilities;
use parking_lot::{Condvar, Mutex};
use semd_core::{Error, MessageQueue, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// How long to keep retrying a TCP connection to a freshly started server.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on each phase of a graceful shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unstarted,
    Starting,
    Initialized,
    ShuttingDown,
    Dead,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Unstarted => "Unstarted",
            ConnectionState::Starting => "Starting",
            ConnectionState::Initialized => "Initialized",
            ConnectionState::ShuttingDown => "ShuttingDown",
            ConnectionState::Dead => "Dead",
        }
    }

    /// Error for a call issued in this state, if calls are not allowed.
    fn lifecycle_error(self) -> Option<Error> {
        match self {
            ConnectionState::Initialized => None,
            ConnectionState::Unstarted | ConnectionState::Starting => {
                Some(Error::ServerNotInitialized)
            }
            ConnectionState::ShuttingDown | ConnectionState::Dead => Some(Error::ServerNotRunning),
        }
    }
}

/// How to launch a backend.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Human readable server name, used in logs and debug info.
    pub name: String,
    /// Executable followed by its arguments.
    pub cmdline: Vec<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    /// Connect over TCP to this local port instead of using stdio.
    pub port: Option<u16>,
    /// Where the server's stderr goes.
    pub logfile: Option<PathBuf>,
    /// Leave the logfile on disk after shutdown.
    pub keep_logfile: bool,
}

/// Answers the connection gives to server-initiated requests.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Returned (by section) for `workspace/configuration`.
    pub settings: Value,
    /// Reported for `workspace/workspaceFolders`.
    pub project_root: PathBuf,
}

/// An unsolicited message from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
    pub received: Instant,
}

/// Called on the reader thread for every notification, before it is queued.
pub type NotificationHook = Arc<dyn Fn(&Notification) + Send + Sync>;

enum Outgoing {
    Message(JsonRpcMessage),
    Close,
}

struct StateInner {
    state: ConnectionState,
    exited: bool,
}

/// Connection state shared between callers and the runtime thread.
struct StateCell {
    inner: Mutex<StateInner>,
    changed: Condvar,
}

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                state,
                exited: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn get(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Moves to `next` unless already dead. Returns the previous state.
    fn advance(&self, next: ConnectionState) -> ConnectionState {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        if previous != ConnectionState::Dead {
            inner.state = next;
            self.changed.notify_all();
        }
        previous
    }

    fn set_exited(&self) {
        let mut inner = self.inner.lock();
        inner.exited = true;
        self.changed.notify_all();
    }

    fn has_exited(&self) -> bool {
        self.inner.lock().exited
    }

    /// Waits while the state is `Starting`. Returns the state seen last.
    fn wait_while_starting(&self, timeout: Duration) -> ConnectionState {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.state == ConnectionState::Starting {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.state
    }

    fn wait_exited(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.exited {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.exited
    }
}

/// Everything the runtime tasks share with the owning [`Connection`].
struct Shared {
    name: String,
    state: StateCell,
    table: Arc<RequestTable>,
    queue: MessageQueue<Notification>,
    hook: Option<NotificationHook>,
    client: ClientSettings,
}

impl Shared {
    /// Transitions to `Dead` and fails everything that was waiting.
    fn mark_dead(&self, reason: &str) {
        let previous = self.state.advance(ConnectionState::Dead);
        if previous != ConnectionState::Dead {
            if previous == ConnectionState::ShuttingDown {
                log::info!("{}: connection closed ({})", self.name, reason);
            } else {
                log::warn!("{}: connection died ({})", self.name, reason);
            }
        }
        self.table.cancel_all(Error::ConnectionLost);
        self.queue.close();
    }
}

/// A live (or dead) backend connection.
pub struct Connection {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    pid: Option<u32>,
    spec: LaunchSpec,
    capabilities: Mutex<Option<ServerCapabilities>>,
    requests_sent: AtomicU64,
}

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

impl Connection {
    /// Spawns the backend and starts the pump. The connection is left in
    /// `Starting`; call [`Connection::initialize`] next.
    pub fn start(
        spec: LaunchSpec,
        client: ClientSettings,
        hook: Option<NotificationHook>,
    ) -> Result<Self> {
        if spec.cmdline.is_empty() {
            return Err(Error::ServerFailedToStart(format!(
                "{}: empty command line",
                spec.name
            )));
        }

        let shared = Arc::new(Shared {
            name: spec.name.clone(),
            state: StateCell::new(ConnectionState::Starting),
            table: Arc::new(RequestTable::new()),
            queue: MessageQueue::default(),
            hook,
            client,
        });
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (started_tx, started_rx) = crossbeam_channel::bounded::<Result<Option<u32>>>(1);

        let thread_shared = Arc::clone(&shared);
        let thread_spec = spec.clone();
        let writer_tx = outgoing_tx.clone();
        thread::Builder::new()
            .name(format!("semd-{}", spec.name))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = started_tx.send(Err(e.into()));
                        return;
                    }
                };
                rt.block_on(run_connection(
                    thread_spec,
                    thread_shared,
                    outgoing_rx,
                    writer_tx,
                    kill_rx,
                    started_tx,
                ));
            })?;

        let pid = match started_rx.recv() {
            Ok(Ok(pid)) => pid,
            Ok(Err(e)) => {
                shared.mark_dead("failed to start");
                return Err(e);
            }
            Err(_) => {
                shared.mark_dead("runtime thread exited");
                return Err(Error::ServerFailedToStart(spec.name.clone()));
            }
        };

        log::info!(
            "Started {} (pid {:?}): {}",
            spec.name,
            pid,
            spec.cmdline.join(" ")
        );

        Ok(Self {
            shared,
            outgoing: outgoing_tx,
            kill_tx: Mutex::new(Some(kill_tx)),
            pid,
            spec,
            capabilities: Mutex::new(None),
            requests_sent: AtomicU64::new(0),
        })
    }

    /// Performs the `initialize` handshake within `timeout`.
    ///
    /// On failure the process is killed and the connection is dead.
    pub fn initialize(&self, params: Value, timeout: Duration) -> Result<ServerCapabilities> {
        let pending = match self.send_request_unchecked("initialize", Some(params)) {
            Ok(p) => p,
            Err(e) => {
                self.kill();
                return Err(e);
            }
        };
        let response = match pending.wait(timeout) {
            Ok(value) => value,
            Err(e) => {
                log::error!("{}: initialize failed: {}", self.spec.name, e);
                self.kill();
                self.shared.mark_dead("initialize failed");
                return Err(match e {
                    Error::Timeout => Error::ConnectionTimeout,
                    other => other,
                });
            }
        };

        let capabilities: ServerCapabilities =
            serde_json::from_value(response["capabilities"].clone()).unwrap_or_else(|e| {
                log::warn!("{}: unreadable capabilities: {}", self.spec.name, e);
                ServerCapabilities::default()
            });
        *self.capabilities.lock() = Some(capabilities.clone());

        self.enqueue(JsonRpcMessage::notification("initialized", Some(json!({}))))?;
        if self.shared.state.advance(ConnectionState::Initialized) == ConnectionState::Dead {
            return Err(Error::ServerNotRunning);
        }
        log::info!("{}: initialized", self.spec.name);
        Ok(capabilities)
    }

    /// Sends a request and blocks for its result.
    pub fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        self.send_request(method, params)?.wait(timeout)
    }

    /// Sends a request and returns the handle to wait on.
    pub fn send_request(&self, method: &str, params: Value) -> Result<PendingRequest> {
        if let Some(e) = self.state().lifecycle_error() {
            return Err(e);
        }
        self.send_request_unchecked(method, Some(params))
    }

    /// Sends a notification.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        if let Some(e) = self.state().lifecycle_error() {
            return Err(e);
        }
        self.enqueue(JsonRpcMessage::notification(method, Some(params)))
    }

    fn send_request_unchecked(&self, method: &str, params: Option<Value>) -> Result<PendingRequest> {
        let id = self.shared.table.next_id();
        let pending = self.shared.table.register(id);
        self.enqueue(JsonRpcMessage::request(id, method, params))?;
        self.requests_sent.fetch_add(1, Ordering::SeqCst);
        log::debug!("{}: -> {} (id {})", self.spec.name, method, id);
        Ok(pending)
    }

    fn enqueue(&self, message: JsonRpcMessage) -> Result<()> {
        self.outgoing
            .send(Outgoing::Message(message))
            .map_err(|_| Error::ConnectionLost)
    }

    /// Waits (bounded) for the handshake to finish.
    pub fn await_initialized(&self, timeout: Duration) -> ConnectionState {
        self.shared.state.wait_while_starting(timeout)
    }

    /// Two-phase shutdown: polite `shutdown`/`exit`, then a forced kill if
    /// the process has not exited within `timeout`. Never fails.
    pub fn shutdown(&self, timeout: Duration) {
        let previous = self.shared.state.advance(ConnectionState::ShuttingDown);
        if previous == ConnectionState::Dead && self.shared.state.has_exited() {
            return;
        }
        log::info!("{}: shutting down", self.spec.name);

        if previous == ConnectionState::Initialized {
            match self.send_request_unchecked("shutdown", None) {
                Ok(pending) => {
                    if let Err(e) = pending.wait(timeout) {
                        log::warn!("{}: shutdown request failed: {}", self.spec.name, e);
                    }
                }
                Err(e) => log::warn!("{}: could not send shutdown: {}", self.spec.name, e),
            }
            if let Err(e) = self.enqueue(JsonRpcMessage::notification("exit", None)) {
                log::warn!("{}: could not send exit: {}", self.spec.name, e);
            }
        }
        let _ = self.outgoing.send(Outgoing::Close);

        if !self.shared.state.wait_exited(timeout) {
            log::warn!("{}: did not exit in time, killing", self.spec.name);
            self.kill();
            if !self.shared.state.wait_exited(timeout) {
                log::error!("{}: process did not die after kill", self.spec.name);
            }
        }
        self.shared.mark_dead("shutdown");
        self.remove_logfile();
    }

    /// Forcefully terminates the process.
    pub fn kill(&self) {
        if let Some(tx) = self.kill_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    fn remove_logfile(&self) {
        if self.spec.keep_logfile {
            return;
        }
        if let Some(path) = &self.spec.logfile {
            if let Err(e) = std::fs::remove_file(path) {
                log::debug!("Could not remove {}: {}", path.display(), e);
            }
        }
    }

    /// Notifications waiting for a long-poll. Closed once the connection dies.
    pub fn messages(&self) -> &MessageQueue<Notification> {
        &self.shared.queue
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// True while the process is up and the stream is usable.
    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Starting | ConnectionState::Initialized
        ) && !self.shared.state.has_exited()
    }

    /// True once the process has been reaped.
    pub fn has_exited(&self) -> bool {
        self.shared.state.has_exited()
    }

    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        self.capabilities.lock().clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    pub fn logfile(&self) -> Option<&Path> {
        self.spec.logfile.as_deref()
    }

    /// Number of requests written so far, including `initialize`.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::SeqCst)
    }

    pub fn outstanding_requests(&self) -> usize {
        self.shared.table.outstanding()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.shared.state.has_exited() {
            self.kill();
        }
        let _ = self.outgoing.send(Outgoing::Close);
    }
}

fn spawn_child(spec: &LaunchSpec) -> std::io::Result<Child> {
    let mut cmd = Command::new(&spec.cmdline[0]);
    cmd.args(&spec.cmdline[1..])
        .current_dir(&spec.working_dir)
        .envs(&spec.env)
        .kill_on_drop(true);

    if spec.port.is_some() {
        cmd.stdin(Stdio::null()).stdout(Stdio::null());
    } else {
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped());
    }

    match &spec.logfile {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            cmd.stderr(Stdio::from(file));
        }
        None => {
            cmd.stderr(Stdio::null());
        }
    }

    cmd.spawn()
}

async fn connect_tcp(port: u16) -> Result<(BoxedReader, BoxedWriter)> {
    let deadline = tokio::time::Instant::now() + CONNECTION_TIMEOUT;
    loop {
        match tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => {
                let (read, write) = stream.into_split();
                return Ok((Box::new(read), Box::new(write)));
            }
            Err(e) if tokio::time::Instant::now() < deadline => {
                log::trace!("Waiting for port {}: {}", port, e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(_) => return Err(Error::ConnectionTimeout),
        }
    }
}

/// Runs the connection until both the stream and the process are gone.
async fn run_connection(
    spec: LaunchSpec,
    shared: Arc<Shared>,
    mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
    reply_tx: mpsc::UnboundedSender<Outgoing>,
    kill_rx: oneshot::Receiver<()>,
    started_tx: crossbeam_channel::Sender<Result<Option<u32>>>,
) {
    let mut child = match spawn_child(&spec) {
        Ok(child) => child,
        Err(e) => {
            log::error!("Failed to start '{}': {}", spec.cmdline[0], e);
            let _ = started_tx.send(Err(Error::ServerFailedToStart(format!(
                "{}: {}",
                spec.cmdline[0], e
            ))));
            return;
        }
    };
    let pid = child.id();

    let streams: Result<(BoxedReader, BoxedWriter)> = match spec.port {
        Some(port) => connect_tcp(port).await,
        None => match (child.stdout.take(), child.stdin.take()) {
            (Some(stdout), Some(stdin)) => Ok((Box::new(stdout), Box::new(stdin))),
            _ => Err(Error::ServerFailedToStart("missing stdio pipes".to_string())),
        },
    };
    let (read_half, write_half) = match streams {
        Ok(halves) => halves,
        Err(e) => {
            let _ = child.kill().await;
            shared.state.set_exited();
            let _ = started_tx.send(Err(e));
            return;
        }
    };
    let _ = started_tx.send(Ok(pid));

    // Write task: the only place frames are written.
    let write_name = shared.name.clone();
    let write_task = tokio::spawn(async move {
        let mut writer = TransportWriter::new(write_half);
        while let Some(msg) = outgoing_rx.recv().await {
            match msg {
                Outgoing::Message(message) => {
                    if let Err(e) = writer.send_message(&message).await {
                        log::error!("{}: failed to write: {}", write_name, e);
                        break;
                    }
                }
                Outgoing::Close => {
                    let _ = writer.close().await;
                    break;
                }
            }
        }
    });

    // Read task: routes every frame to exactly one consumer.
    let read_shared = Arc::clone(&shared);
    let read_task = tokio::spawn(async move {
        let mut reader = TransportReader::new(read_half);
        loop {
            match reader.read_message().await {
                Ok(Some(value)) => handle_server_message(&read_shared, &reply_tx, value),
                Ok(None) => {
                    read_shared.mark_dead("end of stream");
                    break;
                }
                Err(Error::Json(e)) => {
                    log::warn!("{}: ignoring undecodable frame: {}", read_shared.name, e);
                }
                Err(e) => {
                    read_shared.mark_dead(&e.to_string());
                    break;
                }
            }
        }
    });

    // Supervisor: owns the process.
    let super_shared = Arc::clone(&shared);
    let supervisor = tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => log::info!("{}: exited with {}", super_shared.name, status),
                    Err(e) => log::warn!("{}: wait failed: {}", super_shared.name, e),
                }
            }
            _ = kill_rx => {
                log::info!("{}: killing process", super_shared.name);
                if let Err(e) = child.kill().await {
                    log::warn!("{}: kill failed: {}", super_shared.name, e);
                }
            }
        }
        super_shared.state.set_exited();
        super_shared.mark_dead("process exited");
    });

    let _ = supervisor.await;
    // The stream may outlive the process (TCP); give the reader a moment.
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, read_task).await.is_err() {
        log::debug!("{}: reader still running after exit", shared.name);
    }
    write_task.abort();
}

fn handle_server_message(shared: &Shared, reply_tx: &mpsc::UnboundedSender<Outgoing>, value: Value) {
    match parse_message(&value) {
        Some(JsonRpcMessage::Response(resp)) => handle_response(shared, resp),
        Some(JsonRpcMessage::Notification(notif)) => handle_notification(shared, notif),
        Some(JsonRpcMessage::Request(req)) => {
            let reply = answer_server_request(&shared.client, &req);
            let _ = reply_tx.send(Outgoing::Message(reply));
        }
        None => log::debug!("{}: unrecognized message {}", shared.name, value),
    }
}

fn handle_response(shared: &Shared, resp: JsonRpcResponse) {
    let RequestId::Number(id) = resp.id else {
        log::debug!("{}: response with foreign id {:?}", shared.name, resp.id);
        return;
    };
    match resp.error {
        Some(error) => {
            shared.table.fail(
                id,
                Error::Backend {
                    code: error.code,
                    message: error.message,
                },
            );
        }
        None => {
            shared.table.resolve(id, resp.result.unwrap_or(Value::Null));
        }
    }
}

fn handle_notification(shared: &Shared, notif: JsonRpcNotification) {
    let notification = Notification {
        method: notif.method,
        params: notif.params.unwrap_or(Value::Null),
        received: Instant::now(),
    };
    if notification.method == "window/logMessage" {
        log::debug!(
            "{}: {}",
            shared.name,
            notification.params["message"].as_str().unwrap_or_default()
        );
    }
    if let Some(hook) = &shared.hook {
        hook(&notification);
    }
    shared.queue.push(notification);
}

/// Builds the reply to a server-initiated request.
pub fn answer_server_request(client: &ClientSettings, req: &JsonRpcRequest) -> JsonRpcMessage {
    let params = req.params.clone().unwrap_or(Value::Null);
    match req.method.as_str() {
        "workspace/configuration" => {
            let items = params["items"].as_array().cloned().unwrap_or_default();
            let answers: Vec<Value> = items
                .iter()
                .map(|item| match item["section"].as_str() {
                    Some(section) => section
                        .split('.')
                        .try_fold(&client.settings, |acc, key| acc.get(key))
                        .cloned()
                        .unwrap_or(Value::Null),
                    None => client.settings.clone(),
                })
                .collect();
            JsonRpcMessage::reply(req.id.clone(), Value::Array(answers))
        }
        "client/registerCapability"
        | "client/unregisterCapability"
        | "window/workDoneProgress/create" => JsonRpcMessage::reply(req.id.clone(), Value::Null),
        "workspace/workspaceFolders" => {
            let folders = crate::protocol::path_to_uri(&client.project_root)
                .map(|uri| {
                    json!([{
                        "uri": uri.as_str(),
                        "name": client.project_root.file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default(),
                    }])
                })
                .unwrap_or(Value::Null);
            JsonRpcMessage::reply(req.id.clone(), folders)
        }
        "workspace/applyEdit" => JsonRpcMessage::reply(req.id.clone(), json!({ "applied": false })),
        other => {
            log::debug!("Rejecting server request {}", other);
            JsonRpcMessage::reject(req.id.clone(), METHOD_NOT_FOUND, "Method not found")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: RequestId::Number(3),
            method: method.into(),
            params: Some(params),
        }
    }

    fn reply_value(message: JsonRpcMessage) -> Value {
        serde_json::to_value(message).unwrap()
    }

    #[test]
    fn test_configuration_sections() {
        let client = ClientSettings {
            settings: json!({ "rust-analyzer": { "cargo": { "features": "all" } } }),
            project_root: PathBuf::from("/proj"),
        };
        let reply = reply_value(answer_server_request(
            &client,
            &request(
                "workspace/configuration",
                json!({ "items": [
                    { "section": "rust-analyzer.cargo" },
                    { "section": "missing" },
                    {}
                ]}),
            ),
        ));
        assert_eq!(reply["result"][0], json!({ "features": "all" }));
        assert_eq!(reply["result"][1], Value::Null);
        assert_eq!(reply["result"][2], client.settings);
    }

    #[test]
    fn test_unknown_server_request_is_rejected() {
        let reply = reply_value(answer_server_request(
            &ClientSettings::default(),
            &request("custom/thing", json!({})),
        ));
        assert_eq!(reply["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(reply["id"], json!(3));
    }

    #[test]
    fn test_register_capability_gets_null_result() {
        let reply = reply_value(answer_server_request(
            &ClientSettings::default(),
            &request("client/registerCapability", json!({ "registrations": [] })),
        ));
        assert_eq!(reply["result"], Value::Null);
        assert!(reply.get("error").is_none());
    }

    #[test]
    fn test_workspace_folders() {
        let client = ClientSettings {
            settings: Value::Null,
            project_root: PathBuf::from("/work/proj"),
        };
        let reply = reply_value(answer_server_request(
            &client,
            &request("workspace/workspaceFolders", Value::Null),
        ));
        assert_eq!(reply["result"][0]["uri"], json!("file:///work/proj"));
        assert_eq!(reply["result"][0]["name"], json!("proj"));
    }

    #[test]
    fn test_lifecycle_errors() {
        assert!(matches!(
            ConnectionState::Starting.lifecycle_error(),
            Some(Error::ServerNotInitialized)
        ));
        assert!(matches!(
            ConnectionState::Dead.lifecycle_error(),
            Some(Error::ServerNotRunning)
        ));
        assert!(ConnectionState::Initialized.lifecycle_error().is_none());
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let spec = LaunchSpec {
            name: "missing".into(),
            cmdline: vec!["/definitely/not/a/server".into()],
            working_dir: std::env::temp_dir(),
            env: HashMap::new(),
            port: None,
            logfile: None,
            keep_logfile: false,
        };
        let result = Connection::start(
            spec,
            ClientSettings::default(),
            None,
        );
        assert!(matches!(result, Err(Error::ServerFailedToStart(_))));
    }
}

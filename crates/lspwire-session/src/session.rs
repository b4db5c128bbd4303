use std::io::{Read, Write};
use std::process::Child;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lspwire_frame::{
    FrameError, FrameReader, FrameWriter, Message, Notification, Request, RequestId, Response,
    ResponseError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{SessionConfig, CANCEL_REQUEST_METHOD};
use crate::error::{Result, SessionError};
use crate::handler::{invoke, Handler, HandlerRegistry, HandlerResult};
use crate::pending::{Completion, Deadline, PendingTable};
use crate::state::{SessionState, StateCell};

type BoxedReader = Box<dyn Read + Send>;
type BoxedWriter = Box<dyn Write + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// A JSON-RPC session over one pair of byte streams.
///
/// `Session` is a cheap handle; clones share the same connection, pending
/// table, and handler registry. One dispatch thread (spawned by
/// [`Session::start`]) reads incoming messages, routes responses to their
/// waiting callers, and runs handlers for incoming requests and
/// notifications in wire order. A second thread expires requests whose
/// deadline passes, whether or not a caller is waiting on them.
///
/// ```no_run
/// use std::process::{Command, Stdio};
/// use std::time::Duration;
///
/// use lspwire_session::Session;
/// use serde_json::json;
///
/// let mut child = Command::new("pyls")
///     .stdin(Stdio::piped())
///     .stdout(Stdio::piped())
///     .spawn()?;
/// let session = Session::from_child(&mut child)?;
/// session.start()?;
///
/// let version = session.request("version", Some(json!({})), Duration::from_secs(5))?;
/// println!("{version}");
///
/// session.shutdown();
/// child.wait()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

struct Shared {
    config: SessionConfig,
    state: Mutex<StateCell>,
    pending: PendingTable,
    handlers: HandlerRegistry,
    writer: Mutex<Option<FrameWriter<BoxedWriter>>>,
    reader: Mutex<Option<FrameReader<BoxedReader>>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    expiry: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Build a session with default configuration. Nothing is read until
    /// [`start`](Self::start).
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::with_config(reader, writer, SessionConfig::default())
    }

    /// Build a session with explicit configuration.
    pub fn with_config<R, W>(reader: R, writer: W, config: SessionConfig) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        let shared = Shared {
            pending: PendingTable::new(config.max_pending),
            state: Mutex::new(StateCell::new()),
            handlers: HandlerRegistry::default(),
            writer: Mutex::new(Some(FrameWriter::with_config(writer, config.frame.clone()))),
            reader: Mutex::new(Some(FrameReader::with_config(reader, config.frame.clone()))),
            dispatch: Mutex::new(None),
            expiry: Mutex::new(None),
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Build a session over a spawned child's stdout (incoming) and stdin
    /// (outgoing). Both must have been configured as `Stdio::piped()`.
    pub fn from_child(child: &mut Child) -> Result<Self> {
        Self::from_child_with_config(child, SessionConfig::default())
    }

    pub fn from_child_with_config(child: &mut Child, config: SessionConfig) -> Result<Self> {
        let stdout = child.stdout.take().ok_or(SessionError::MissingStdio("stdout"))?;
        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                child.stdout = Some(stdout);
                return Err(SessionError::MissingStdio("stdin"));
            }
        };
        debug!(pid = child.id(), "session attached to child process");
        Ok(Self::with_config(stdout, stdin, config))
    }

    /// Spawn the dispatch and expiry threads and move to `Running`.
    pub fn start(&self) -> Result<()> {
        let reader = {
            let mut state = lock(&self.shared.state);
            match state.current() {
                SessionState::Created => {}
                SessionState::Running => return Err(SessionError::AlreadyStarted),
                _ => return Err(SessionError::SessionClosed),
            }
            let Some(reader) = lock(&self.shared.reader).take() else {
                return Err(SessionError::AlreadyStarted);
            };
            state.set(SessionState::Running);
            reader
        };
        info!(state = %SessionState::Running, "session started");

        let shared = Arc::clone(&self.shared);
        let dispatch = thread::Builder::new()
            .name(self.shared.config.thread_name.clone())
            .spawn(move || dispatch_loop(shared, reader));
        match dispatch {
            Ok(handle) => *lock(&self.shared.dispatch) = Some(handle),
            Err(err) => {
                self.shared.fail(&format!("failed to spawn dispatch thread: {err}"));
                return Err(SessionError::Spawn(err));
            }
        }

        let shared = Arc::clone(&self.shared);
        let expiry = thread::Builder::new()
            .name(format!("{}-expiry", self.shared.config.thread_name))
            .spawn(move || expiry_loop(shared));
        match expiry {
            Ok(handle) => {
                *lock(&self.shared.expiry) = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.fail(&format!("failed to spawn expiry thread: {err}"));
                Err(SessionError::Spawn(err))
            }
        }
    }

    /// Send a request and block until its response, the timeout, or the end
    /// of the session.
    ///
    /// Must not be called from inside a handler: the response could only be
    /// delivered by the dispatch thread that the handler is blocking.
    pub fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value> {
        self.send_request(method, params, Some(timeout))?.wait()
    }

    /// Typed variant of [`request`](Self::request).
    pub fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = match serde_json::to_value(params)? {
            Value::Null => None,
            value => Some(value),
        };
        let result = self.request(method, params, timeout)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Send a request without waiting for the response.
    ///
    /// The returned handle resolves exactly once. `timeout` is measured from
    /// now; `None` waits until a response or the end of the session. Once
    /// the deadline passes the request is removed and resolves with
    /// `Timeout` even if nobody is waiting, and a later response is dropped.
    pub fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<PendingRequest> {
        self.shared.ensure_running()?;

        let deadline = timeout.map(Deadline::after);
        let (id, rx) = self.shared.pending.register(method, deadline)?;
        let message = Message::request(id.clone(), method, params);

        if let Err(err) = self.shared.write(&message) {
            self.shared.pending.remove(&id);
            return Err(err);
        }
        debug!(id = %id, method, "request sent");

        Ok(PendingRequest {
            id,
            method: method.to_string(),
            rx,
            deadline,
            shared: Arc::clone(&self.shared),
            settled: false,
        })
    }

    /// Send a notification. Nothing is returned by the peer.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.shared.ensure_running()?;
        self.shared.write(&Message::notification(method, params))?;
        debug!(method, "notification sent");
        Ok(())
    }

    /// Register the handler for incoming requests and notifications named
    /// exactly `method`. A later registration replaces an earlier one.
    pub fn register_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        let method = method.into();
        if self.shared.handlers.register(method.clone(), handler) {
            debug!(method = %method, "handler replaced");
        }
    }

    /// Remove a handler. Returns whether one was registered.
    pub fn unregister_handler(&self, method: &str) -> bool {
        self.shared.handlers.unregister(method)
    }

    /// Stop the session.
    ///
    /// Every outstanding request resolves with `SessionClosed` before this
    /// returns, new requests are refused, and the outgoing stream is
    /// dropped so the peer sees end of input. Idempotent.
    ///
    /// The incoming stream is not closed here. A started session's dispatch
    /// thread stays blocked in `read` until the peer closes its side, then
    /// releases the reader; use [`join`](Self::join) to wait for that. A
    /// session that was never started drops its reader immediately.
    ///
    /// Dropping every `Session` handle without calling this leaves the
    /// outgoing stream open, so a child worker never sees end of input.
    pub fn shutdown(&self) {
        let was_created = {
            let mut state = lock(&self.shared.state);
            let current = state.current();
            match current {
                SessionState::Created | SessionState::Running => {
                    state.set(SessionState::ShuttingDown);
                    current == SessionState::Created
                }
                _ => return,
            }
        };
        info!(state = %SessionState::ShuttingDown, "session shutting down");

        let drained = self.shared.pending.close();
        if !drained.is_empty() {
            debug!(count = drained.len(), "resolving pending requests with session closed");
        }
        for (_, entry) in drained {
            entry.complete(Err(SessionError::SessionClosed));
        }

        lock(&self.shared.writer).take();
        if was_created {
            lock(&self.shared.reader).take();
        }

        lock(&self.shared.state).set(SessionState::Closed);
        info!(state = %SessionState::Closed, "session closed");
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared.state).current()
    }

    /// Receive every state transition from now on. The stream ends once the
    /// session reaches `Closed` or `Failed`.
    pub fn subscribe(&self) -> Receiver<SessionState> {
        lock(&self.shared.state).subscribe()
    }

    /// Ids of requests still waiting for a response.
    pub fn pending_ids(&self) -> Vec<RequestId> {
        self.shared.pending.ids()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Wait for the session's threads to finish.
    ///
    /// The dispatch thread ends when the incoming stream reaches end of
    /// input, so this blocks until the peer closes its side.
    pub fn join(&self) {
        let dispatch = lock(&self.shared.dispatch).take();
        if let Some(handle) = dispatch {
            if handle.join().is_err() {
                warn!("dispatch thread panicked");
            }
        }
        let expiry = lock(&self.shared.expiry).take();
        if let Some(handle) = expiry {
            if handle.join().is_err() {
                warn!("expiry thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("pending", &self.shared.pending.len())
            .finish()
    }
}

/// Handle to one outstanding request.
///
/// Dropping the handle before it resolves cancels the request.
pub struct PendingRequest {
    id: RequestId,
    method: String,
    rx: Receiver<Completion>,
    deadline: Option<Deadline>,
    shared: Arc<Shared>,
    settled: bool,
}

impl PendingRequest {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Block until the request resolves.
    pub fn wait(mut self) -> Result<Value> {
        let outcome = match self.deadline {
            Some(deadline) => {
                let remaining = deadline.at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    self.expire(deadline)
                } else {
                    match self.rx.recv_timeout(remaining) {
                        Ok(outcome) => outcome,
                        Err(RecvTimeoutError::Timeout) => self.expire(deadline),
                        Err(RecvTimeoutError::Disconnected) => Err(SessionError::SessionClosed),
                    }
                }
            }
            None => self.rx.recv().unwrap_or(Err(SessionError::SessionClosed)),
        };
        self.settled = true;
        outcome
    }

    /// Poll without blocking. Returns `None` while the request is still
    /// outstanding and after the outcome has been taken once.
    pub fn try_result(&mut self) -> Option<Result<Value>> {
        if self.settled {
            return None;
        }
        let outcome = match self.deadline {
            Some(deadline) if deadline.has_passed(Instant::now()) => self.expire(deadline),
            _ => match self.rx.try_recv() {
                Ok(outcome) => outcome,
                Err(TryRecvError::Disconnected) => Err(SessionError::SessionClosed),
                Err(TryRecvError::Empty) => return None,
            },
        };
        self.settled = true;
        Some(outcome)
    }

    /// Cancel the request. Returns `false` when it had already resolved.
    ///
    /// A later `wait()` yields `Cancelled`; a response that still arrives is
    /// dropped as unknown.
    pub fn cancel(&self) -> bool {
        self.shared.cancel(&self.id)
    }

    /// The deadline passed. Whoever removed the entry decided the outcome:
    /// a response that arrived in time wins, otherwise it is `Timeout`.
    fn expire(&self, deadline: Deadline) -> Completion {
        match self.shared.pending.remove(&self.id) {
            Some(_) => Err(timed_out(&self.id, &self.method, deadline.timeout)),
            None => self.rx.recv().unwrap_or(Err(SessionError::SessionClosed)),
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.cancel(&self.id);
        }
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .finish()
    }
}

impl Shared {
    fn state(&self) -> SessionState {
        lock(&self.state).current()
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state() {
            SessionState::Running => Ok(()),
            _ => Err(SessionError::SessionClosed),
        }
    }

    /// Serialize and write one message under the writer lock.
    fn write(&self, message: &Message) -> Result<()> {
        let failure = {
            let mut guard = lock(&self.writer);
            let Some(writer) = guard.as_mut() else {
                return Err(SessionError::SessionClosed);
            };
            match writer.write(message) {
                Ok(()) => return Ok(()),
                Err(err @ (FrameError::PayloadTooLarge { .. } | FrameError::Json(_))) => {
                    return Err(SessionError::Protocol(err));
                }
                Err(err) => err.to_string(),
            }
        };
        self.fail(&failure);
        Err(SessionError::Stream(failure))
    }

    /// `Running -> Failed`: resolve every pending request with a stream
    /// error and drop the writer. No-op in any other state.
    fn fail(&self, reason: &str) {
        {
            let mut state = lock(&self.state);
            if state.current() != SessionState::Running {
                return;
            }
            state.set(SessionState::Failed);
        }
        error!(state = %SessionState::Failed, error = reason, "session failed");

        for (_, entry) in self.pending.close() {
            entry.complete(Err(SessionError::Stream(reason.to_string())));
        }
        lock(&self.writer).take();
    }

    fn cancel(&self, id: &RequestId) -> bool {
        let Some(entry) = self.pending.remove(id) else {
            return false;
        };
        debug!(id = %id, method = entry.method(), "request cancelled");
        entry.complete(Err(SessionError::Cancelled { id: id.clone() }));

        if self.config.send_cancel_notifications && self.state() == SessionState::Running {
            let notice = Message::notification(CANCEL_REQUEST_METHOD, Some(json!({ "id": id })));
            if let Err(err) = self.write(&notice) {
                warn!(id = %id, error = %err, "failed to send cancel notification");
            }
        }
        true
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::Request(request) => self.handle_request(request),
            Message::Response(response) => self.handle_response(response),
            Message::Notification(notification) => self.handle_notification(notification),
        }
    }

    fn handle_request(&self, request: Request) {
        let Request { id, method, params } = request;
        debug!(id = %id, method = %method, "incoming request");

        let reply = match self.handlers.get(&method) {
            Some(handler) => match invoke(handler.as_ref(), params) {
                Ok(result) => Response::ok(id, result),
                Err(err) => {
                    warn!(id = %id, method = %method, error = %err, "request handler failed");
                    Response::error(id, err.into())
                }
            },
            None => {
                debug!(id = %id, method = %method, "no handler for request; replying method not found");
                Response::error(id, ResponseError::method_not_found(&method))
            }
        };

        if let Err(err) = self.write(&Message::Response(reply)) {
            warn!(method = %method, error = %err, "failed to send response");
        }
    }

    fn handle_response(&self, response: Response) {
        let Response { id, outcome } = response;
        let Some(entry) = self.pending.remove(&id) else {
            warn!(id = %id, "response for unknown request id; dropping");
            return;
        };
        match entry.deadline() {
            Some(deadline) if deadline.has_passed(Instant::now()) => {
                debug!(id = %id, "response arrived after its deadline; dropping");
                let err = timed_out(&id, entry.method(), deadline.timeout);
                entry.complete(Err(err));
            }
            _ => {
                debug!(id = %id, method = entry.method(), ok = outcome.is_ok(), "response received");
                entry.complete(outcome.map_err(SessionError::Remote));
            }
        }
    }

    fn handle_notification(&self, notification: Notification) {
        let Notification { method, params } = notification;
        match self.handlers.get(&method) {
            Some(handler) => {
                debug!(method = %method, "incoming notification");
                if let Err(err) = invoke(handler.as_ref(), params) {
                    warn!(method = %method, error = %err, "notification handler failed");
                }
            }
            None => warn!(method = %method, "no handler for notification; dropping"),
        }
    }
}

fn timed_out(id: &RequestId, method: &str, timeout: Duration) -> SessionError {
    warn!(id = %id, method, ?timeout, "request timed out");
    SessionError::Timeout {
        id: id.clone(),
        timeout,
    }
}

/// Resolves overdue requests with `Timeout`. Ends when the pending table
/// closes on shutdown or failure.
fn expiry_loop(shared: Arc<Shared>) {
    debug!("expiry loop started");
    while let Some(expired) = shared.pending.wait_expired() {
        for (id, entry) in expired {
            let timeout = entry.deadline().map(|d| d.timeout).unwrap_or_default();
            let err = timed_out(&id, entry.method(), timeout);
            entry.complete(Err(err));
        }
    }
    debug!("expiry loop finished");
}

/// Single consumer of the incoming stream.
fn dispatch_loop(shared: Arc<Shared>, mut reader: FrameReader<BoxedReader>) {
    debug!("dispatch loop started");
    loop {
        match reader.read_message() {
            Ok(Some(message)) => match shared.state() {
                SessionState::Running => shared.dispatch(message),
                SessionState::Failed => break,
                state => debug!(%state, method = ?message.method(), "discarding message after shutdown"),
            },
            Ok(None) => {
                shared.fail("stream closed by peer");
                break;
            }
            Err(err) if !err.is_fatal() => {
                warn!(error = %err, "dropping malformed message");
            }
            Err(err) => {
                shared.fail(&err.to_string());
                break;
            }
        }
    }
    debug!(state = %shared.state(), "dispatch loop finished");
}

//! # CONNECTION ENGINE
//!
//! Owns the handshake and steady-state state machine, running on a single
//! dedicated thread per connection. Everything else (callers of
//! `request_response`/`fire_event`, detached dispatch threads) only ever
//! touches `Connection` through `Arc<Connection>`.

use std::io;
use std::net::TcpStream;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::classify::{classify, Delivery, Disposition};
use crate::config::ParameterSettings;
use crate::correlator::Correlator;
use crate::error::EpoxyError;
use crate::hooks::{
    ConnectArgs, DisconnectArgs, LayerStack, ListenerHooks, MessageContext, MetricsSink,
    ReceiveContext, ServiceHost,
};
use crate::message::{
    ConnectionMetrics, ConnectionShutdownReason, ConversationIdAllocator, EpoxyHeaders,
    ErrorRecord, Message, PayloadType, ProtocolError, ProtocolErrorCode, Role,
};
use crate::socket::SocketAdapter;
use crate::wire::{Frame, Framelet, FrameletType, FramingError};

/// ## CONNECTION STATE
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Created,
    ClientSendConfig,
    ClientExpectConfig,
    ServerExpectConfig,
    ServerSendConfig,
    Connected,
    SendProtocolError,
    Disconnecting,
    Disconnected,
}

impl ConnectionState {
    fn name(self) -> &'static str {
        match self {
            ConnectionState::Created => "Created",
            ConnectionState::ClientSendConfig => "ClientSendConfig",
            ConnectionState::ClientExpectConfig => "ClientExpectConfig",
            ConnectionState::ServerExpectConfig => "ServerExpectConfig",
            ConnectionState::ServerSendConfig => "ServerSendConfig",
            ConnectionState::Connected => "Connected",
            ConnectionState::SendProtocolError => "SendProtocolError",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

/// Bundles the collaborators a `Connection` needs but doesn't own the
/// lifecycle of, plus the tunables from [`ParameterSettings`]. Kept as a
/// single struct (rather than a builder) because every field is required —
/// there's no partially-built `Connection`.
pub struct ConnectionOptions {
    pub service_host: Arc<dyn ServiceHost>,
    pub layer_stack: Arc<dyn LayerStack>,
    pub listener: Option<Arc<dyn ListenerHooks>>,
    pub metrics_sink: Arc<dyn MetricsSink>,
    pub parameters: ParameterSettings,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            service_host: Arc::new(crate::hooks::NoopServiceHost),
            layer_stack: Arc::new(crate::hooks::NoopLayerStack),
            listener: None,
            metrics_sink: Arc::new(crate::hooks::TracingMetricsSink),
            parameters: ParameterSettings::default(),
        }
    }
}

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_connection_id() -> String {
    let ordinal = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("epoxy-{}-{ordinal}", since_epoch.as_nanos())
}

/// ## CONNECTION
///
/// One TCP connection, one engine thread, one set of pending requests. Always
/// held behind an `Arc` so the engine thread, the caller, and detached
/// dispatch threads can all outlive any single stack frame.
pub struct Connection {
    role: Role,
    connection_id: String,
    local_endpoint: String,
    remote_endpoint: String,
    socket: SocketAdapter,
    state: Mutex<ConnectionState>,
    cancel: AtomicBool,
    correlator: Correlator,
    conversation_ids: ConversationIdAllocator,
    service_host: Arc<dyn ServiceHost>,
    layer_stack: Arc<dyn LayerStack>,
    listener: Option<Arc<dyn ListenerHooks>>,
    metrics_sink: Arc<dyn MetricsSink>,
    parameters: ParameterSettings,
    protocol_error_code: Mutex<Option<ProtocolErrorCode>>,
    error_details: Mutex<Option<ErrorRecord>>,
    peer_reported_error: Mutex<Option<ProtocolError>>,
    shutdown_reason: Mutex<ConnectionShutdownReason>,
    transport_error: Mutex<Option<(io::ErrorKind, String)>>,
    started_at: Instant,
    start_signal: Mutex<Option<oneshot::Sender<Result<(), EpoxyError>>>>,
    engine_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

enum ReadOutcome {
    Frame(Frame),
    Eof,
    Error(FramingError),
}

impl Connection {
    /// Wraps an already-connected `TcpStream` as a `Connection` in the
    /// `Created` state. Does not start the engine thread; call [`Self::start`]
    /// for that.
    pub fn new(
        stream: TcpStream,
        role: Role,
        options: ConnectionOptions,
    ) -> io::Result<Arc<Self>> {
        let local_endpoint = stream.local_addr().map(|a| a.to_string()).unwrap_or_default();
        let remote_endpoint = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
        let socket = SocketAdapter::new(stream)?;
        Ok(Arc::new(Self {
            role,
            connection_id: generate_connection_id(),
            local_endpoint,
            remote_endpoint,
            socket,
            state: Mutex::new(ConnectionState::Created),
            cancel: AtomicBool::new(false),
            correlator: Correlator::new(),
            conversation_ids: ConversationIdAllocator::for_role(role),
            service_host: options.service_host,
            layer_stack: options.layer_stack,
            listener: options.listener,
            metrics_sink: options.metrics_sink,
            parameters: options.parameters,
            protocol_error_code: Mutex::new(None),
            error_details: Mutex::new(None),
            peer_reported_error: Mutex::new(None),
            shutdown_reason: Mutex::new(ConnectionShutdownReason::Unknown),
            transport_error: Mutex::new(None),
            started_at: Instant::now(),
            start_signal: Mutex::new(None),
            engine_thread: Mutex::new(None),
        }))
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.current_state()
    }

    /// ### START
    ///
    /// Spawns the engine thread and blocks until the handshake concludes,
    /// either into `Connected` (`Ok`) or into `Disconnected` without ever
    /// reaching `Connected` (`Err`).
    pub fn start(self: &Arc<Self>) -> Result<(), EpoxyError> {
        let (tx, rx) = oneshot::channel();
        *self.start_signal.lock().unwrap() = Some(tx);

        let engine = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("epoxy-engine-{}", self.connection_id))
            .spawn(move || engine.run())
            .expect("failed to spawn engine thread");
        *self.engine_thread.lock().unwrap() = Some(handle);

        rx.recv().unwrap_or(Err(EpoxyError::Disconnected))
    }

    /// ### STOP
    ///
    /// Requests teardown and blocks until the engine thread has fully
    /// finished (metrics emitted, `on_disconnected` called). Safe to call
    /// before `start()`, and safe to call more than once.
    pub fn stop(self: &Arc<Self>) -> Result<(), EpoxyError> {
        self.cancel.store(true, Ordering::SeqCst);
        self.socket.shutdown();
        let handle = self.engine_thread.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        Ok(())
    }

    /// ### REQUEST RESPONSE
    pub fn request_response(
        self: &Arc<Self>,
        method_name: &str,
        message: Message,
    ) -> Result<Message, EpoxyError> {
        self.ensure_state(ConnectionState::Connected)?;
        let conversation_id = self.allocate_conversation_id()?;
        let ctx = self.message_context(conversation_id);

        let layer_blob = match self.layer_stack.on_send(PayloadType::Request, &ctx) {
            Ok(blob) => blob,
            Err(error_record) => return Ok(Message::Error(error_record)),
        };

        let (error_code, body) = encode_message(&message);
        let headers = EpoxyHeaders {
            conversation_id,
            payload_type: PayloadType::Request,
            method_name: method_name.to_string(),
            error_code,
        };
        let frame = build_frame(headers, layer_blob, body);

        let receiver = self.correlator.add(conversation_id);
        if let Err(io_error) = self.write_frame_raw(frame) {
            self.correlator
                .complete(conversation_id, Message::Error(ErrorRecord::transport_closed()));
            return Err(EpoxyError::Transport(io_error));
        }

        match self.parameters.request_timeout {
            Some(timeout) => match receiver.recv_timeout(timeout) {
                Ok(message) => Ok(message),
                Err(_) => {
                    self.correlator.remove(conversation_id);
                    Err(EpoxyError::Timeout)
                }
            },
            None => receiver.recv().map_err(|_| EpoxyError::Disconnected),
        }
    }

    /// ### FIRE EVENT
    pub fn fire_event(self: &Arc<Self>, method_name: &str, message: Message) -> Result<(), EpoxyError> {
        self.ensure_state(ConnectionState::Connected)?;
        let conversation_id = self.allocate_conversation_id()?;
        let ctx = self.message_context(conversation_id);

        let layer_blob = match self.layer_stack.on_send(PayloadType::Event, &ctx) {
            Ok(blob) => blob,
            Err(error_record) => {
                tracing::debug!(
                    conversation_id,
                    error = %error_record.message,
                    "event abandoned by layer stack before it reached the wire"
                );
                return Ok(());
            }
        };

        let (error_code, body) = encode_message(&message);
        let headers = EpoxyHeaders {
            conversation_id,
            payload_type: PayloadType::Event,
            method_name: method_name.to_string(),
            error_code,
        };
        let frame = build_frame(headers, layer_blob, body);
        self.write_frame_raw(frame).map_err(EpoxyError::Transport)
    }

    fn message_context(&self, conversation_id: u64) -> MessageContext {
        MessageContext {
            connection_id: self.connection_id.clone(),
            conversation_id,
        }
    }

    fn allocate_conversation_id(&self) -> Result<u64, EpoxyError> {
        self.conversation_ids.allocate().ok_or_else(|| {
            self.protocol_error_code
                .lock()
                .unwrap()
                .get_or_insert(ProtocolErrorCode::InternalError);
            EpoxyError::ConversationIdsExhausted
        })
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn ensure_state(&self, expected: ConnectionState) -> Result<(), EpoxyError> {
        if self.current_state() == expected {
            Ok(())
        } else {
            Err(EpoxyError::WrongState {
                expected: expected.name(),
            })
        }
    }

    fn set_state(&self, new: ConnectionState) {
        *self.state.lock().unwrap() = new;
        tracing::debug!(connection_id = %self.connection_id, state = new.name(), "state transition");
        if new == ConnectionState::Connected {
            if let Err(error) = self.socket.set_read_timeout(None) {
                tracing::warn!(connection_id = %self.connection_id, %error, "failed to clear handshake read timeout");
            }
            self.fire_start_signal(Ok(()));
        }
    }

    fn fire_start_signal(&self, result: Result<(), EpoxyError>) {
        if let Some(tx) = self.start_signal.lock().unwrap().take() {
            let _ = tx.send(result);
        }
    }

    fn write_frame_raw(&self, frame: Frame) -> io::Result<()> {
        let mut guard = self.socket.lock_write();
        crate::wire::write_frame(&mut *guard, &frame)
    }

    fn read_one_frame(&self) -> ReadOutcome {
        let mut guard = self.socket.lock_read();
        match crate::wire::read_frame(&mut *guard, self.parameters.max_framelet_len) {
            Ok(Some(frame)) => ReadOutcome::Frame(frame),
            Ok(None) => ReadOutcome::Eof,
            Err(error) => ReadOutcome::Error(error),
        }
    }

    fn mark_local_error(&self, code: ProtocolErrorCode) {
        self.protocol_error_code.lock().unwrap().get_or_insert(code);
    }

    fn classify_framing_error(&self, error: FramingError) -> ConnectionState {
        tracing::warn!(connection_id = %self.connection_id, %error, "framing error");
        match error {
            FramingError::Io(io_error) => {
                *self.transport_error.lock().unwrap() = Some((io_error.kind(), io_error.to_string()));
                ConnectionState::Disconnecting
            }
            FramingError::Truncated { .. } | FramingError::FrameletTooLarge { .. } => {
                self.mark_local_error(ProtocolErrorCode::MalformedData);
                ConnectionState::SendProtocolError
            }
        }
    }

    /// The engine thread's body. Runs the handshake table and then the
    /// steady-state loop until it reaches `Disconnected`, at which point
    /// teardown bookkeeping (metrics, resolving `start`/`stop`) happens and
    /// the thread exits.
    fn run(self: Arc<Self>) {
        if let Err(error) = self.socket.set_read_timeout(Some(self.parameters.handshake_timeout)) {
            tracing::warn!(connection_id = %self.connection_id, %error, "failed to arm handshake read timeout");
        }

        let initial = match self.role {
            Role::Client => ConnectionState::ClientSendConfig,
            Role::Server => ConnectionState::Created,
        };
        self.set_state(initial);

        loop {
            let current = self.current_state();
            if current == ConnectionState::Disconnected {
                self.finish();
                break;
            }
            let next = match current {
                ConnectionState::Created => self.step_created(),
                ConnectionState::ClientSendConfig => self.step_client_send_config(),
                ConnectionState::ClientExpectConfig => self.step_expect_config(),
                ConnectionState::ServerExpectConfig => self.step_expect_config(),
                ConnectionState::ServerSendConfig => self.step_server_send_config(),
                ConnectionState::Connected => self.step_connected(),
                ConnectionState::SendProtocolError => self.step_send_protocol_error(),
                ConnectionState::Disconnecting => self.step_disconnecting(),
                ConnectionState::Disconnected => unreachable!("handled above"),
            };
            self.set_state(next);
        }
    }

    fn step_created(&self) -> ConnectionState {
        let args = ConnectArgs {
            connection_id: self.connection_id.clone(),
            remote_endpoint: self.remote_endpoint.clone(),
        };
        let rejection = self.listener.as_ref().and_then(|l| l.on_connected(&args));
        match rejection {
            None => ConnectionState::ServerExpectConfig,
            Some(details) => {
                self.mark_local_error(ProtocolErrorCode::ConnectionRejected);
                *self.error_details.lock().unwrap() = Some(details);
                ConnectionState::SendProtocolError
            }
        }
    }

    fn step_client_send_config(&self) -> ConnectionState {
        match self.write_frame_raw(vec![Framelet::new(FrameletType::EpoxyConfig, vec![])]) {
            Ok(()) => ConnectionState::ClientExpectConfig,
            Err(_) => {
                self.mark_local_error(ProtocolErrorCode::InternalError);
                ConnectionState::Disconnecting
            }
        }
    }

    fn step_server_send_config(&self) -> ConnectionState {
        match self.write_frame_raw(vec![Framelet::new(FrameletType::EpoxyConfig, vec![])]) {
            Ok(()) => ConnectionState::Connected,
            Err(_) => {
                self.mark_local_error(ProtocolErrorCode::InternalError);
                ConnectionState::Disconnecting
            }
        }
    }

    /// Shared body for `ClientExpectConfig` and `ServerExpectConfig`:
    /// `ProcessConfig` advances the handshake, a peer `ProtocolError` is
    /// remembered as the handshake rejection, and anything else is a local
    /// protocol violation.
    fn step_expect_config(&self) -> ConnectionState {
        match self.read_one_frame() {
            ReadOutcome::Eof => ConnectionState::Disconnecting,
            ReadOutcome::Error(error) => self.classify_framing_error(error),
            ReadOutcome::Frame(frame) => match classify(frame) {
                Disposition::ProcessConfig => match self.role {
                    Role::Client => ConnectionState::Connected,
                    Role::Server => ConnectionState::ServerSendConfig,
                },
                Disposition::HandleProtocolError(error) => {
                    *self.peer_reported_error.lock().unwrap() = Some(error);
                    ConnectionState::Disconnecting
                }
                _ => {
                    self.mark_local_error(ProtocolErrorCode::ProtocolViolated);
                    ConnectionState::SendProtocolError
                }
            },
        }
    }

    fn step_connected(self: &Arc<Self>) -> ConnectionState {
        if self.cancel.load(Ordering::SeqCst) {
            return ConnectionState::Disconnecting;
        }
        match self.read_one_frame() {
            ReadOutcome::Eof => ConnectionState::Disconnecting,
            ReadOutcome::Error(error) => self.classify_framing_error(error),
            ReadOutcome::Frame(frame) => self.handle_disposition(classify(frame)),
        }
    }

    fn handle_disposition(self: &Arc<Self>, disposition: Disposition) -> ConnectionState {
        match disposition {
            Disposition::ProcessConfig => {
                self.mark_local_error(ProtocolErrorCode::InternalError);
                ConnectionState::SendProtocolError
            }
            Disposition::DeliverRequest(delivery) => self.handle_inbound(delivery, PayloadType::Request),
            Disposition::DeliverResponse(delivery) => self.handle_response(delivery),
            Disposition::DeliverEvent(delivery) => self.handle_inbound(delivery, PayloadType::Event),
            Disposition::SendProtocolError(code) => {
                self.mark_local_error(code);
                ConnectionState::SendProtocolError
            }
            Disposition::HandleProtocolError(error) => {
                *self.peer_reported_error.lock().unwrap() = Some(error);
                ConnectionState::Disconnecting
            }
            Disposition::HangUp => ConnectionState::Disconnecting,
        }
    }

    /// Dispatches a request or event to the service host on a detached
    /// thread: the receive loop never blocks on handler code, and a handler
    /// panic is isolated with `catch_unwind` rather than tearing down the
    /// connection.
    fn handle_inbound(self: &Arc<Self>, delivery: Delivery, kind: PayloadType) -> ConnectionState {
        if !delivery.headers.is_ok() {
            self.mark_local_error(ProtocolErrorCode::ProtocolViolated);
            return ConnectionState::SendProtocolError;
        }

        let conversation_id = delivery.headers.conversation_id;
        let method_name = delivery.headers.method_name.clone();
        let ctx = self.message_context(conversation_id);
        let layer_result = self.layer_stack.on_receive(kind, &ctx, delivery.layer_data.as_deref());
        let engine = Arc::clone(self);

        thread::spawn(move || {
            let message = match layer_result {
                Err(error_record) => Message::Error(error_record),
                Ok(()) => Message::payload(delivery.payload),
            };
            let metrics = engine.metrics_snapshot();
            match kind {
                PayloadType::Request => {
                    let response = catch_unwind(AssertUnwindSafe(|| {
                        engine.service_host.dispatch_request(&method_name, &ctx, message, &metrics)
                    }))
                    .unwrap_or_else(|_| {
                        Message::Error(ErrorRecord::internal_server_error(format!(
                            "dispatch_request panicked for method {method_name:?}"
                        )))
                    });
                    engine.send_response(conversation_id, response);
                }
                PayloadType::Event => {
                    if catch_unwind(AssertUnwindSafe(|| {
                        engine.service_host.dispatch_event(&method_name, &ctx, message, &metrics);
                    }))
                    .is_err()
                    {
                        tracing::error!(method_name, "dispatch_event panicked");
                    }
                }
                PayloadType::Response => unreachable!("handle_inbound is never called for responses"),
            }
        });

        ConnectionState::Connected
    }

    fn send_response(&self, conversation_id: u64, message: Message) {
        let ctx = self.message_context(conversation_id);
        let (error_code, body) = encode_message(&message);
        let layer_blob = match self.layer_stack.on_send(PayloadType::Response, &ctx) {
            Ok(blob) => blob,
            Err(error_record) => {
                tracing::warn!(
                    conversation_id,
                    error = %error_record.message,
                    "on_send rejected a response, sending without layer data"
                );
                None
            }
        };
        let headers = EpoxyHeaders {
            conversation_id,
            payload_type: PayloadType::Response,
            method_name: String::new(),
            error_code,
        };
        let frame = build_frame(headers, layer_blob, body);
        if let Err(error) = self.write_frame_raw(frame) {
            tracing::warn!(conversation_id, %error, "failed to write response frame");
        }
    }

    fn handle_response(&self, delivery: Delivery) -> ConnectionState {
        let ctx = self.message_context(delivery.headers.conversation_id);
        let message = if delivery.headers.is_ok() {
            Message::payload(delivery.payload)
        } else {
            match ErrorRecord::decode(&delivery.payload) {
                Ok(record) => Message::Error(record),
                Err(_) => Message::Error(ErrorRecord::new(
                    delivery.headers.error_code,
                    "response carried an unparseable error payload",
                )),
            }
        };
        let message = match self
            .layer_stack
            .on_receive(PayloadType::Response, &ctx, delivery.layer_data.as_deref())
        {
            Ok(()) => message,
            Err(error_record) => Message::Error(error_record),
        };
        self.correlator.complete(delivery.headers.conversation_id, message);
        ConnectionState::Connected
    }

    fn step_send_protocol_error(&self) -> ConnectionState {
        let code = self
            .protocol_error_code
            .lock()
            .unwrap()
            .unwrap_or(ProtocolErrorCode::InternalError);
        let details = self.error_details.lock().unwrap().clone();
        let frame = vec![Framelet::new(
            FrameletType::ProtocolError,
            ProtocolError::new(code, details).encode(),
        )];
        if let Err(error) = self.write_frame_raw(frame) {
            tracing::debug!(connection_id = %self.connection_id, %error, "best-effort protocol error write failed");
        }
        ConnectionState::Disconnecting
    }

    fn step_disconnecting(&self) -> ConnectionState {
        self.socket.shutdown();
        if let Role::Server = self.role {
            if let Some(listener) = &self.listener {
                let args = DisconnectArgs {
                    connection_id: self.connection_id.clone(),
                    error_details: self.error_details.lock().unwrap().clone(),
                };
                listener.on_disconnected(&args);
            }
        }
        self.correlator.shutdown();
        ConnectionState::Disconnected
    }

    fn finish(&self) {
        let shutdown_reason = self.compute_shutdown_reason();
        *self.shutdown_reason.lock().unwrap() = shutdown_reason;
        self.fire_start_signal(self.compute_start_result());

        let metrics = ConnectionMetrics {
            connection_id: self.connection_id.clone(),
            local_endpoint: self.local_endpoint.clone(),
            remote_endpoint: self.remote_endpoint.clone(),
            shutdown_reason,
            duration_millis: self.started_at.elapsed().as_millis() as u64,
        };
        self.metrics_sink.record(metrics);
    }

    /// Only consulted by `finish()` when `start()`'s promise is still
    /// unresolved, i.e. the handshake never reached `Connected`.
    fn compute_start_result(&self) -> Result<(), EpoxyError> {
        if let Some(error) = self.peer_reported_error.lock().unwrap().clone() {
            return Err(EpoxyError::HandshakeRejected { details: error.details });
        }
        if let Some(code) = *self.protocol_error_code.lock().unwrap() {
            return Err(EpoxyError::ProtocolViolation { code });
        }
        if let Some((kind, message)) = self.transport_error.lock().unwrap().clone() {
            return Err(EpoxyError::Transport(io::Error::new(kind, message)));
        }
        Err(EpoxyError::Disconnected)
    }

    /// `ClientProtocolError` is the only protocol-violation variant the
    /// shutdown-reason enum offers (see DESIGN.md); it is reported regardless
    /// of which role actually detected the violation.
    fn compute_shutdown_reason(&self) -> ConnectionShutdownReason {
        if let Some(code) = *self.protocol_error_code.lock().unwrap() {
            return match code {
                ProtocolErrorCode::ConnectionRejected => ConnectionShutdownReason::ServerGraceful,
                _ => ConnectionShutdownReason::ClientProtocolError,
            };
        }
        if let Some(error) = self.peer_reported_error.lock().unwrap().as_ref() {
            return match error.error_code {
                ProtocolErrorCode::ConnectionRejected => ConnectionShutdownReason::ServerGraceful,
                ProtocolErrorCode::InternalError => ConnectionShutdownReason::ServiceInternalError,
                _ => ConnectionShutdownReason::ClientProtocolError,
            };
        }
        if self.cancel.load(Ordering::SeqCst) {
            return match self.role {
                Role::Client => ConnectionShutdownReason::ClientGraceful,
                Role::Server => ConnectionShutdownReason::ServerGraceful,
            };
        }
        ConnectionShutdownReason::NetworkError
    }

    fn metrics_snapshot(&self) -> ConnectionMetrics {
        ConnectionMetrics {
            connection_id: self.connection_id.clone(),
            local_endpoint: self.local_endpoint.clone(),
            remote_endpoint: self.remote_endpoint.clone(),
            shutdown_reason: ConnectionShutdownReason::Unknown,
            duration_millis: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

fn encode_message(message: &Message) -> (i32, Vec<u8>) {
    match message {
        Message::Payload(bytes) => (0, bytes.clone()),
        Message::Error(error) => (error.error_code, error.encode()),
    }
}

fn build_frame(headers: EpoxyHeaders, layer_blob: Option<Vec<u8>>, payload: Vec<u8>) -> Frame {
    let mut frame = vec![Framelet::new(FrameletType::EpoxyHeaders, headers.encode())];
    if let Some(blob) = layer_blob {
        frame.push(Framelet::new(FrameletType::LayerData, blob));
    }
    frame.push(Framelet::new(FrameletType::PayloadData, payload));
    frame
}

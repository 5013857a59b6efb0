//! # EXTERNAL COLLABORATORS
//!
//! Trait seams for the pieces this crate explicitly does not own: the service
//! host that dispatches inbound requests/events, the layer stack applied on
//! send/receive, the server-role listener hooks, and the metrics sink. None of
//! these are implemented here beyond a `NoopServiceHost`/`NoopLayerStack` used
//! by tests and by callers with nothing to plug in.

use crate::message::{ConnectionMetrics, ErrorRecord, Message, PayloadType};

/// Minimal identifying context handed to hooks alongside a message. Distinct
/// from `ConnectionMetrics` (which is the one emitted record at teardown) —
/// this is the live, per-call context.
#[derive(Clone, Debug)]
pub struct MessageContext {
    pub connection_id: String,
    pub conversation_id: u64,
}

pub type SendContext = MessageContext;
pub type ReceiveContext = MessageContext;

/// ## SERVICE HOST
///
/// Dispatches inbound requests and events by method name. Called from a
/// detached worker thread, so these methods may block freely without
/// stalling the receive loop.
pub trait ServiceHost: Send + Sync {
    fn dispatch_request(
        &self,
        method_name: &str,
        ctx: &ReceiveContext,
        request: Message,
        metrics: &ConnectionMetrics,
    ) -> Message;

    fn dispatch_event(
        &self,
        method_name: &str,
        ctx: &ReceiveContext,
        event: Message,
        metrics: &ConnectionMetrics,
    );
}

/// A service host with nothing to dispatch to: every request is answered with
/// `METHOD_NOT_FOUND`-shaped internal error, every event is dropped. Useful
/// for tests that only exercise the handshake or a single scripted exchange.
pub struct NoopServiceHost;

impl ServiceHost for NoopServiceHost {
    fn dispatch_request(
        &self,
        method_name: &str,
        _ctx: &ReceiveContext,
        _request: Message,
        _metrics: &ConnectionMetrics,
    ) -> Message {
        Message::Error(ErrorRecord::internal_server_error(format!(
            "no handler registered for method {method_name:?}"
        )))
    }

    fn dispatch_event(
        &self,
        method_name: &str,
        _ctx: &ReceiveContext,
        _event: Message,
        _metrics: &ConnectionMetrics,
    ) {
        tracing::debug!(method_name, "dropping event, no service host registered");
    }
}

/// ## LAYER STACK
pub trait LayerStack: Send + Sync {
    fn on_send(
        &self,
        message_type: PayloadType,
        ctx: &SendContext,
    ) -> Result<Option<Vec<u8>>, ErrorRecord>;

    fn on_receive(
        &self,
        message_type: PayloadType,
        ctx: &ReceiveContext,
        layer_blob: Option<&[u8]>,
    ) -> Result<(), ErrorRecord>;
}

/// A layer stack with no transforms: every send/receive passes through
/// unchanged and no `LayerData` framelet is ever produced.
pub struct NoopLayerStack;

impl LayerStack for NoopLayerStack {
    fn on_send(
        &self,
        _message_type: PayloadType,
        _ctx: &SendContext,
    ) -> Result<Option<Vec<u8>>, ErrorRecord> {
        Ok(None)
    }

    fn on_receive(
        &self,
        _message_type: PayloadType,
        _ctx: &ReceiveContext,
        _layer_blob: Option<&[u8]>,
    ) -> Result<(), ErrorRecord> {
        Ok(())
    }
}

/// Arguments passed to the server-role listener hooks.
#[derive(Clone, Debug)]
pub struct ConnectArgs {
    pub connection_id: String,
    pub remote_endpoint: String,
}

#[derive(Clone, Debug)]
pub struct DisconnectArgs {
    pub connection_id: String,
    pub error_details: Option<ErrorRecord>,
}

/// ## LISTENER HOOKS
///
/// Server-role-only hooks invoked during `Created` (accept/reject) and
/// `Disconnecting` (notification).
pub trait ListenerHooks: Send + Sync {
    fn on_connected(&self, args: &ConnectArgs) -> Option<ErrorRecord>;
    fn on_disconnected(&self, args: &DisconnectArgs);
}

/// A listener that accepts every connection and ignores disconnection.
pub struct PermissiveListener;

impl ListenerHooks for PermissiveListener {
    fn on_connected(&self, _args: &ConnectArgs) -> Option<ErrorRecord> {
        None
    }

    fn on_disconnected(&self, _args: &DisconnectArgs) {}
}

/// ## METRICS SINK
pub trait MetricsSink: Send + Sync {
    fn record(&self, metrics: ConnectionMetrics);
}

/// A metrics sink that logs the record via `tracing` and discards it — the
/// default for callers who don't have a metrics backend wired up yet.
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, metrics: ConnectionMetrics) {
        tracing::info!(
            connection_id = %metrics.connection_id,
            local = %metrics.local_endpoint,
            remote = %metrics.remote_endpoint,
            shutdown_reason = ?metrics.shutdown_reason,
            duration_millis = metrics.duration_millis,
            "connection closed"
        );
    }
}

//! The page-side bridge: request correlation plus event multiplexing over a
//! single [`Transport`].
//!
//! A [`Bridge`] owns its pending-call table, listener registry and lifecycle
//! state. Inbound frames go through the [`OriginFilter`] before anything else
//! looks at them. Responses resolve pending calls by id and events fan out to
//! listeners in registration order.
//!
//! Locks are `parking_lot` mutexes and are only held for table operations,
//! never across an `.await`.

use std::fmt;
use std::sync::{Arc, Weak};

use metrics::counter;
use parking_lot::Mutex;
use portal_core::jsonrpc::INTERNAL_ERROR;
use portal_core::{
    BridgeError, Envelope, IdGenerator, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListenerId,
    Rejection, RequestId, Result,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::BridgeConfig;
use crate::event::{BridgeEvent, RawEvent};
use crate::filter::OriginFilter;
use crate::listeners::{ListenerRegistry, invoke_all};
use crate::pending::PendingCalls;
use crate::telemetry::{
    EVENTS_DISPATCHED_TOTAL, FRAMES_FILTERED_TOTAL, REQUESTS_TOTAL, RESPONSES_TOTAL,
};
use crate::transport::{InboundMessage, Transport};

/// Lifecycle of a bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, inbound hook not installed yet.
    Uninitialized,
    /// Hook installed; sending and receiving.
    Listening,
    /// Torn down. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Listening => write!(f, "listening"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// State and pending calls share a lock so a call cannot register after
/// `close` has drained the table.
struct Correlator {
    state: ConnectionState,
    pending: PendingCalls,
}

struct Inner<E: BridgeEvent> {
    config: BridgeConfig,
    filter: OriginFilter,
    transport: Arc<dyn Transport>,
    correlator: Mutex<Correlator>,
    listeners: Mutex<ListenerRegistry<E>>,
    ids: IdGenerator<RequestId>,
    hook: Mutex<Option<JoinHandle<()>>>,
}

impl<E: BridgeEvent> Drop for Inner<E> {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.get_mut().take() {
            hook.abort();
        }
    }
}

/// Cross-context RPC bridge.
///
/// Cheap to clone; clones share one connection.
pub struct Bridge<E: BridgeEvent = RawEvent> {
    inner: Arc<Inner<E>>,
}

impl<E: BridgeEvent> Clone for Bridge<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: BridgeEvent> fmt::Debug for Bridge<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("context", &self.inner.config.context)
            .field("trusted_origin", &self.inner.config.trusted_origin)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<E: BridgeEvent> Bridge<E> {
    /// Build a bridge without installing the inbound hook.
    ///
    /// The hook is installed by [`Bridge::start`] or by the first request.
    pub fn new(config: BridgeConfig, transport: impl Transport) -> Self {
        let filter = OriginFilter::new(config.trusted_origin.clone(), config.context);
        Self {
            inner: Arc::new(Inner {
                config,
                filter,
                transport: Arc::new(transport),
                correlator: Mutex::new(Correlator {
                    state: ConnectionState::Uninitialized,
                    pending: PendingCalls::new(),
                }),
                listeners: Mutex::new(ListenerRegistry::new()),
                ids: IdGenerator::new(),
                hook: Mutex::new(None),
            }),
        }
    }

    /// Build a bridge and install its inbound hook. Must run inside a Tokio
    /// runtime.
    pub fn listen(config: BridgeConfig, transport: impl Transport) -> Self {
        let bridge = Self::new(config, transport);
        bridge.start();
        bridge
    }

    /// Install the inbound hook. No-op unless uninitialized.
    pub fn start(&self) {
        let mut correlator = self.inner.correlator.lock();
        if correlator.state != ConnectionState::Uninitialized {
            return;
        }
        let rx = self.inner.transport.subscribe();
        let handle = tokio::spawn(inbound_loop(Arc::downgrade(&self.inner), rx));
        *self.inner.hook.lock() = Some(handle);
        correlator.state = ConnectionState::Listening;
        debug!(
            context = %self.inner.config.context,
            trusted_origin = %self.inner.config.trusted_origin,
            "bridge listening"
        );
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.correlator.lock().state
    }

    /// The configuration this bridge was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.lock().pending.len()
    }

    /// Send a call and wait for its result.
    ///
    /// `None` is a no-op: nothing is posted and `Ok(None)` is returned.
    /// Otherwise the request goes out under a freshly generated id (any id it
    /// carries is replaced) and the result comes back as `Some`.
    pub async fn send(&self, request: Option<JsonRpcRequest>) -> Result<Option<Value>> {
        let Some(request) = request else {
            trace!("send called without a request");
            return Ok(None);
        };
        self.call(request.method, request.params).await.map(Some)
    }

    /// Call `method` and return the raw result.
    pub async fn request_value(&self, method: &str, params: Value) -> Result<Value> {
        self.call(method.to_owned(), params).await
    }

    /// Call `method` and deserialize the result into `T`.
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.request_value(method, params).await?;
        serde_json::from_value(value).map_err(|source| BridgeError::Decode {
            method: method.to_owned(),
            source,
        })
    }

    /// Post a notification. No id is assigned and no response is awaited.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.start();
        if self.state() == ConnectionState::Closed {
            return Err(BridgeError::ConnectionClosed);
        }
        let request = JsonRpcRequest::notification(method, params);
        let frame = Envelope::request(self.inner.config.remote(), request)
            .to_value()
            .map_err(BridgeError::Encode)?;
        trace!(method, "posting notification");
        self.inner.transport.post_message(frame);
        Ok(())
    }

    async fn call(&self, method: String, params: Value) -> Result<Value> {
        self.start();
        let (id, rx) = {
            let mut correlator = self.inner.correlator.lock();
            if correlator.state == ConnectionState::Closed {
                return Err(BridgeError::ConnectionClosed);
            }
            loop {
                let id = self.inner.ids.next_id();
                if let Some(rx) = correlator.pending.register(id, &method) {
                    break (id, rx);
                }
            }
        };
        let _guard = PendingGuard {
            inner: &self.inner,
            id,
        };

        let request = JsonRpcRequest::new(id, method.as_str(), params);
        let frame = Envelope::request(self.inner.config.remote(), request)
            .to_value()
            .map_err(BridgeError::Encode)?;
        counter!(REQUESTS_TOTAL).increment(1);
        debug!(%id, method = %method, "posting request");
        self.inner.transport.post_message(frame);

        let received = match self.inner.config.request_timeout {
            Some(limit) => {
                if let Ok(received) = tokio::time::timeout(limit, rx).await {
                    received
                } else {
                    let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    warn!(%id, method = %method, timeout_ms, "request timed out");
                    return Err(BridgeError::Timeout { id, method, timeout_ms });
                }
            }
            None => rx.await,
        };
        // a dropped sender means the entry was discarded without a result
        received.unwrap_or(Err(BridgeError::ConnectionClosed))
    }

    /// Register a listener for `name`. Chainable.
    pub fn on(&self, name: E::Name, listener: impl Fn(&E) + Send + Sync + 'static) -> &Self {
        let _ = self.subscribe(name, listener);
        self
    }

    /// Register a listener for `name` and return a handle for [`Bridge::off`].
    pub fn subscribe(
        &self,
        name: E::Name,
        listener: impl Fn(&E) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.inner.listeners.lock().add(name.clone(), Arc::new(listener));
        trace!(event = ?name, listener = %id, "listener registered");
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(id)
    }

    /// Number of listeners registered for `name`.
    pub fn listener_count(&self, name: &E::Name) -> usize {
        self.inner.listeners.lock().count(name)
    }

    /// Process one raw inbound frame.
    ///
    /// This is the body of the inbound hook, exposed for embedders that pump
    /// frames from their own event loop.
    pub fn handle_inbound(&self, message: InboundMessage) {
        self.inner.handle_inbound(message);
    }

    /// Tear down: reject pending calls in registration order, detach the
    /// inbound hook and drop all listeners. Idempotent.
    pub fn close(&self) {
        let rejected = {
            let mut correlator = self.inner.correlator.lock();
            if correlator.state == ConnectionState::Closed {
                return;
            }
            correlator.state = ConnectionState::Closed;
            correlator.pending.close_all()
        };
        if let Some(hook) = self.inner.hook.lock().take() {
            hook.abort();
        }
        self.inner.listeners.lock().clear();
        debug!(context = %self.inner.config.context, rejected, "bridge closed");
    }
}

impl<E: BridgeEvent> Inner<E> {
    fn handle_inbound(&self, message: InboundMessage) {
        if let Err(reason) = self.filter.check(&message) {
            trace!(origin = %message.origin, %reason, "dropped inbound frame");
            counter!(FRAMES_FILTERED_TOTAL, "reason" => reason.as_str()).increment(1);
            return;
        }
        if self.correlator.lock().state == ConnectionState::Closed {
            trace!("ignoring frame after close");
            return;
        }
        let envelope = match Envelope::from_value(message.data.clone()) {
            Ok(envelope) => envelope,
            Err(error) => {
                if let Some((id, remote)) = undecodable_error_reply(&message.data) {
                    debug!(%id, %error, "response carried an undecodable error object");
                    self.settle(id, Err(BridgeError::Remote(remote)));
                    return;
                }
                debug!(%error, "dropped malformed frame");
                counter!(FRAMES_FILTERED_TOTAL, "reason" => Rejection::Malformed.as_str())
                    .increment(1);
                return;
            }
        };
        match envelope {
            Envelope::Response { response, .. } => self.resolve(response),
            Envelope::Event { event_name, data, .. } => self.dispatch(&event_name, data),
            Envelope::Request { request, .. } => {
                debug!(method = %request.method, "ignoring inbound request");
            }
        }
    }

    fn resolve(&self, response: JsonRpcResponse) {
        let Some(id) = response.id else {
            debug!("dropped response without id");
            return;
        };
        self.settle(id, response.into_result().map_err(BridgeError::from));
    }

    fn settle(&self, id: RequestId, result: Result<Value>) {
        if self.correlator.lock().pending.complete(id, result) {
            counter!(RESPONSES_TOTAL).increment(1);
        } else {
            debug!(%id, "dropped response for unknown or settled request");
        }
    }

    fn dispatch(&self, event_name: &str, data: Value) {
        let event = match E::decode(event_name, data) {
            Ok(event) => event,
            Err(error) => {
                debug!(event = event_name, %error, "dropped undecodable event");
                return;
            }
        };
        let listeners = self.listeners.lock().snapshot(&event.name());
        counter!(EVENTS_DISPATCHED_TOTAL).increment(1);
        let outcome = invoke_all(&event, &listeners);
        trace!(
            event = event_name,
            completed = outcome.completed,
            panicked = outcome.panicked,
            "event dispatched"
        );
    }
}

/// Pulls the id and error out of a response frame whose `error` member does
/// not decode, so the call it names still rejects.
fn undecodable_error_reply(data: &Value) -> Option<(RequestId, JsonRpcError)> {
    if data.get("type")?.as_str()? != "response" {
        return None;
    }
    let response = data.get("response")?;
    let error = response.get("error").filter(|e| !e.is_null())?;
    let id = RequestId::deserialize(response.get("id")?).ok()?;
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(INTERNAL_ERROR);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| error.to_string(), str::to_owned);
    Some((id, JsonRpcError::new(code, message).with_data(error.clone())))
}

/// Removes the pending entry when a call stops waiting, however it stops.
struct PendingGuard<'a, E: BridgeEvent> {
    inner: &'a Inner<E>,
    id: RequestId,
}

impl<E: BridgeEvent> Drop for PendingGuard<'_, E> {
    fn drop(&mut self) {
        if let Some(call) = self.inner.correlator.lock().pending.abandon(self.id) {
            trace!(id = %self.id, method = call.method(), "abandoned pending call");
        }
    }
}

async fn inbound_loop<E: BridgeEvent>(
    inner: Weak<Inner<E>>,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
) {
    while let Some(message) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_inbound(message);
    }
    trace!("inbound hook detached");
}

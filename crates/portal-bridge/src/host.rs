//! Counterpart side of the bridge.
//!
//! A [`Host`] runs in the privileged context. It answers request envelopes
//! addressed to it by dispatching them through a [`MethodRegistry`], posts
//! each response back to the page, and pushes events with [`Host::emit`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use portal_core::{
    BridgeError, Envelope, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Rejection, Result,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::config::BridgeConfig;
use crate::filter::OriginFilter;
use crate::telemetry::FRAMES_FILTERED_TOTAL;
use crate::transport::{InboundMessage, Transport};

/// Default time limit for a single handler.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Handlers slower than this are logged.
const SLOW_HANDLER: Duration = Duration::from_secs(5);

/// Implemented by every method the host answers.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Produce a result for `params`.
    async fn handle(&self, params: Value) -> std::result::Result<Value, JsonRpcError>;
}

/// Adapts an async closure into a [`MethodHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, JsonRpcError>> + Send,
{
    async fn handle(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        (self.0)(params).await
    }
}

/// Method name → handler.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    handler_timeout: Duration,
}

impl MethodRegistry {
    /// Empty registry with the default handler timeout.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Override the per-handler time limit.
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Register a handler, replacing any previous one for `method`.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(&mut self, method: &str, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, JsonRpcError>> + Send + 'static,
    {
        self.register(method, FnHandler(f));
    }

    /// Run the handler for `request`.
    ///
    /// Returns `None` for notifications, which never get a response.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest { method, params, id, .. } = request;

        let Some(handler) = self.handlers.get(&method) else {
            debug!(method, "method not found");
            return id.map(|id| {
                JsonRpcResponse::failure(Some(id), JsonRpcError::method_not_found(&method))
            });
        };

        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.handler_timeout, handler.handle(params)).await
        {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                error!(method, "handler timed out after {:?}", self.handler_timeout);
                Err(JsonRpcError::internal(format!("Handler for '{method}' timed out")))
            }
        };

        let elapsed = start.elapsed();
        if elapsed >= SLOW_HANDLER {
            warn!(method, duration_secs = elapsed.as_secs_f64(), "slow handler");
        }

        let id = id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::failure(Some(id), err),
        })
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `method` has a handler.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct HostInner {
    config: BridgeConfig,
    filter: OriginFilter,
    transport: Arc<dyn Transport>,
    registry: MethodRegistry,
    closed: AtomicBool,
    hook: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for HostInner {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.get_mut().take() {
            hook.abort();
        }
    }
}

impl HostInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn post(&self, envelope: &Envelope) -> Result<()> {
        let frame = envelope.to_value().map_err(BridgeError::Encode)?;
        self.transport.post_message(frame);
        Ok(())
    }

    /// Filter and decode a frame, returning the request to answer if any.
    fn accept(&self, message: InboundMessage) -> Option<JsonRpcRequest> {
        if let Err(reason) = self.filter.check(&message) {
            trace!(origin = %message.origin, %reason, "host dropped inbound frame");
            counter!(FRAMES_FILTERED_TOTAL, "reason" => reason.as_str()).increment(1);
            return None;
        }
        match Envelope::from_value(message.data) {
            Ok(Envelope::Request { request, .. }) => Some(request),
            Ok(other) => {
                debug!(kind = %other.kind(), "host ignoring non-request frame");
                None
            }
            Err(error) => {
                debug!(%error, "host dropped malformed frame");
                counter!(FRAMES_FILTERED_TOTAL, "reason" => Rejection::Malformed.as_str())
                    .increment(1);
                None
            }
        }
    }

    async fn answer(self: Arc<Self>, request: JsonRpcRequest) {
        let method = request.method.clone();
        let Some(response) = self.registry.dispatch(request).await else {
            return;
        };
        if self.is_closed() {
            debug!(method, "host closed before response was posted");
            return;
        }
        if let Err(error) = self.post(&Envelope::response(self.config.remote(), response)) {
            warn!(method, %error, "failed to post response");
        }
    }
}

/// Answers page requests and emits events to the page.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    /// Install the inbound hook and start answering requests. Must run inside
    /// a Tokio runtime.
    pub fn listen(
        config: BridgeConfig,
        transport: impl Transport,
        registry: MethodRegistry,
    ) -> Self {
        let filter = OriginFilter::new(config.trusted_origin.clone(), config.context);
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let rx = transport.subscribe();
        let inner = Arc::new(HostInner {
            config,
            filter,
            transport,
            registry,
            closed: AtomicBool::new(false),
            hook: Mutex::new(None),
        });
        let handle = tokio::spawn(host_loop(Arc::downgrade(&inner), rx));
        *inner.hook.lock() = Some(handle);
        debug!(
            context = %inner.config.context,
            methods = inner.registry.methods().len(),
            "host listening"
        );
        Self { inner }
    }

    /// Post an event to the page.
    pub fn emit(&self, event_name: &str, data: Value) -> Result<()> {
        if self.inner.is_closed() {
            return Err(BridgeError::ConnectionClosed);
        }
        trace!(event = event_name, "emitting event");
        self.inner
            .post(&Envelope::event(self.inner.config.remote(), event_name, data))
    }

    /// The methods this host answers.
    pub fn registry(&self) -> &MethodRegistry {
        &self.inner.registry
    }

    /// Whether [`Host::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Detach the inbound hook. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hook) = self.inner.hook.lock().take() {
            hook.abort();
        }
        debug!("host closed");
    }
}

async fn host_loop(inner: Weak<HostInner>, mut rx: mpsc::UnboundedReceiver<InboundMessage>) {
    while let Some(message) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if let Some(request) = inner.accept(message) {
            let _ = tokio::spawn(inner.answer(request));
        }
    }
}

//! Transport seam between the bridge and the platform message channel.
//!
//! A [`Transport`] is fire-and-forget in both directions: `post_message`
//! never blocks and returns nothing, and inbound frames arrive on the
//! receiver handed out by `subscribe`. Dropping that receiver detaches the
//! inbound hook.
//!
//! [`WindowChannel`] models a single browser window: every post reaches every
//! live subscriber, the sender included, stamped with the sender's origin.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

/// A raw frame as delivered by the platform, before any filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    /// Origin of the posting context (scheme://host:port).
    pub origin: String,
    /// Untrusted JSON payload.
    pub data: Value,
}

impl InboundMessage {
    /// Build a frame.
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// The platform messaging primitive.
pub trait Transport: Send + Sync + 'static {
    /// Post a frame. Never blocks; delivery failures are not reported.
    fn post_message(&self, data: Value);

    /// Install an inbound hook. Frames posted after this call are delivered
    /// to the returned receiver until it is dropped.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<InboundMessage>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn post_message(&self, data: Value) {
        (**self).post_message(data);
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<InboundMessage> {
        (**self).subscribe()
    }
}

/// In-process stand-in for a browser window's message bus.
#[derive(Clone, Default)]
pub struct WindowChannel {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<InboundMessage>>>>,
}

impl WindowChannel {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// A posting handle for a script running under `origin`.
    pub fn endpoint(&self, origin: impl Into<String>) -> WindowEndpoint {
        WindowEndpoint {
            origin: origin.into(),
            channel: self.clone(),
        }
    }

    /// Deliver `data` from `origin` to every live subscriber.
    ///
    /// Returns how many subscribers received it. Closed subscribers are pruned.
    pub fn post(&self, origin: &str, data: Value) -> usize {
        let message = InboundMessage::new(origin, data);
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        subscribers.len()
    }

    /// Register a new inbound hook.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Number of hooks still attached.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

/// A script's view of a [`WindowChannel`].
#[derive(Clone)]
pub struct WindowEndpoint {
    origin: String,
    channel: WindowChannel,
}

impl WindowEndpoint {
    /// Origin stamped on every frame this endpoint posts.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The window this endpoint posts into.
    pub fn channel(&self) -> &WindowChannel {
        &self.channel
    }
}

impl Transport for WindowEndpoint {
    fn post_message(&self, data: Value) {
        let delivered = self.channel.post(&self.origin, data);
        tracing::trace!(origin = %self.origin, delivered, "posted frame");
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<InboundMessage> {
        self.channel.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn post_reaches_every_subscriber_including_sender() {
        let window = WindowChannel::new();
        let page = window.endpoint("https://app.example");
        let mut page_rx = page.subscribe();
        let mut other_rx = window.subscribe();

        page.post_message(json!({"hello": 1}));

        let a = page_rx.try_recv().unwrap();
        let b = other_rx.try_recv().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.origin, "https://app.example");
        assert_eq!(a.data["hello"], 1);
    }

    #[test]
    fn frames_carry_poster_origin() {
        let window = WindowChannel::new();
        let mut rx = window.subscribe();
        window.endpoint("https://evil.example").post_message(json!(null));
        assert_eq!(rx.try_recv().unwrap().origin, "https://evil.example");
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let window = WindowChannel::new();
        let rx1 = window.subscribe();
        let _rx2 = window.subscribe();
        assert_eq!(window.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(window.subscriber_count(), 1);
        assert_eq!(window.post("https://app.example", json!({})), 1);
    }

    #[test]
    fn post_without_subscribers_is_silent() {
        let window = WindowChannel::new();
        assert_eq!(window.post("https://app.example", json!({})), 0);
    }

    #[test]
    fn subscribe_only_sees_later_frames() {
        let window = WindowChannel::new();
        let _ = window.post("https://app.example", json!(1));
        let mut rx = window.subscribe();
        let _ = window.post("https://app.example", json!(2));
        assert_eq!(rx.try_recv().unwrap().data, json!(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn arc_transport_forwards() {
        let window = WindowChannel::new();
        let transport: Arc<dyn Transport> = Arc::new(window.endpoint("https://app.example"));
        let mut rx = transport.subscribe();
        transport.post_message(json!("x"));
        assert_eq!(rx.try_recv().unwrap().data, json!("x"));
    }
}

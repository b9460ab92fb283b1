//! Listener registry for the event multiplexer.
//!
//! Listeners are kept per event name in insertion order, which is also the
//! dispatch order. Registering the same closure twice yields two entries.
//! Dispatch works on a snapshot so a listener may register or remove
//! listeners (or close the bridge) while it runs.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use metrics::counter;
use portal_core::{IdGenerator, ListenerId};
use tracing::warn;

use crate::event::BridgeEvent;
use crate::telemetry::LISTENER_PANICS_TOTAL;

/// A registered callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Event name → ordered listeners.
pub struct ListenerRegistry<E: BridgeEvent> {
    by_name: HashMap<E::Name, Vec<(ListenerId, Listener<E>)>>,
    ids: IdGenerator<ListenerId>,
}

impl<E: BridgeEvent> ListenerRegistry<E> {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            ids: IdGenerator::new(),
        }
    }

    /// Append a listener for `name`.
    pub fn add(&mut self, name: E::Name, listener: Listener<E>) -> ListenerId {
        let id = self.ids.next_id();
        self.by_name.entry(name).or_default().push((id, listener));
        id
    }

    /// Remove one listener by id. Returns `false` if it was not registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let mut removed = false;
        self.by_name.retain(|_, entries| {
            if !removed {
                if let Some(pos) = entries.iter().position(|(lid, _)| *lid == id) {
                    let _ = entries.remove(pos);
                    removed = true;
                }
            }
            !entries.is_empty()
        });
        removed
    }

    /// Copy of the listeners for `name`, in dispatch order.
    pub fn snapshot(&self, name: &E::Name) -> Vec<(ListenerId, Listener<E>)> {
        self.by_name.get(name).cloned().unwrap_or_default()
    }

    /// Number of listeners for `name`.
    pub fn count(&self, name: &E::Name) -> usize {
        self.by_name.get(name).map_or(0, Vec::len)
    }

    /// Total listeners across all names.
    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Drop every listener.
    pub fn clear(&mut self) {
        self.by_name.clear();
    }
}

impl<E: BridgeEvent> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of dispatching one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Listeners that ran to completion.
    pub completed: usize,
    /// Listeners that panicked.
    pub panicked: usize,
}

/// Invoke each listener in order, containing panics per listener.
pub fn invoke_all<E: BridgeEvent>(
    event: &E,
    listeners: &[(ListenerId, Listener<E>)],
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    for (id, listener) in listeners {
        match catch_unwind(AssertUnwindSafe(|| listener(event))) {
            Ok(()) => outcome.completed += 1,
            Err(panic) => {
                outcome.panicked += 1;
                counter!(LISTENER_PANICS_TOTAL).increment(1);
                warn!(
                    event = ?event.name(),
                    listener = %id,
                    panic = panic_message(panic.as_ref()),
                    "event listener panicked"
                );
            }
        }
    }
    outcome
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

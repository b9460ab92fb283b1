//! Metric names recorded through the `metrics` facade.
//!
//! No exporter is installed here; embedders wire one up if they want the
//! numbers.

/// Requests posted to the remote context.
pub const REQUESTS_TOTAL: &str = "bridge_requests_total";
/// Responses matched to a pending call.
pub const RESPONSES_TOTAL: &str = "bridge_responses_total";
/// Inbound frames dropped before correlation or dispatch, by `reason`.
pub const FRAMES_FILTERED_TOTAL: &str = "bridge_frames_filtered_total";
/// Events delivered to the multiplexer.
pub const EVENTS_DISPATCHED_TOTAL: &str = "bridge_events_dispatched_total";
/// Listener invocations that panicked.
pub const LISTENER_PANICS_TOTAL: &str = "bridge_listener_panics_total";

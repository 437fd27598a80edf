//! LISTEN/NOTIFY wakeup source for the outbox worker.
//!
//! The worker already polls on a fixed interval (its own safety net); this
//! only shortens the common-case latency between a commit and the worker
//! noticing it. Losing the listener connection is not an outage - the next
//! polling tick still picks up whatever was missed.

mod listener;

pub use listener::EventSource;

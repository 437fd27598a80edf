//! Background outbox worker.
//!
//! Translates committed domain events into relationship operations against
//! the authorization engine, at-least-once, with per-aggregate ordering.
//! Never holds a relational transaction open across a call to the engine -
//! the outbox table itself is what makes the round trip retryable.

mod processor;

pub use processor::{OutboxWorker, OutboxWorkerConfig};

//! HTTP adapter for the external authorization engine, plus the IAM event
//! translator that converts outbox payloads into relationship operations.

mod client;
mod translator;

pub use client::*;
pub use translator::*;

//! The IAM core service: domain aggregates, their Postgres persistence, the
//! outbox worker and event source that keep the authorization engine in
//! sync, and the authentication/tenant-resolution pipeline and API-key
//! subsystem built on top of them.

pub mod apikey;
pub mod auth;
pub mod domain;
pub mod eventsource;
pub mod infrastructure;
pub mod worker;

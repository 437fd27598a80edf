//! PostgreSQL adapter: connection pooling, outbox storage, transactions
//! and the hand-rolled migration runner. Aggregate-specific repository
//! implementations live in the service crate that owns those aggregates.

mod connection;
mod migration;
mod outbox;
mod transaction;

pub use connection::*;
pub use migration::*;
pub use outbox::*;
pub use transaction::*;

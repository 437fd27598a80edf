//! Abstract interfaces implemented by the `adapters/*` crates.

mod outbox;
mod relationship;
mod repository;
mod unit_of_work;

pub use outbox::*;
pub use relationship::*;
pub use repository::*;
pub use unit_of_work::*;

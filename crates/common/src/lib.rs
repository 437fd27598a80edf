//! Shared primitives used across `karto-*` crates: identifiers, retry
//! helpers and small value types.

pub mod ids;
pub mod retry;
pub mod types;

pub use ids::*;
pub use retry::*;
pub use types::*;

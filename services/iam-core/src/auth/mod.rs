//! The five-stage authentication and tenant-resolution pipeline.
//!
//! Transport-agnostic by design - it takes a [`CredentialInput`] pulled out
//! of whatever request shape the caller has (HTTP headers, gRPC metadata,
//! ...) and yields a [`Principal`] or a typed failure. Wiring it to an
//! actual transport is outside this crate's scope.

mod credential;
mod pipeline;
mod principal;

pub use credential::{classify, Credential, CredentialInput};
pub use pipeline::AuthPipeline;
pub use principal::{CredentialKind, Principal};

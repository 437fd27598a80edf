//! Credential verification primitives: RS256 OIDC token validation against
//! a cached JWKS, and API-key generation/hashing.

mod api_key;
mod jwks;
mod verifier;

pub use api_key::*;
pub use jwks::*;
pub use verifier::*;

//! Authorization-engine port and the translator plugin model.
//!
//! A closed set of relationship operations stands between domain events and
//! the external Zanzibar-style engine. Translators are pure: given an event,
//! produce zero or more operations; they never talk to the network
//! themselves.

use async_trait::async_trait;
use karto_errors::AppResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRef {
    pub resource_type: String,
    pub resource_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RelationshipOp {
    WriteRelationship(RelationshipRef),
    DeleteRelationship(RelationshipRef),
    /// Removes every relationship touching a resource, regardless of
    /// relation or subject - used when an aggregate itself is deleted.
    DeleteAllRelationships {
        resource_type: String,
        resource_id: String,
    },
}

#[async_trait]
pub trait AuthorizationEnginePort: Send + Sync {
    /// Applies a batch of operations produced from a single outbox entry.
    /// Implementations should treat the batch as atomic from the caller's
    /// point of view even if the engine itself applies them one at a time.
    async fn apply(&self, ops: &[RelationshipOp]) -> AppResult<()>;

    /// Checks whether `check.subject` holds `check.relation` on
    /// `check.resource`, directly or through the engine's own expansion
    /// rules. The engine's evaluation semantics are an external contract;
    /// this port only carries the request and the yes/no answer.
    async fn check_permission(&self, check: &RelationshipRef) -> AppResult<bool>;
}

/// A pure function from one domain event's JSON payload to the relationship
/// operations it implies. Each translator declares the event types it
/// handles so the worker can dispatch without a central match statement
/// growing unbounded as event types are added.
pub trait EventTranslator: Send + Sync {
    fn supported_event_types(&self) -> &[&'static str];

    fn translate(&self, event_type: &str, payload: &serde_json::Value) -> AppResult<Vec<RelationshipOp>>;
}

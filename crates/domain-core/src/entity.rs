//! Base traits every aggregate in the system implements.

use karto_common::AuditInfo;

pub trait Entity {
    type Id;

    fn id(&self) -> &Self::Id;
}

/// An aggregate root carries audit bookkeeping and records domain events as
/// it mutates, to be drained exactly once by the repository that persists
/// it in the same unit of work.
pub trait AggregateRoot: Entity {
    fn audit_info(&self) -> &AuditInfo;
    fn audit_info_mut(&mut self) -> &mut AuditInfo;
}

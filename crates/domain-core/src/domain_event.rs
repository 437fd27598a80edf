//! Domain event plumbing shared by every aggregate.
//!
//! There is no event-sourced replay here - aggregates are loaded from their
//! current-state row, not rebuilt from history. Events exist only to notify
//! the outside world (via the outbox) that something happened.

use chrono::{DateTime, Utc};

/// Something an aggregate did. `event_type` is the stable string an outbox
/// translator switches on; it must never change once shipped.
pub trait DomainEvent: Send + Sync {
    fn event_type(&self) -> &'static str;
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// An aggregate that records events as it mutates. `collect_events` drains
/// the buffer - it is meant to be called exactly once per persistence
/// cycle, by the repository, in the same transaction as the state write.
pub trait RecordsEvents {
    type Event: DomainEvent;

    fn collect_events(&mut self) -> Vec<Self::Event>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Renamed {
        at: DateTime<Utc>,
    }

    impl DomainEvent for Renamed {
        fn event_type(&self) -> &'static str {
            "test.renamed"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    struct Thing {
        pending: Vec<Renamed>,
    }

    impl RecordsEvents for Thing {
        type Event = Renamed;

        fn collect_events(&mut self) -> Vec<Renamed> {
            std::mem::take(&mut self.pending)
        }
    }

    #[test]
    fn collect_events_drains_exactly_once() {
        let mut thing = Thing {
            pending: vec![Renamed { at: Utc::now() }],
        };
        assert_eq!(thing.collect_events().len(), 1);
        assert_eq!(thing.collect_events().len(), 0);
    }
}

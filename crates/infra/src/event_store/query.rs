//! Cross-stream event queries (audit views, projection rebuilds).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{AggregateId, TenantId};

use super::r#trait::StoredEvent;

/// Filter for cross-stream event queries. All fields are conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Restrict to one aggregate stream.
    pub aggregate_id: Option<AggregateId>,
    /// Restrict to an aggregate type (e.g. "sepa.batch").
    pub aggregate_type: Option<String>,
    /// Restrict to an event type (e.g. "sepa.batch.entry_outcome_recorded").
    pub event_type: Option<String>,
    /// Business-time lower bound (inclusive).
    pub occurred_from: Option<DateTime<Utc>>,
    /// Business-time upper bound (inclusive).
    pub occurred_until: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &StoredEvent) -> bool {
        if let Some(id) = self.aggregate_id {
            if event.aggregate_id != id {
                return false;
            }
        }
        if let Some(t) = &self.aggregate_type {
            if &event.aggregate_type != t {
                return false;
            }
        }
        if let Some(t) = &self.event_type {
            if &event.event_type != t {
                return false;
            }
        }
        if let Some(from) = self.occurred_from {
            if event.occurred_at < from {
                return false;
            }
        }
        if let Some(until) = self.occurred_until {
            if event.occurred_at > until {
                return false;
            }
        }
        true
    }
}

/// Offset/limit pagination for event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// A tenant-scoped event query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    pub filter: EventFilter,
    pub pagination: Option<Pagination>,
}

/// Result page of an event query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQueryResult {
    pub events: Vec<StoredEvent>,
    /// Total matches before pagination.
    pub total: usize,
}

impl EventQuery {
    /// Run the query over an already-loaded tenant event list.
    ///
    /// Storage backends may push the filter down instead; this is the
    /// reference semantics used by the in-memory store.
    pub fn run(&self, _tenant_id: TenantId, events: &[StoredEvent]) -> EventQueryResult {
        let matched: Vec<&StoredEvent> =
            events.iter().filter(|e| self.filter.matches(e)).collect();
        let total = matched.len();

        let page = self.pagination.unwrap_or_default();
        let events = matched
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect();

        EventQueryResult { events, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn stored(aggregate_type: &str, event_type: &str, seq: u64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::now_v7(),
            tenant_id: TenantId::new(),
            aggregate_id: AggregateId::new(),
            aggregate_type: aggregate_type.to_string(),
            sequence_number: seq,
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn filters_by_aggregate_and_event_type() {
        let events = vec![
            stored("sepa.batch", "sepa.batch.created", 1),
            stored("sepa.batch", "sepa.batch.submitted", 2),
            stored("membership.member", "membership.member.registered", 1),
        ];

        let query = EventQuery {
            filter: EventFilter {
                aggregate_type: Some("sepa.batch".to_string()),
                ..Default::default()
            },
            pagination: None,
        };
        let result = query.run(TenantId::new(), &events);
        assert_eq!(result.total, 2);

        let query = EventQuery {
            filter: EventFilter {
                event_type: Some("sepa.batch.submitted".to_string()),
                ..Default::default()
            },
            pagination: None,
        };
        assert_eq!(query.run(TenantId::new(), &events).total, 1);
    }

    #[test]
    fn paginates_matches() {
        let events: Vec<StoredEvent> = (1..=10)
            .map(|i| stored("sepa.batch", "sepa.batch.entry_added", i))
            .collect();

        let query = EventQuery {
            filter: EventFilter::default(),
            pagination: Some(Pagination { offset: 8, limit: 5 }),
        };
        let result = query.run(TenantId::new(), &events);
        assert_eq!(result.total, 10);
        assert_eq!(result.events.len(), 2);
    }
}

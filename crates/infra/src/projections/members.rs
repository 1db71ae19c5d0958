use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use verenigingen_core::{AggregateId, TenantId};
use verenigingen_events::EventEnvelope;
use verenigingen_membership::{ContactDetails, MemberEvent, MemberId, MemberStatus};

use crate::read_model::TenantStore;

/// Queryable member directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberReadModel {
    pub member_id: MemberId,
    pub member_number: String,
    pub full_name: String,
    pub contact: ContactDetails,
    pub chapter: Option<AggregateId>,
    pub status: MemberStatus,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum MemberProjectionError {
    #[error("failed to deserialize member event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Member directory projection (member id → name, contact, chapter, status).
#[derive(Debug)]
pub struct MemberDirectoryProjection<S>
where
    S: TenantStore<MemberId, MemberReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> MemberDirectoryProjection<S>
where
    S: TenantStore<MemberId, MemberReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    tenant_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    tenant_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }

    pub fn get(&self, tenant_id: TenantId, member_id: &MemberId) -> Option<MemberReadModel> {
        self.store.get(tenant_id, member_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<MemberReadModel> {
        self.store.list(tenant_id)
    }

    /// Apply one published envelope. Non-member events are ignored;
    /// duplicates (seq ≤ cursor) are skipped.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), MemberProjectionError> {
        if envelope.aggregate_type() != "membership.member" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(MemberProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(MemberProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: MemberEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| MemberProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, member_id) = match &ev {
            MemberEvent::MemberRegistered(e) => (e.tenant_id, e.member_id),
            MemberEvent::MemberContactUpdated(e) => (e.tenant_id, e.member_id),
            MemberEvent::MemberSuspended(e) => (e.tenant_id, e.member_id),
            MemberEvent::MemberReinstated(e) => (e.tenant_id, e.member_id),
            MemberEvent::MemberTerminated(e) => (e.tenant_id, e.member_id),
        };

        if event_tenant != tenant_id {
            return Err(MemberProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if member_id.0 != aggregate_id {
            return Err(MemberProjectionError::TenantIsolation(
                "event member_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            MemberEvent::MemberRegistered(e) => {
                self.store.upsert(
                    tenant_id,
                    member_id,
                    MemberReadModel {
                        member_id,
                        member_number: e.member_number,
                        full_name: e.full_name,
                        contact: e.contact,
                        chapter: e.chapter,
                        status: MemberStatus::Active,
                    },
                );
            }
            MemberEvent::MemberContactUpdated(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &member_id) {
                    model.full_name = e.full_name;
                    model.contact = e.contact;
                    self.store.upsert(tenant_id, member_id, model);
                }
            }
            MemberEvent::MemberSuspended(_) => {
                self.set_status(tenant_id, member_id, MemberStatus::Suspended);
            }
            MemberEvent::MemberReinstated(_) => {
                self.set_status(tenant_id, member_id, MemberStatus::Active);
            }
            MemberEvent::MemberTerminated(_) => {
                self.set_status(tenant_id, member_id, MemberStatus::Terminated);
            }
        }

        self.update_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn set_status(&self, tenant_id: TenantId, member_id: MemberId, status: MemberStatus) {
        if let Some(mut model) = self.store.get(tenant_id, &member_id) {
            model.status = status;
            self.store.upsert(tenant_id, member_id, model);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryTenantStore;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;
    use verenigingen_events::Event;
    use verenigingen_membership::member::{MemberRegistered, MemberSuspended};

    fn envelope(
        tenant_id: TenantId,
        member_id: MemberId,
        seq: u64,
        ev: &MemberEvent,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            member_id.0,
            "membership.member",
            seq,
            serde_json::to_value(ev).unwrap(),
        )
    }

    fn projection()
    -> MemberDirectoryProjection<Arc<InMemoryTenantStore<MemberId, MemberReadModel>>> {
        MemberDirectoryProjection::new(Arc::new(InMemoryTenantStore::new()))
    }

    fn registered(tenant_id: TenantId, member_id: MemberId) -> MemberEvent {
        MemberEvent::MemberRegistered(MemberRegistered {
            tenant_id,
            member_id,
            member_number: "M-1".to_string(),
            full_name: "Jan de Vries".to_string(),
            contact: ContactDetails::default(),
            chapter: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn builds_directory_from_events() {
        let p = projection();
        let tenant_id = TenantId::new();
        let member_id = MemberId::new(AggregateId::new());

        p.apply_envelope(&envelope(tenant_id, member_id, 1, &registered(tenant_id, member_id)))
            .unwrap();

        let model = p.get(tenant_id, &member_id).unwrap();
        assert_eq!(model.full_name, "Jan de Vries");
        assert_eq!(model.status, MemberStatus::Active);
        assert_eq!(registered(tenant_id, member_id).event_type(), "membership.member.registered");
    }

    #[test]
    fn duplicate_delivery_is_a_noop() {
        let p = projection();
        let tenant_id = TenantId::new();
        let member_id = MemberId::new(AggregateId::new());
        let reg = envelope(tenant_id, member_id, 1, &registered(tenant_id, member_id));

        p.apply_envelope(&reg).unwrap();

        let suspend = envelope(
            tenant_id,
            member_id,
            2,
            &MemberEvent::MemberSuspended(MemberSuspended {
                tenant_id,
                member_id,
                reason: None,
                occurred_at: Utc::now(),
            }),
        );
        p.apply_envelope(&suspend).unwrap();
        // Redelivered old event does not resurrect the active status.
        p.apply_envelope(&reg).unwrap();

        assert_eq!(
            p.get(tenant_id, &member_id).unwrap().status,
            MemberStatus::Suspended
        );
    }

    #[test]
    fn sequence_gap_is_rejected() {
        let p = projection();
        let tenant_id = TenantId::new();
        let member_id = MemberId::new(AggregateId::new());

        p.apply_envelope(&envelope(tenant_id, member_id, 1, &registered(tenant_id, member_id)))
            .unwrap();

        let err = p
            .apply_envelope(&envelope(
                tenant_id,
                member_id,
                3,
                &MemberEvent::MemberSuspended(MemberSuspended {
                    tenant_id,
                    member_id,
                    reason: None,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            MemberProjectionError::NonMonotonicSequence { .. }
        ));
    }

    #[test]
    fn foreign_aggregate_types_are_ignored() {
        let p = projection();
        let tenant_id = TenantId::new();
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            AggregateId::new(),
            "sepa.batch",
            1,
            serde_json::json!({"weird": true}),
        );
        assert!(p.apply_envelope(&envelope).is_ok());
        assert!(p.list(tenant_id).is_empty());
    }
}

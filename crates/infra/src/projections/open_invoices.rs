use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use verenigingen_core::{AggregateId, Money, TenantId};
use verenigingen_dues::DuesScheduleId;
use verenigingen_events::EventEnvelope;
use verenigingen_invoicing::invoice::{DuesInvoiceEvent, InvoiceStatus};
use verenigingen_invoicing::InvoiceId;
use verenigingen_membership::MemberId;

use crate::read_model::TenantStore;

/// Queryable invoice read model with coverage range and payment state.
///
/// `list_open` feeds the SEPA batch builder: every open invoice of a
/// SEPA-paying member is a collection candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInvoiceReadModel {
    pub invoice_id: InvoiceId,
    pub member_id: MemberId,
    pub schedule_id: DuesScheduleId,
    pub status: InvoiceStatus,
    pub amount: Money,
    pub total_paid: Money,
    pub due_date: NaiveDate,
    pub coverage_start: NaiveDate,
    pub coverage_end: NaiveDate,
}

impl OpenInvoiceReadModel {
    pub fn outstanding(&self) -> Money {
        self.amount.saturating_sub(self.total_paid)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum InvoiceProjectionError {
    #[error("failed to deserialize invoice event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Open-invoices projection over `invoicing.invoice` streams.
#[derive(Debug)]
pub struct OpenInvoicesProjection<S>
where
    S: TenantStore<InvoiceId, OpenInvoiceReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> OpenInvoicesProjection<S>
where
    S: TenantStore<InvoiceId, OpenInvoiceReadModel>,
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

    pub fn get(&self, tenant_id: TenantId, invoice_id: &InvoiceId) -> Option<OpenInvoiceReadModel> {
        self.store.get(tenant_id, invoice_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<OpenInvoiceReadModel> {
        self.store.list(tenant_id)
    }

    /// Invoices still open (outstanding > 0), the batch-builder input.
    pub fn list_open(&self, tenant_id: TenantId) -> Vec<OpenInvoiceReadModel> {
        let mut open: Vec<OpenInvoiceReadModel> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|m| m.status == InvoiceStatus::Open && m.outstanding().is_positive())
            .collect();
        open.sort_by_key(|m| m.due_date);
        open
    }

    /// Invoices of one member, for the coverage report.
    pub fn list_for_member(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
    ) -> Vec<OpenInvoiceReadModel> {
        let mut invoices: Vec<OpenInvoiceReadModel> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|m| m.member_id == member_id)
            .collect();
        invoices.sort_by_key(|m| m.coverage_start);
        invoices
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), InvoiceProjectionError> {
        if envelope.aggregate_type() != "invoicing.invoice" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(InvoiceProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(InvoiceProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: DuesInvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| InvoiceProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, invoice_id) = match &ev {
            DuesInvoiceEvent::InvoiceIssued(e) => (e.tenant_id, e.invoice_id),
            DuesInvoiceEvent::PaymentRegistered(e) => (e.tenant_id, e.invoice_id),
            DuesInvoiceEvent::InvoiceVoided(e) => (e.tenant_id, e.invoice_id),
        };

        if event_tenant != tenant_id {
            return Err(InvoiceProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if invoice_id.0 != aggregate_id {
            return Err(InvoiceProjectionError::TenantIsolation(
                "event invoice_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            DuesInvoiceEvent::InvoiceIssued(e) => {
                self.store.upsert(
                    tenant_id,
                    invoice_id,
                    OpenInvoiceReadModel {
                        invoice_id,
                        member_id: e.member_id,
                        schedule_id: e.schedule_id,
                        status: InvoiceStatus::Open,
                        amount: e.amount,
                        total_paid: Money::ZERO,
                        due_date: e.due_date,
                        coverage_start: e.coverage_start,
                        coverage_end: e.coverage_end,
                    },
                );
            }
            DuesInvoiceEvent::PaymentRegistered(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &invoice_id) {
                    model.total_paid = model
                        .total_paid
                        .checked_add(e.amount)
                        .unwrap_or(model.total_paid);
                    if !model.outstanding().is_positive() {
                        model.status = InvoiceStatus::Paid;
                    }
                    self.store.upsert(tenant_id, invoice_id, model);
                }
            }
            DuesInvoiceEvent::InvoiceVoided(_) => {
                if let Some(mut model) = self.store.get(tenant_id, &invoice_id) {
                    model.status = InvoiceStatus::Void;
                    self.store.upsert(tenant_id, invoice_id, model);
                }
            }
        }

        self.update_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryTenantStore;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;
    use verenigingen_invoicing::invoice::{InvoiceIssued, PaymentRegistered};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn projection()
    -> OpenInvoicesProjection<Arc<InMemoryTenantStore<InvoiceId, OpenInvoiceReadModel>>> {
        OpenInvoicesProjection::new(Arc::new(InMemoryTenantStore::new()))
    }

    fn issue(
        p: &OpenInvoicesProjection<Arc<InMemoryTenantStore<InvoiceId, OpenInvoiceReadModel>>>,
        tenant_id: TenantId,
        member_id: MemberId,
        cents: i64,
        due: NaiveDate,
    ) -> InvoiceId {
        let invoice_id = InvoiceId::new(AggregateId::new());
        let ev = DuesInvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id,
            invoice_id,
            member_id,
            schedule_id: DuesScheduleId::new(AggregateId::new()),
            amount: Money::from_cents(cents),
            due_date: due,
            coverage_start: due.pred_opt().unwrap(),
            coverage_end: due,
            occurred_at: Utc::now(),
        });
        p.apply_envelope(&EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            invoice_id.0,
            "invoicing.invoice",
            1,
            serde_json::to_value(&ev).unwrap(),
        ))
        .unwrap();
        invoice_id
    }

    #[test]
    fn open_list_orders_by_due_date_and_drops_paid() {
        let p = projection();
        let tenant_id = TenantId::new();
        let member_id = MemberId::new(AggregateId::new());

        let late = issue(&p, tenant_id, member_id, 1250, ymd(2025, 4, 1));
        let early = issue(&p, tenant_id, member_id, 1250, ymd(2025, 3, 1));

        // Pay off the late invoice.
        let ev = DuesInvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id,
            invoice_id: late,
            amount: Money::from_cents(1250),
            outstanding_after: Money::ZERO,
            occurred_at: Utc::now(),
        });
        p.apply_envelope(&EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            late.0,
            "invoicing.invoice",
            2,
            serde_json::to_value(&ev).unwrap(),
        ))
        .unwrap();

        let open = p.list_open(tenant_id);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].invoice_id, early);
    }

    #[test]
    fn partial_payment_keeps_invoice_open() {
        let p = projection();
        let tenant_id = TenantId::new();
        let member_id = MemberId::new(AggregateId::new());
        let invoice_id = issue(&p, tenant_id, member_id, 1250, ymd(2025, 3, 1));

        let ev = DuesInvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id,
            invoice_id,
            amount: Money::from_cents(1000),
            outstanding_after: Money::from_cents(250),
            occurred_at: Utc::now(),
        });
        p.apply_envelope(&EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            invoice_id.0,
            "invoicing.invoice",
            2,
            serde_json::to_value(&ev).unwrap(),
        ))
        .unwrap();

        let open = p.list_open(tenant_id);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].outstanding(), Money::from_cents(250));
    }

    #[test]
    fn member_listing_is_scoped() {
        let p = projection();
        let tenant_id = TenantId::new();
        let member_a = MemberId::new(AggregateId::new());
        let member_b = MemberId::new(AggregateId::new());
        issue(&p, tenant_id, member_a, 1250, ymd(2025, 3, 1));
        issue(&p, tenant_id, member_b, 1250, ymd(2025, 3, 1));

        assert_eq!(p.list_for_member(tenant_id, member_a).len(), 1);
    }
}

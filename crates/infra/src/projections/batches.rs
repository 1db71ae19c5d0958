use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use verenigingen_core::{AggregateId, Money, TenantId};
use verenigingen_events::EventEnvelope;
use verenigingen_invoicing::InvoiceId;
use verenigingen_sepa::batch::{BatchStatus, BatchType, DirectDebitBatchEvent, DirectDebitBatchId};
use verenigingen_sepa::EntryOutcome;

use crate::read_model::TenantStore;

/// Queryable batch status (lifecycle + totals + per-entry outcomes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatusReadModel {
    pub batch_id: DirectDebitBatchId,
    pub batch_type: BatchType,
    pub collection_date: NaiveDate,
    pub status: BatchStatus,
    pub entry_count: u32,
    pub total_amount: Money,
    pub message_id: Option<String>,
    pub outcomes: Vec<(InvoiceId, EntryOutcome)>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum BatchProjectionError {
    #[error("failed to deserialize batch event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Batch status projection over `sepa.batch` streams.
#[derive(Debug)]
pub struct BatchStatusProjection<S>
where
    S: TenantStore<DirectDebitBatchId, BatchStatusReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> BatchStatusProjection<S>
where
    S: TenantStore<DirectDebitBatchId, BatchStatusReadModel>,
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

    pub fn get(
        &self,
        tenant_id: TenantId,
        batch_id: &DirectDebitBatchId,
    ) -> Option<BatchStatusReadModel> {
        self.store.get(tenant_id, batch_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<BatchStatusReadModel> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), BatchProjectionError> {
        if envelope.aggregate_type() != "sepa.batch" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(BatchProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(BatchProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: DirectDebitBatchEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| BatchProjectionError::Deserialize(e.to_string()))?;

        let batch_id = DirectDebitBatchId::new(aggregate_id);

        match ev {
            DirectDebitBatchEvent::BatchCreated(e) => {
                if e.tenant_id != tenant_id {
                    return Err(BatchProjectionError::TenantIsolation(
                        "event tenant_id does not match envelope tenant_id".to_string(),
                    ));
                }
                self.store.upsert(
                    tenant_id,
                    batch_id,
                    BatchStatusReadModel {
                        batch_id: e.batch_id,
                        batch_type: e.batch_type,
                        collection_date: e.collection_date,
                        status: BatchStatus::Draft,
                        entry_count: 0,
                        total_amount: Money::ZERO,
                        message_id: None,
                        outcomes: Vec::new(),
                    },
                );
            }
            DirectDebitBatchEvent::EntryAdded(e) => {
                self.update(tenant_id, batch_id, |model| {
                    model.entry_count += 1;
                    model.total_amount = model
                        .total_amount
                        .checked_add(e.entry.amount)
                        .unwrap_or(model.total_amount);
                    model.status = BatchStatus::Draft;
                });
            }
            DirectDebitBatchEvent::BatchValidated(e) => {
                self.update(tenant_id, batch_id, |model| {
                    model.status = BatchStatus::Validated;
                    model.entry_count = e.entry_count;
                    model.total_amount = e.total_amount;
                });
            }
            DirectDebitBatchEvent::BatchGenerated(e) => {
                self.update(tenant_id, batch_id, |model| {
                    model.status = BatchStatus::Generated;
                    model.message_id = Some(e.message_id.clone());
                });
            }
            DirectDebitBatchEvent::BatchSubmitted(_) => {
                self.update(tenant_id, batch_id, |model| {
                    model.status = BatchStatus::Submitted;
                });
            }
            DirectDebitBatchEvent::EntryOutcomeRecorded(e) => {
                self.update(tenant_id, batch_id, |model| {
                    model.outcomes.push((e.invoice_id, e.outcome.clone()));
                });
            }
            DirectDebitBatchEvent::BatchClosed(e) => {
                self.update(tenant_id, batch_id, |model| {
                    model.status = e.final_status;
                });
            }
            DirectDebitBatchEvent::BatchCancelled(_) => {
                self.update(tenant_id, batch_id, |model| {
                    model.status = BatchStatus::Cancelled;
                });
            }
        }

        self.update_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn update(
        &self,
        tenant_id: TenantId,
        batch_id: DirectDebitBatchId,
        f: impl FnOnce(&mut BatchStatusReadModel),
    ) {
        if let Some(mut model) = self.store.get(tenant_id, &batch_id) {
            f(&mut model);
            self.store.upsert(tenant_id, batch_id, model);
        }
    }
}

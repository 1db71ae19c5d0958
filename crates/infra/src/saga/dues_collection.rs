//! Dues collection saga.
//!
//! Orchestrates the flow per invoice:
//! 1. Invoice issued → request inclusion in the next collection batch
//! 2. Batch entry collected → register the payment, reset the schedule's
//!    failure counter
//! 3. Batch entry failed → record the failure on the schedule (grace /
//!    suspension policy) and schedule a retry job on the 2h/24h/72h ladder
//!
//! Compensating action: a failed retry ladder leaves the invoice open and
//! the job dead-lettered for manual review; nothing is silently written off.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use verenigingen_core::{AggregateId, TenantId};
use verenigingen_events::{EventEnvelope, Saga, SagaAction};
use verenigingen_invoicing::InvoiceId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuesCollectionSagaState {
    #[default]
    AwaitingCollection,
    InBatch {
        batch_id: String,
    },
    Collected,
    Failed {
        retries: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DuesCollectionSagaEvent {
    CollectionRequested,
    EntryBatched { batch_id: String },
    CollectionSucceeded,
    CollectionFailed { reason_code: Option<String> },
    RetryScheduled { attempt: u32 },
}

pub struct DuesCollectionSaga;

fn payload_str<'a>(payload: &'a JsonValue, key: &str) -> Option<&'a str> {
    payload.as_object()?.get(key)?.as_str()
}

fn invoice_id_from(payload: &JsonValue, key: &str) -> Option<InvoiceId> {
    let raw = payload_str(payload, key)?;
    let uuid = Uuid::parse_str(raw).ok()?;
    Some(InvoiceId::new(AggregateId::from_uuid(uuid)))
}

impl Saga for DuesCollectionSaga {
    type State = DuesCollectionSagaState;
    type SagaEvent = DuesCollectionSagaEvent;
    type CorrelationId = InvoiceId;

    fn saga_type() -> &'static str {
        "saga.dues_collection"
    }

    fn correlate(envelope: &EventEnvelope<JsonValue>) -> Option<Self::CorrelationId> {
        match envelope.aggregate_type() {
            // Invoice streams correlate by their own aggregate id.
            "invoicing.invoice" => Some(InvoiceId::new(envelope.aggregate_id())),
            // Batch entry events carry the invoice id in the payload.
            "sepa.batch" => {
                let variant = envelope.payload().as_object()?.iter().next()?;
                invoice_id_from(variant.1, "invoice_id")
            }
            _ => None,
        }
    }

    fn saga_id(_tenant_id: TenantId, correlation: &Self::CorrelationId) -> AggregateId {
        // One saga instance per invoice; the tenant scoping happens at the
        // event-store level.
        correlation.0
    }

    fn apply(state: &mut Self::State, event: &Self::SagaEvent) {
        match event {
            DuesCollectionSagaEvent::CollectionRequested => {
                *state = DuesCollectionSagaState::AwaitingCollection;
            }
            DuesCollectionSagaEvent::EntryBatched { batch_id } => {
                *state = DuesCollectionSagaState::InBatch {
                    batch_id: batch_id.clone(),
                };
            }
            DuesCollectionSagaEvent::CollectionSucceeded => {
                *state = DuesCollectionSagaState::Collected;
            }
            DuesCollectionSagaEvent::CollectionFailed { .. } => {
                let retries = match state {
                    DuesCollectionSagaState::Failed { retries } => *retries,
                    _ => 0,
                };
                *state = DuesCollectionSagaState::Failed { retries };
            }
            DuesCollectionSagaEvent::RetryScheduled { attempt } => {
                *state = DuesCollectionSagaState::Failed { retries: *attempt };
            }
        }
    }

    fn react(
        state: &Self::State,
        tenant_id: TenantId,
        correlation: &Self::CorrelationId,
        incoming: &EventEnvelope<JsonValue>,
    ) -> Vec<SagaAction> {
        let Some(payload) = incoming.payload().as_object() else {
            return vec![];
        };
        let Some((variant, body)) = payload.iter().next() else {
            return vec![];
        };

        match (incoming.aggregate_type(), variant.as_str()) {
            ("invoicing.invoice", "InvoiceIssued") => vec![SagaAction::Emit {
                event_type: "collection_requested".to_string(),
                payload: serde_json::json!({}),
            }],
            ("sepa.batch", "EntryAdded") => {
                let batch_id = payload_str(body, "batch_id").unwrap_or_default();
                vec![SagaAction::Emit {
                    event_type: "entry_batched".to_string(),
                    payload: serde_json::json!({ "batch_id": batch_id }),
                }]
            }
            ("sepa.batch", "EntryOutcomeRecorded") => {
                let outcome_collected = body
                    .get("outcome")
                    .map(|o| o == &serde_json::json!("collected"))
                    .unwrap_or(false);

                if outcome_collected {
                    vec![
                        SagaAction::Emit {
                            event_type: "collection_succeeded".to_string(),
                            payload: serde_json::json!({}),
                        },
                        SagaAction::Command {
                            aggregate_type: "invoicing.invoice".to_string(),
                            command_type: "RegisterPayment".to_string(),
                            payload: serde_json::json!({
                                "tenant_id": tenant_id,
                                "invoice_id": correlation.0,
                                "amount": body.get("amount").cloned().unwrap_or(JsonValue::Null),
                            }),
                        },
                        SagaAction::Command {
                            aggregate_type: "dues.schedule".to_string(),
                            command_type: "RecordPaymentRecovered".to_string(),
                            payload: serde_json::json!({
                                "tenant_id": tenant_id,
                                "invoice_id": correlation.0,
                            }),
                        },
                        SagaAction::Complete,
                    ]
                } else {
                    let reason = body
                        .get("outcome")
                        .and_then(|o| o.get("failed"))
                        .and_then(|f| f.get("reason_code"))
                        .cloned()
                        .unwrap_or(JsonValue::Null);
                    let attempt = match state {
                        DuesCollectionSagaState::Failed { retries } => retries + 1,
                        _ => 1,
                    };

                    vec![
                        SagaAction::Emit {
                            event_type: "collection_failed".to_string(),
                            payload: serde_json::json!({ "reason_code": reason }),
                        },
                        SagaAction::Command {
                            aggregate_type: "dues.schedule".to_string(),
                            command_type: "RecordPaymentFailure".to_string(),
                            payload: serde_json::json!({
                                "tenant_id": tenant_id,
                                "invoice_id": correlation.0,
                                "reason": reason,
                            }),
                        },
                        SagaAction::Emit {
                            event_type: "retry_scheduled".to_string(),
                            payload: serde_json::json!({ "attempt": attempt }),
                        },
                    ]
                }
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verenigingen_core::Money;

    fn envelope(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        payload: JsonValue,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), tenant_id, aggregate_id, aggregate_type, 1, payload)
    }

    fn outcome_envelope(
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        outcome: JsonValue,
    ) -> EventEnvelope<JsonValue> {
        envelope(
            tenant_id,
            AggregateId::new(),
            "sepa.batch",
            serde_json::json!({
                "EntryOutcomeRecorded": {
                    "tenant_id": tenant_id,
                    "batch_id": AggregateId::new(),
                    "invoice_id": invoice_id.0,
                    "member_id": AggregateId::new(),
                    "amount": Money::from_cents(1250),
                    "outcome": outcome,
                    "occurred_at": "2025-08-06T09:00:00Z",
                }
            }),
        )
    }

    #[test]
    fn correlates_invoice_and_batch_events_to_same_saga() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());

        let from_invoice = DuesCollectionSaga::correlate(&envelope(
            tenant_id,
            invoice_id.0,
            "invoicing.invoice",
            serde_json::json!({"InvoiceIssued": {}}),
        ))
        .unwrap();

        let from_batch = DuesCollectionSaga::correlate(&outcome_envelope(
            tenant_id,
            invoice_id,
            serde_json::json!("collected"),
        ))
        .unwrap();

        assert_eq!(from_invoice, from_batch);
        assert_eq!(
            DuesCollectionSaga::saga_id(tenant_id, &from_invoice),
            invoice_id.0
        );
    }

    #[test]
    fn collected_outcome_registers_payment_and_completes() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let state = DuesCollectionSagaState::InBatch {
            batch_id: "b-1".to_string(),
        };

        let actions = DuesCollectionSaga::react(
            &state,
            tenant_id,
            &invoice_id,
            &outcome_envelope(tenant_id, invoice_id, serde_json::json!("collected")),
        );

        assert!(actions.iter().any(|a| matches!(
            a,
            SagaAction::Command { command_type, .. } if command_type == "RegisterPayment"
        )));
        assert!(actions.iter().any(|a| matches!(
            a,
            SagaAction::Command { command_type, .. } if command_type == "RecordPaymentRecovered"
        )));
        assert!(actions.iter().any(|a| matches!(a, SagaAction::Complete)));
    }

    #[test]
    fn failed_outcome_records_failure_and_schedules_retry() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let state = DuesCollectionSagaState::InBatch {
            batch_id: "b-1".to_string(),
        };

        let actions = DuesCollectionSaga::react(
            &state,
            tenant_id,
            &invoice_id,
            &outcome_envelope(
                tenant_id,
                invoice_id,
                serde_json::json!({"failed": {"reason_code": "AC04"}}),
            ),
        );

        assert!(actions.iter().any(|a| matches!(
            a,
            SagaAction::Command { command_type, .. } if command_type == "RecordPaymentFailure"
        )));
        assert!(actions.iter().any(|a| matches!(
            a,
            SagaAction::Emit { event_type, .. } if event_type == "retry_scheduled"
        )));
        assert!(!actions.iter().any(|a| matches!(a, SagaAction::Complete)));
    }

    #[test]
    fn retry_attempt_counts_up_from_failed_state() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let state = DuesCollectionSagaState::Failed { retries: 2 };

        let actions = DuesCollectionSaga::react(
            &state,
            tenant_id,
            &invoice_id,
            &outcome_envelope(
                tenant_id,
                invoice_id,
                serde_json::json!({"failed": {"reason_code": "MS03"}}),
            ),
        );

        let scheduled = actions.iter().find_map(|a| match a {
            SagaAction::Emit { event_type, payload } if event_type == "retry_scheduled" => {
                payload.get("attempt").and_then(|v| v.as_u64())
            }
            _ => None,
        });
        assert_eq!(scheduled, Some(3));
    }

    #[test]
    fn state_machine_applies_saga_events() {
        let mut state = DuesCollectionSagaState::default();

        DuesCollectionSaga::apply(
            &mut state,
            &DuesCollectionSagaEvent::EntryBatched {
                batch_id: "b-1".to_string(),
            },
        );
        assert!(matches!(state, DuesCollectionSagaState::InBatch { .. }));

        DuesCollectionSaga::apply(&mut state, &DuesCollectionSagaEvent::CollectionSucceeded);
        assert_eq!(state, DuesCollectionSagaState::Collected);
    }
}

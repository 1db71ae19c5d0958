use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use verenigingen_auth::Permission;
use verenigingen_core::AggregateId;
use verenigingen_dues::{
    DuesSchedule, DuesScheduleCommand, RecordPaymentFailure, RecordPaymentRecovered,
};
use verenigingen_infra::jobs::{Job, JobKind, JobStore, RetryPolicy};
use verenigingen_invoicing::{DuesInvoice, DuesInvoiceCommand, InvoiceId, RegisterPayment};
use verenigingen_sepa::batch::{
    AddEntry, CancelBatch, CloseBatch, CreateBatch, DirectDebitBatch, DirectDebitBatchCommand,
    DirectDebitBatchId, EntryOutcome, MarkGenerated, RecordEntryOutcome, SubmitBatch,
    ValidateBatch,
};
use verenigingen_sepa::pain008::generate_pain008;

use crate::app::routes::common::{CmdAuth, parse_aggregate_id, parse_date};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_batch).get(list_batches))
        .route("/:id", get(get_batch))
        .route("/:id/validate", post(validate_batch))
        .route("/:id/generate", post(generate_batch))
        .route("/:id/submit", post(submit_batch))
        .route("/:id/outcomes", post(record_outcomes))
        .route("/:id/cancel", post(cancel_batch))
        .route("/:id/pain008", get(render_pain008))
}

fn batch_permission() -> Vec<Permission> {
    vec![Permission::new("sepa.batch.manage")]
}

fn authorize_batch_cmd(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    cmd: DirectDebitBatchCommand,
) -> Result<DirectDebitBatchCommand, axum::response::Response> {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: batch_permission(),
    };
    crate::authz::authorize_command(tenant, principal, &cmd_auth)
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))?;
    Ok(cmd_auth.inner)
}

fn dispatch_batch(
    services: &AppServices,
    tenant: &TenantContext,
    batch_agg: AggregateId,
    cmd: DirectDebitBatchCommand,
) -> Result<(), axum::response::Response> {
    services
        .dispatch::<DirectDebitBatch>(
            tenant.tenant_id(),
            batch_agg,
            "sepa.batch",
            cmd,
            |_t, aggregate_id| DirectDebitBatch::empty(DirectDebitBatchId::new(aggregate_id)),
        )
        .map(|_| ())
        .map_err(errors::dispatch_error_to_response)
}

/// Create a batch and fill it with entries for the given open invoices.
///
/// Amounts and member ids come from the open-invoices read model; the
/// request supplies the per-member mandate details.
pub async fn create_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateBatchRequest>,
) -> axum::response::Response {
    let collection_date = match parse_date(&body.collection_date, "collection_date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if body.entries.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "empty_batch",
            "a batch needs at least one entry",
        );
    }

    let batch_agg = AggregateId::new();
    let batch_id = DirectDebitBatchId::new(batch_agg);

    let create = match authorize_batch_cmd(
        &tenant,
        &principal,
        DirectDebitBatchCommand::CreateBatch(CreateBatch {
            tenant_id: tenant.tenant_id(),
            batch_id,
            batch_type: body.batch_type,
            collection_date,
            occurred_at: Utc::now(),
        }),
    ) {
        Ok(cmd) => cmd,
        Err(resp) => return resp,
    };
    if let Err(resp) = dispatch_batch(&services, &tenant, batch_agg, create) {
        return resp;
    }

    for entry in &body.entries {
        let invoice_agg = match parse_aggregate_id(&entry.invoice_id, "invoice_id") {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        let invoice_id = InvoiceId::new(invoice_agg);
        let Some(invoice) = services.invoices.get(tenant.tenant_id(), &invoice_id) else {
            return errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("invoice {} not found", entry.invoice_id),
            );
        };
        if !invoice.outstanding().is_positive() {
            return errors::json_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invariant_violation",
                format!("invoice {} has nothing outstanding", entry.invoice_id),
            );
        }
        let sign_date = match parse_date(&entry.mandate_sign_date, "mandate_sign_date") {
            Ok(v) => v,
            Err(resp) => return resp,
        };

        let add = DirectDebitBatchCommand::AddEntry(AddEntry {
            tenant_id: tenant.tenant_id(),
            batch_id,
            invoice_id,
            member_id: invoice.member_id,
            member_name: entry.member_name.clone(),
            amount: invoice.outstanding(),
            iban: entry.iban.clone(),
            bic: entry.bic.clone(),
            mandate_reference: entry.mandate_reference.clone(),
            mandate_sign_date: sign_date,
            sequence_type: entry.sequence_type,
            occurred_at: Utc::now(),
        });
        if let Err(resp) = dispatch_batch(&services, &tenant, batch_agg, add) {
            return resp;
        }
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": batch_agg.to_string(),
            "entries": body.entries.len(),
        })),
    )
        .into_response()
}

pub async fn list_batches(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let mut batches = services.batches.list(tenant.tenant_id());
    batches.sort_by_key(|b| b.collection_date);
    let payload: Vec<dto::BatchResponse> = batches.iter().map(dto::BatchResponse::from).collect();
    Json(payload).into_response()
}

pub async fn get_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let batch_agg = match parse_aggregate_id(&id, "batch id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .batches
        .get(tenant.tenant_id(), &DirectDebitBatchId::new(batch_agg))
    {
        Some(model) => Json(dto::BatchResponse::from(&model)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "batch not found"),
    }
}

macro_rules! simple_batch_transition {
    ($name:ident, $cmd:expr) => {
        pub async fn $name(
            Extension(services): Extension<Arc<AppServices>>,
            Extension(tenant): Extension<TenantContext>,
            Extension(principal): Extension<PrincipalContext>,
            Path(id): Path<String>,
        ) -> axum::response::Response {
            let batch_agg = match parse_aggregate_id(&id, "batch id") {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            let batch_id = DirectDebitBatchId::new(batch_agg);
            let cmd = match authorize_batch_cmd(&tenant, &principal, $cmd(tenant.tenant_id(), batch_id))
            {
                Ok(cmd) => cmd,
                Err(resp) => return resp,
            };
            match dispatch_batch(&services, &tenant, batch_agg, cmd) {
                Ok(()) => StatusCode::NO_CONTENT.into_response(),
                Err(resp) => resp,
            }
        }
    };
}

simple_batch_transition!(validate_batch, |tenant_id, batch_id| {
    DirectDebitBatchCommand::ValidateBatch(ValidateBatch {
        tenant_id,
        batch_id,
        occurred_at: Utc::now(),
    })
});

simple_batch_transition!(submit_batch, |tenant_id, batch_id| {
    DirectDebitBatchCommand::SubmitBatch(SubmitBatch {
        tenant_id,
        batch_id,
        occurred_at: Utc::now(),
    })
});

simple_batch_transition!(cancel_batch, |tenant_id, batch_id| {
    DirectDebitBatchCommand::CancelBatch(CancelBatch {
        tenant_id,
        batch_id,
        reason: None,
        occurred_at: Utc::now(),
    })
});

/// Assign the pain.008 message id (marks the batch generated).
pub async fn generate_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let batch_agg = match parse_aggregate_id(&id, "batch id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let batch_id = DirectDebitBatchId::new(batch_agg);
    let message_id = format!("VV-{}-{}", Utc::now().format("%Y%m%d"), &id[..8]);

    let cmd = match authorize_batch_cmd(
        &tenant,
        &principal,
        DirectDebitBatchCommand::MarkGenerated(MarkGenerated {
            tenant_id: tenant.tenant_id(),
            batch_id,
            message_id: message_id.clone(),
            occurred_at: Utc::now(),
        }),
    ) {
        Ok(cmd) => cmd,
        Err(resp) => return resp,
    };
    match dispatch_batch(&services, &tenant, batch_agg, cmd) {
        Ok(()) => Json(serde_json::json!({ "message_id": message_id })).into_response(),
        Err(resp) => resp,
    }
}

/// Record bank outcomes for batch entries.
///
/// Collected entries settle their invoice and clear the schedule's failure
/// streak; failed entries push the schedule into its grace/suspension
/// policy and enqueue a retry on the 2h/24h/72h ladder.
pub async fn record_outcomes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordOutcomesRequest>,
) -> axum::response::Response {
    let batch_agg = match parse_aggregate_id(&id, "batch id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let batch_id = DirectDebitBatchId::new(batch_agg);

    for outcome_req in &body.outcomes {
        let invoice_agg = match parse_aggregate_id(&outcome_req.invoice_id, "invoice_id") {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        let invoice_id = InvoiceId::new(invoice_agg);

        let outcome = match outcome_req.outcome.as_str() {
            "collected" => EntryOutcome::Collected,
            "failed" => EntryOutcome::Failed {
                reason_code: outcome_req.reason_code.clone(),
            },
            other => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_outcome",
                    format!("outcome must be 'collected' or 'failed', got '{other}'"),
                );
            }
        };

        let cmd = match authorize_batch_cmd(
            &tenant,
            &principal,
            DirectDebitBatchCommand::RecordEntryOutcome(RecordEntryOutcome {
                tenant_id: tenant.tenant_id(),
                batch_id,
                invoice_id,
                outcome: outcome.clone(),
                occurred_at: Utc::now(),
            }),
        ) {
            Ok(cmd) => cmd,
            Err(resp) => return resp,
        };
        if let Err(resp) = dispatch_batch(&services, &tenant, batch_agg, cmd) {
            return resp;
        }

        apply_outcome_effects(&services, &tenant, batch_id, invoice_id, &outcome);
    }

    if body.close {
        let cmd = match authorize_batch_cmd(
            &tenant,
            &principal,
            DirectDebitBatchCommand::CloseBatch(CloseBatch {
                tenant_id: tenant.tenant_id(),
                batch_id,
                occurred_at: Utc::now(),
            }),
        ) {
            Ok(cmd) => cmd,
            Err(resp) => return resp,
        };
        if let Err(resp) = dispatch_batch(&services, &tenant, batch_agg, cmd) {
            return resp;
        }
    }

    StatusCode::NO_CONTENT.into_response()
}

/// Post-outcome effects on the invoice and the dues schedule.
fn apply_outcome_effects(
    services: &AppServices,
    tenant: &TenantContext,
    batch_id: DirectDebitBatchId,
    invoice_id: InvoiceId,
    outcome: &EntryOutcome,
) {
    let Some(invoice) = services.invoices.get(tenant.tenant_id(), &invoice_id) else {
        tracing::warn!(invoice = %invoice_id, "outcome for unknown invoice");
        return;
    };
    let schedule_agg = invoice.schedule_id.0;

    match outcome {
        EntryOutcome::Collected => {
            let payment = DuesInvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id: tenant.tenant_id(),
                invoice_id,
                amount: invoice.outstanding(),
                occurred_at: Utc::now(),
            });
            if let Err(e) = services.dispatch::<DuesInvoice>(
                tenant.tenant_id(),
                invoice_id.0,
                "invoicing.invoice",
                payment,
                |_t, aggregate_id| DuesInvoice::empty(InvoiceId::new(aggregate_id)),
            ) {
                tracing::warn!(invoice = %invoice_id, error = ?e, "payment registration failed");
            }

            let recovered = DuesScheduleCommand::RecordPaymentRecovered(RecordPaymentRecovered {
                tenant_id: tenant.tenant_id(),
                schedule_id: invoice.schedule_id,
                occurred_at: Utc::now(),
            });
            // A schedule without a failure streak rejects this; that is fine.
            let _ = services.dispatch::<DuesSchedule>(
                tenant.tenant_id(),
                schedule_agg,
                "dues.schedule",
                recovered,
                |_t, aggregate_id| {
                    DuesSchedule::empty(verenigingen_dues::DuesScheduleId::new(aggregate_id))
                },
            );
        }
        EntryOutcome::Failed { reason_code } => {
            let failure = DuesScheduleCommand::RecordPaymentFailure(RecordPaymentFailure {
                tenant_id: tenant.tenant_id(),
                schedule_id: invoice.schedule_id,
                reason: reason_code.clone(),
                failed_on: Utc::now().date_naive(),
                occurred_at: Utc::now(),
            });
            if let Err(e) = services.dispatch::<DuesSchedule>(
                tenant.tenant_id(),
                schedule_agg,
                "dues.schedule",
                failure,
                |_t, aggregate_id| {
                    DuesSchedule::empty(verenigingen_dues::DuesScheduleId::new(aggregate_id))
                },
            ) {
                tracing::warn!(schedule = %invoice.schedule_id, error = ?e, "failure recording failed");
            }

            let job = Job::new(
                tenant.tenant_id(),
                JobKind::batch_retry(batch_id.to_string(), invoice_id.to_string()),
                serde_json::json!({ "reason_code": reason_code }),
            )
            .with_retry_policy(RetryPolicy::sepa_collection())
            .delayed(RetryPolicy::sepa_collection().delay_for_attempt(1));
            if let Err(e) = services.jobs.enqueue(job) {
                tracing::warn!(invoice = %invoice_id, error = ?e, "retry job enqueue failed");
            }
        }
    }
}

/// Render the pain.008.001.08 document for a generated batch.
pub async fn render_pain008(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let batch_agg = match parse_aggregate_id(&id, "batch id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let batch = match services.rehydrate::<DirectDebitBatch>(
        tenant.tenant_id(),
        batch_agg,
        |_t, aggregate_id| DirectDebitBatch::empty(DirectDebitBatchId::new(aggregate_id)),
    ) {
        Ok(b) => b,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    match generate_pain008(&batch, &services.creditor, Utc::now()) {
        Ok(xml) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/xml")],
            xml,
        )
            .into_response(),
        Err(e) => errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            e.to_string(),
        ),
    }
}

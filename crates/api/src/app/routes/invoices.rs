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
    DuesSchedule, DuesScheduleCommand, DuesScheduleId, RecordInvoiceGenerated,
};
use verenigingen_invoicing::{
    DuesInvoice, DuesInvoiceCommand, InvoiceId, IssueInvoice, RegisterPayment, VoidInvoice,
};
use verenigingen_membership::MemberId;

use crate::app::routes::common::{CmdAuth, parse_aggregate_id, parse_amount, parse_date};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(issue_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/payments", post(register_payment))
        .route("/:id/void", post(void_invoice))
}

pub async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::IssueInvoiceRequest>,
) -> axum::response::Response {
    let member_agg = match parse_aggregate_id(&body.member_id, "member_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let schedule_agg = match parse_aggregate_id(&body.schedule_id, "schedule_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let amount = match parse_amount(&body.amount, "amount") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let due_date = match parse_date(&body.due_date, "due_date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let coverage_start = match parse_date(&body.coverage_start, "coverage_start") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let coverage_end = match parse_date(&body.coverage_end, "coverage_end") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let invoice_agg = AggregateId::new();
    let schedule_id = DuesScheduleId::new(schedule_agg);
    let cmd = DuesInvoiceCommand::IssueInvoice(IssueInvoice {
        tenant_id: tenant.tenant_id(),
        invoice_id: InvoiceId::new(invoice_agg),
        member_id: MemberId::new(member_agg),
        schedule_id,
        amount,
        due_date,
        coverage_start,
        coverage_end,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("invoices.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    if let Err(e) = services.dispatch::<DuesInvoice>(
        tenant.tenant_id(),
        invoice_agg,
        "invoicing.invoice",
        cmd_auth.inner,
        |_t, aggregate_id| DuesInvoice::empty(InvoiceId::new(aggregate_id)),
    ) {
        return errors::dispatch_error_to_response(e);
    }

    // Advance the schedule's billing clock; the invoice exists either way,
    // so a schedule in a bad state surfaces as a warning, not a failure.
    let advance = DuesScheduleCommand::RecordInvoiceGenerated(RecordInvoiceGenerated {
        tenant_id: tenant.tenant_id(),
        schedule_id,
        coverage_start,
        coverage_end,
        occurred_at: Utc::now(),
    });
    if let Err(e) = services.dispatch::<DuesSchedule>(
        tenant.tenant_id(),
        schedule_agg,
        "dues.schedule",
        advance,
        |_t, aggregate_id| DuesSchedule::empty(DuesScheduleId::new(aggregate_id)),
    ) {
        tracing::warn!(error = ?e, schedule = %schedule_id, "schedule advance failed");
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": invoice_agg.to_string() })),
    )
        .into_response()
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    let open = services.invoices.list_open(tenant.tenant_id());
    let payload: Vec<dto::InvoiceResponse> = open.iter().map(dto::InvoiceResponse::from).collect();
    Json(payload).into_response()
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_agg = match parse_aggregate_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .invoices
        .get(tenant.tenant_id(), &InvoiceId::new(invoice_agg))
    {
        Some(model) => Json(dto::InvoiceResponse::from(&model)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "invoice not found"),
    }
}

pub async fn register_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RegisterPaymentRequest>,
) -> axum::response::Response {
    let invoice_agg = match parse_aggregate_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let amount = match parse_amount(&body.amount, "amount") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = DuesInvoiceCommand::RegisterPayment(RegisterPayment {
        tenant_id: tenant.tenant_id(),
        invoice_id: InvoiceId::new(invoice_agg),
        amount,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("invoices.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<DuesInvoice>(
        tenant.tenant_id(),
        invoice_agg,
        "invoicing.invoice",
        cmd_auth.inner,
        |_t, aggregate_id| DuesInvoice::empty(InvoiceId::new(aggregate_id)),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn void_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VoidInvoiceRequest>,
) -> axum::response::Response {
    let invoice_agg = match parse_aggregate_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = DuesInvoiceCommand::VoidInvoice(VoidInvoice {
        tenant_id: tenant.tenant_id(),
        invoice_id: InvoiceId::new(invoice_agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("invoices.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<DuesInvoice>(
        tenant.tenant_id(),
        invoice_agg,
        "invoicing.invoice",
        cmd_auth.inner,
        |_t, aggregate_id| DuesInvoice::empty(InvoiceId::new(aggregate_id)),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

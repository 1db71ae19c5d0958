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
    ChangeRate, CreateSchedule, DuesSchedule, DuesScheduleCommand, DuesScheduleId,
};
use verenigingen_membership::MemberId;

use crate::app::routes::common::{CmdAuth, parse_aggregate_id, parse_amount, parse_date};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/schedules", post(create_schedule))
        .route("/schedules/:id/rate", post(change_rate))
        .route("/coverage/:member_id", get(coverage_report))
}

pub async fn create_schedule(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::CreateScheduleRequest>,
) -> axum::response::Response {
    let member_agg = match parse_aggregate_id(&body.member_id, "member_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let dues_rate = match parse_amount(&body.dues_rate, "dues_rate") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let first_invoice_date = match parse_date(&body.first_invoice_date, "first_invoice_date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let schedule_agg = AggregateId::new();
    let cmd = DuesScheduleCommand::CreateSchedule(CreateSchedule {
        tenant_id: tenant.tenant_id(),
        schedule_id: DuesScheduleId::new(schedule_agg),
        member_id: MemberId::new(member_agg),
        membership_type: body.membership_type,
        billing_frequency: body.billing_frequency,
        dues_rate,
        first_invoice_date,
        invoice_lead_days: body.invoice_lead_days,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("dues.schedule.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<DuesSchedule>(
        tenant.tenant_id(),
        schedule_agg,
        "dues.schedule",
        cmd_auth.inner,
        |_t, aggregate_id| DuesSchedule::empty(DuesScheduleId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": schedule_agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn change_rate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeRateRequest>,
) -> axum::response::Response {
    let schedule_agg = match parse_aggregate_id(&id, "schedule id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let new_rate = match parse_amount(&body.new_rate, "new_rate") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = DuesScheduleCommand::ChangeRate(ChangeRate {
        tenant_id: tenant.tenant_id(),
        schedule_id: DuesScheduleId::new(schedule_agg),
        new_rate,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("dues.schedule.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<DuesSchedule>(
        tenant.tenant_id(),
        schedule_agg,
        "dues.schedule",
        cmd_auth.inner,
        |_t, aggregate_id| DuesSchedule::empty(DuesScheduleId::new(aggregate_id)),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Coverage report for a member: gaps, severities, and the catch-up plan.
pub async fn coverage_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(member_id): Path<String>,
) -> axum::response::Response {
    let member_agg = match parse_aggregate_id(&member_id, "member id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let member_id = MemberId::new(member_agg);

    let invoices = services
        .invoices
        .list_for_member(tenant.tenant_id(), member_id);
    let analysis = services.coverage.analyze(
        tenant.tenant_id(),
        member_id,
        &invoices,
        Utc::now().date_naive(),
    );

    Json(dto::CoverageResponse {
        member_id: member_id.to_string(),
        analysis,
    })
    .into_response()
}

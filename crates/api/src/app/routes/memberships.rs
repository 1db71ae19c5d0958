use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;

use verenigingen_auth::Permission;
use verenigingen_core::AggregateId;
use verenigingen_membership::{
    CancelMembership, MemberId, Membership, MembershipCommand, MembershipId, StartMembership,
};

use crate::app::routes::common::{CmdAuth, parse_aggregate_id, parse_date};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(start_membership))
        .route("/:id/cancel", post(cancel_membership))
}

pub async fn start_membership(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::StartMembershipRequest>,
) -> axum::response::Response {
    let member_agg = match parse_aggregate_id(&body.member_id, "member_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let start_date = match parse_date(&body.start_date, "start_date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let membership_agg = AggregateId::new();
    let cmd = MembershipCommand::StartMembership(StartMembership {
        tenant_id: tenant.tenant_id(),
        membership_id: MembershipId::new(membership_agg),
        member_id: MemberId::new(member_agg),
        membership_type: body.membership_type,
        start_date,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("memberships.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Membership>(
        tenant.tenant_id(),
        membership_agg,
        "membership.membership",
        cmd_auth.inner,
        |_t, aggregate_id| Membership::empty(MembershipId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": membership_agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn cancel_membership(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CancelMembershipRequest>,
) -> axum::response::Response {
    let membership_agg = match parse_aggregate_id(&id, "membership id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cancellation_date = match parse_date(&body.cancellation_date, "cancellation_date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = MembershipCommand::CancelMembership(CancelMembership {
        tenant_id: tenant.tenant_id(),
        membership_id: MembershipId::new(membership_agg),
        cancellation_date,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("memberships.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Membership>(
        tenant.tenant_id(),
        membership_agg,
        "membership.membership",
        cmd_auth.inner,
        |_t, aggregate_id| Membership::empty(MembershipId::new(aggregate_id)),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

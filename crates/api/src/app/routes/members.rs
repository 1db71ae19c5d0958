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
use verenigingen_membership::{
    Member, MemberCommand, MemberId, RegisterMember, SuspendMember, TerminateMember,
};

use crate::app::routes::common::{CmdAuth, parse_aggregate_id, parse_date};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_member).get(list_members))
        .route("/:id", get(get_member))
        .route("/:id/suspend", post(suspend_member))
        .route("/:id/terminate", post(terminate_member))
}

pub async fn register_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::RegisterMemberRequest>,
) -> axum::response::Response {
    let chapter = match &body.chapter {
        Some(raw) => match parse_aggregate_id(raw, "chapter") {
            Ok(id) => Some(id),
            Err(resp) => return resp,
        },
        None => None,
    };

    let member_agg = AggregateId::new();
    let cmd = MemberCommand::RegisterMember(RegisterMember {
        tenant_id: tenant.tenant_id(),
        member_id: MemberId::new(member_agg),
        member_number: body.member_number,
        full_name: body.full_name,
        contact: body.contact,
        chapter,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("members.register")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services.dispatch::<Member>(
        tenant.tenant_id(),
        member_agg,
        "membership.member",
        cmd_auth.inner,
        |_t, aggregate_id| Member::empty(MemberId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": member_agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn list_members(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    let mut members = services.members.list(tenant.tenant_id());
    members.sort_by(|a, b| a.member_number.cmp(&b.member_number));
    let payload: Vec<dto::MemberResponse> = members.iter().map(dto::MemberResponse::from).collect();
    Json(payload).into_response()
}

pub async fn get_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let member_agg = match parse_aggregate_id(&id, "member id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .members
        .get(tenant.tenant_id(), &MemberId::new(member_agg))
    {
        Some(model) => Json(dto::MemberResponse::from(&model)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "member not found"),
    }
}

pub async fn suspend_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SuspendMemberRequest>,
) -> axum::response::Response {
    let member_agg = match parse_aggregate_id(&id, "member id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = MemberCommand::SuspendMember(SuspendMember {
        tenant_id: tenant.tenant_id(),
        member_id: MemberId::new(member_agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("members.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Member>(
        tenant.tenant_id(),
        member_agg,
        "membership.member",
        cmd_auth.inner,
        |_t, aggregate_id| Member::empty(MemberId::new(aggregate_id)),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn terminate_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::TerminateMemberRequest>,
) -> axum::response::Response {
    let member_agg = match parse_aggregate_id(&id, "member id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let termination_date = match parse_date(&body.termination_date, "termination_date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = MemberCommand::TerminateMember(TerminateMember {
        tenant_id: tenant.tenant_id(),
        member_id: MemberId::new(member_agg),
        reason: body.reason,
        termination_date,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("members.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Member>(
        tenant.tenant_id(),
        member_agg,
        "membership.member",
        cmd_auth.inner,
        |_t, aggregate_id| Member::empty(MemberId::new(aggregate_id)),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

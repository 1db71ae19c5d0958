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
use verenigingen_membership::MemberId;
use verenigingen_sepa::{
    ActivateMandate, CancelMandate, SepaMandate, SepaMandateCommand, SepaMandateId, SignMandate,
};

use crate::app::routes::common::{CmdAuth, parse_aggregate_id, parse_date};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(sign_mandate))
        .route("/:id/activate", post(activate_mandate))
        .route("/:id/cancel", post(cancel_mandate))
}

pub async fn sign_mandate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::SignMandateRequest>,
) -> axum::response::Response {
    let member_agg = match parse_aggregate_id(&body.member_id, "member_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let sign_date = match parse_date(&body.sign_date, "sign_date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mandate_agg = AggregateId::new();
    let cmd = SepaMandateCommand::SignMandate(SignMandate {
        tenant_id: tenant.tenant_id(),
        mandate_id: SepaMandateId::new(mandate_agg),
        member_id: MemberId::new(member_agg),
        mandate_reference: body.mandate_reference,
        iban: body.iban,
        bic: body.bic,
        kind: body.kind,
        sign_date,
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("sepa.mandate.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<SepaMandate>(
        tenant.tenant_id(),
        mandate_agg,
        "sepa.mandate",
        cmd_auth.inner,
        |_t, aggregate_id| SepaMandate::empty(SepaMandateId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": mandate_agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn activate_mandate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let mandate_agg = match parse_aggregate_id(&id, "mandate id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = SepaMandateCommand::ActivateMandate(ActivateMandate {
        tenant_id: tenant.tenant_id(),
        mandate_id: SepaMandateId::new(mandate_agg),
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("sepa.mandate.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<SepaMandate>(
        tenant.tenant_id(),
        mandate_agg,
        "sepa.mandate",
        cmd_auth.inner,
        |_t, aggregate_id| SepaMandate::empty(SepaMandateId::new(aggregate_id)),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn cancel_mandate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let mandate_agg = match parse_aggregate_id(&id, "mandate id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = SepaMandateCommand::CancelMandate(CancelMandate {
        tenant_id: tenant.tenant_id(),
        mandate_id: SepaMandateId::new(mandate_agg),
        occurred_at: Utc::now(),
    });
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("sepa.mandate.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<SepaMandate>(
        tenant.tenant_id(),
        mandate_agg,
        "sepa.mandate",
        cmd_auth.inner,
        |_t, aggregate_id| SepaMandate::empty(SepaMandateId::new(aggregate_id)),
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

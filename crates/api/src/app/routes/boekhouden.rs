use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use verenigingen_accounting::LedgerId;
use verenigingen_auth::Permission;
use verenigingen_core::AggregateId;
use verenigingen_infra::boekhouden::{MigrationConfig, MigrationState};

use crate::app::routes::common::{CmdAuth, parse_date};
use crate::app::services::{AppServices, MigrationRun};
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/migrations", post(start_migration).get(list_migrations))
        .route("/migrations/:id", get(get_migration))
}

/// Start a staged eBoekhouden migration in the background.
pub async fn start_migration(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::StartMigrationRequest>,
) -> axum::response::Response {
    // Authorization gates the whole run; the command itself is built below.
    let gate = CmdAuth {
        inner: (),
        required: vec![Permission::new("accounting.migrate")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &gate) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let Some(runner) = services.migration_runner.clone() else {
        return errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "not_configured",
            "eBoekhouden credentials are not configured",
        );
    };

    if body.stages.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "at least one migration stage is required",
        );
    }
    let date_from = match &body.date_from {
        Some(raw) => match parse_date(raw, "date_from") {
            Ok(v) => Some(v),
            Err(resp) => return resp,
        },
        None => None,
    };

    let config = MigrationConfig {
        administration: body.administration,
        stages: body.stages,
        date_from,
        dry_run: body.dry_run,
    };

    let run_id = Uuid::now_v7();
    {
        let mut runs = services.migration_runs.write().unwrap();
        runs.insert(
            run_id,
            MigrationRun {
                id: run_id,
                config: config.clone(),
                state: MigrationState::Draft,
                report: None,
            },
        );
    }

    let tenant_id = tenant.tenant_id();
    let runs = services.migration_runs.clone();
    // One ledger per tenant, derived from the tenant id.
    let ledger_id = LedgerId::new(AggregateId::from_uuid(*tenant_id.as_uuid()));

    tokio::spawn(async move {
        {
            let mut runs = runs.write().unwrap();
            if let Some(run) = runs.get_mut(&run_id) {
                run.state = MigrationState::InProgress {
                    stage: run.config.stages[0],
                };
            }
        }

        let result = runner.run(tenant_id, ledger_id, config).await;

        let mut runs = runs.write().unwrap();
        if let Some(run) = runs.get_mut(&run_id) {
            match result {
                Ok(report) => {
                    run.state = MigrationState::Completed;
                    run.report = Some(report);
                }
                Err(e) => {
                    run.state = MigrationState::Failed {
                        error: e.to_string(),
                    };
                }
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": run_id.to_string() })),
    )
        .into_response()
}

pub async fn list_migrations(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let runs = services.migration_runs.read().unwrap();
    let mut all: Vec<MigrationRun> = runs.values().cloned().collect();
    all.sort_by_key(|r| r.id);
    Json(all).into_response()
}

pub async fn get_migration(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(run_id) = Uuid::parse_str(&id) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid migration id");
    };

    let runs = services.migration_runs.read().unwrap();
    match runs.get(&run_id) {
        Some(run) => Json(run.clone()).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "migration not found"),
    }
}

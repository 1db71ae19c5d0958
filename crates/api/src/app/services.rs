//! Service wiring for the API.
//!
//! Event store, bus, dispatcher and projections are composed here; route
//! handlers only see [`AppServices`]. This wiring uses the in-memory
//! backends; a deployment swaps in `PostgresEventStore` with the same
//! dispatcher and projection code.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use verenigingen_core::{Aggregate, AggregateId, DomainError, TenantId};
use verenigingen_events::{EventBus, EventEnvelope, InMemoryEventBus};
use verenigingen_infra::boekhouden::{
    BoekhoudenClient, MigrationConfig, MigrationReport, MigrationRunner, MigrationState,
};
use verenigingen_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use verenigingen_infra::event_store::{InMemoryEventStore, StoredEvent};
use verenigingen_infra::jobs::InMemoryJobStore;
use verenigingen_infra::projections::{
    BatchStatusProjection, BatchStatusReadModel, DuesCoverageProjection,
    MemberDirectoryProjection, MemberReadModel, OpenInvoiceReadModel, OpenInvoicesProjection,
};
use verenigingen_infra::read_model::InMemoryTenantStore;
use verenigingen_invoicing::InvoiceId;
use verenigingen_membership::MemberId;
use verenigingen_sepa::DirectDebitBatchId;
use verenigingen_sepa::pain008::CreditorInfo;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

pub type MembersProjection =
    MemberDirectoryProjection<Arc<InMemoryTenantStore<MemberId, MemberReadModel>>>;
pub type InvoicesProjection =
    OpenInvoicesProjection<Arc<InMemoryTenantStore<InvoiceId, OpenInvoiceReadModel>>>;
pub type BatchesProjection =
    BatchStatusProjection<Arc<InMemoryTenantStore<DirectDebitBatchId, BatchStatusReadModel>>>;

/// One tracked migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRun {
    pub id: Uuid,
    pub config: MigrationConfig,
    pub state: MigrationState,
    pub report: Option<MigrationReport>,
}

pub struct AppServices {
    dispatcher: Dispatcher,
    pub event_bus: Bus,
    pub members: Arc<MembersProjection>,
    pub invoices: Arc<InvoicesProjection>,
    pub batches: Arc<BatchesProjection>,
    pub coverage: Arc<DuesCoverageProjection>,
    pub jobs: Arc<InMemoryJobStore>,
    pub migration_runner: Option<Arc<MigrationRunner<Arc<InMemoryEventStore>, Bus>>>,
    pub migration_runs: Arc<RwLock<HashMap<Uuid, MigrationRun>>>,
    pub creditor: CreditorInfo,
}

impl AppServices {
    /// Dispatch a command through the event-sourcing pipeline.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: verenigingen_events::Event + Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher
            .dispatch::<A>(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)
    }

    /// Rehydrate an aggregate for query-side use (pain.008 rendering).
    pub fn rehydrate<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: verenigingen_events::Event + Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher
            .rehydrate::<A>(tenant_id, aggregate_id, make_aggregate)
    }
}

fn creditor_from_env() -> CreditorInfo {
    let iban = std::env::var("SEPA_CREDITOR_IBAN")
        .ok()
        .and_then(|raw| verenigingen_sepa::Iban::parse(&raw).ok())
        .unwrap_or_else(|| {
            verenigingen_sepa::Iban::parse("NL91ABNA0417164300")
                .expect("built-in creditor IBAN is valid")
        });

    CreditorInfo {
        name: std::env::var("SEPA_CREDITOR_NAME").unwrap_or_else(|_| "Vereniging".to_string()),
        iban,
        bic: std::env::var("SEPA_CREDITOR_BIC").unwrap_or_else(|_| "ABNANL2A".to_string()),
        creditor_id: std::env::var("SEPA_CREDITOR_ID")
            .unwrap_or_else(|_| "NL13ZZZ123456780000".to_string()),
    }
}

/// Wire stores, bus, dispatcher, projections and the background subscriber.
pub async fn build_services() -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store.clone(), bus.clone());

    let members: Arc<MembersProjection> = Arc::new(MemberDirectoryProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let invoices: Arc<InvoicesProjection> = Arc::new(OpenInvoicesProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let batches: Arc<BatchesProjection> = Arc::new(BatchStatusProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let coverage = Arc::new(DuesCoverageProjection::new());

    // Background subscriber: bus -> projections.
    {
        let sub = bus.subscribe();
        let members = members.clone();
        let invoices = invoices.clone();
        let batches = batches.clone();
        let coverage = coverage.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        let apply_ok = match env.aggregate_type() {
                            "membership.member" => {
                                members.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            "membership.membership" | "dues.schedule" => {
                                coverage.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            "invoicing.invoice" => {
                                invoices.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            "sepa.batch" => {
                                batches.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            _ => Ok(()),
                        };
                        if let Err(e) = apply_ok {
                            tracing::warn!(error = %e, "projection apply failed");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    // eBoekhouden migration runner: only wired when credentials exist.
    let migration_runner = match (
        std::env::var("EBOEKHOUDEN_API_URL"),
        std::env::var("EBOEKHOUDEN_API_TOKEN"),
    ) {
        (Ok(url), Ok(token)) => {
            let client = BoekhoudenClient::new(url, token);
            let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
            Some(Arc::new(MigrationRunner::new(client, dispatcher)))
        }
        _ => {
            tracing::info!("eBoekhouden credentials not configured; migration routes disabled");
            None
        }
    };

    AppServices {
        dispatcher,
        event_bus: bus,
        members,
        invoices,
        batches,
        coverage,
        jobs: InMemoryJobStore::arc(),
        migration_runner,
        migration_runs: Arc::new(RwLock::new(HashMap::new())),
        creditor: creditor_from_env(),
    }
}

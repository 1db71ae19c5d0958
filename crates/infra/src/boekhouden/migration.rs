//! Staged eBoekhouden migration runner.
//!
//! A migration run imports one administration into the local ledger in
//! stages: chart of accounts → opening balances → mutations. Stages are
//! individually selectable and the whole run supports dry-run. At most one
//! migration runs per administration at a time; a second start for the same
//! administration is refused until the first finishes.
//!
//! Idempotency: each mutation maps to a deterministic journal-entry id, so
//! re-running a migration skips everything the ledger already holds instead
//! of double-posting.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use verenigingen_accounting::{
    Account, AccountKind, AccountMapping, JournalCommand, Ledger, LedgerId, Mutation,
    MutationType, PostJournalEntry, map_mutation_to_journal_lines,
};
use verenigingen_core::TenantId;
use verenigingen_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

use super::client::{BoekhoudenClient, BoekhoudenError, LedgerAccountDto};

/// One stage of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    ChartOfAccounts,
    OpeningBalances,
    Mutations,
}

impl core::fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            MigrationStage::ChartOfAccounts => "chart_of_accounts",
            MigrationStage::OpeningBalances => "opening_balances",
            MigrationStage::Mutations => "mutations",
        };
        f.write_str(s)
    }
}

/// Migration run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Upstream administration identifier (the concurrency unit).
    pub administration: String,
    pub stages: Vec<MigrationStage>,
    /// Import mutations from this date (inclusive) only.
    pub date_from: Option<NaiveDate>,
    /// Walk everything, post nothing.
    pub dry_run: bool,
}

/// Migration lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Draft,
    InProgress { stage: MigrationStage },
    Completed,
    Failed { error: String },
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub accounts_mapped: usize,
    pub mutations_imported: usize,
    pub mutations_skipped: usize,
    pub mutations_already_imported: usize,
    /// Upstream ledger codes that fell back to default accounts.
    pub unmapped_ledgers: Vec<i64>,
    /// Data errors, recorded and skipped (not retried).
    pub errors: Vec<String>,
    pub dry_run: bool,
}

/// Runs migrations against a dispatcher + client pair.
pub struct MigrationRunner<S, B> {
    client: BoekhoudenClient,
    dispatcher: Arc<CommandDispatcher<S, B>>,
    running: Mutex<HashSet<String>>,
}

/// Clears the per-administration slot when a run ends, however it ends.
struct RunGuard<'a> {
    running: &'a Mutex<HashSet<String>>,
    administration: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.administration);
        }
    }
}

impl<S, B> MigrationRunner<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(client: BoekhoudenClient, dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self {
            client,
            dispatcher,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Run a migration. Refuses a second concurrent run for the same
    /// administration.
    pub async fn run(
        &self,
        tenant_id: TenantId,
        ledger_id: LedgerId,
        config: MigrationConfig,
    ) -> Result<MigrationReport, BoekhoudenError> {
        {
            let mut running = self
                .running
                .lock()
                .map_err(|_| BoekhoudenError::Data("migration registry poisoned".to_string()))?;
            if !running.insert(config.administration.clone()) {
                return Err(BoekhoudenError::Data(format!(
                    "a migration for administration '{}' is already running",
                    config.administration
                )));
            }
        }
        let _guard = RunGuard {
            running: &self.running,
            administration: config.administration.clone(),
        };

        let mut report = MigrationReport {
            dry_run: config.dry_run,
            ..Default::default()
        };
        let mut mapping = AccountMapping::new();

        if config.stages.contains(&MigrationStage::ChartOfAccounts) {
            info!(administration = %config.administration, "migration stage: chart of accounts");
            let accounts = self.client.fetch_ledger_accounts().await?;
            for dto in &accounts {
                mapping.insert(dto.id, account_from_dto(dto));
            }
            report.accounts_mapped = accounts.len();
        }

        let import_opening = config.stages.contains(&MigrationStage::OpeningBalances);
        let import_mutations = config.stages.contains(&MigrationStage::Mutations);

        if import_opening || import_mutations {
            info!(administration = %config.administration, "migration stage: mutations");
            let mutations = self.client.fetch_mutations(config.date_from).await?;

            for mutation in &mutations {
                let wanted = match mutation.mutation_type {
                    MutationType::OpeningBalance => import_opening,
                    _ => import_mutations,
                };
                if !wanted {
                    continue;
                }

                if mutation.should_skip() {
                    report.mutations_skipped += 1;
                    continue;
                }

                match self.import_mutation(tenant_id, ledger_id, mutation, &mapping, &config, &mut report) {
                    Ok(true) => report.mutations_imported += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(mutation_id = mutation.id, error = %e, "mutation import failed");
                        report.errors.push(format!("mutation {}: {e}", mutation.id));
                    }
                }
            }
        }

        Ok(report)
    }

    /// Import one mutation. Returns Ok(true) when posted, Ok(false) when it
    /// was already in the ledger or this is a dry run.
    fn import_mutation(
        &self,
        tenant_id: TenantId,
        ledger_id: LedgerId,
        mutation: &Mutation,
        mapping: &AccountMapping,
        config: &MigrationConfig,
        report: &mut MigrationReport,
    ) -> Result<bool, String> {
        let (lines, unmapped) =
            map_mutation_to_journal_lines(mutation, mapping).map_err(|e| e.to_string())?;
        for code in unmapped {
            if !report.unmapped_ledgers.contains(&code) {
                report.unmapped_ledgers.push(code);
            }
        }

        if config.dry_run {
            return Ok(false);
        }

        let cmd = JournalCommand::PostJournalEntry(PostJournalEntry {
            tenant_id,
            ledger_id,
            entry_id: entry_id_for_mutation(&config.administration, mutation.id),
            lines,
            description: mutation.description.clone(),
            occurred_at: Utc::now(),
        });

        match self.dispatcher.dispatch::<Ledger>(
            tenant_id,
            ledger_id.0,
            "accounting.ledger",
            cmd,
            |_t, aggregate_id| Ledger::empty(LedgerId::new(aggregate_id)),
        ) {
            Ok(_) => Ok(true),
            // The deterministic entry id makes a re-import a conflict, which
            // is the idempotent skip path.
            Err(DispatchError::Concurrency(_)) => {
                report.mutations_already_imported += 1;
                Ok(false)
            }
            Err(e) => Err(format!("{e:?}")),
        }
    }
}

/// Deterministic journal-entry id per (administration, mutation id).
fn entry_id_for_mutation(administration: &str, mutation_id: i64) -> Uuid {
    let mut admin_hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in administration.bytes() {
        admin_hash ^= u64::from(byte);
        admin_hash = admin_hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    Uuid::from_u64_pair(admin_hash, mutation_id as u64)
}

/// Translate an upstream chart-of-accounts entry into a local account.
///
/// The upstream category drives the kind: "BAL" accounts split into assets
/// and liabilities by code range (Dutch decimal chart convention), "VW"
/// accounts split into expenses (4xxx–7xxx) and revenue (8xxx+).
fn account_from_dto(dto: &LedgerAccountDto) -> Account {
    let leading_digit = dto.code.chars().next().and_then(|c| c.to_digit(10));
    let kind = match (dto.category.as_str(), leading_digit) {
        ("BAL", Some(0..=1)) => AccountKind::Asset,
        ("BAL", Some(2..=3)) => AccountKind::Liability,
        ("BAL", _) => AccountKind::Asset,
        ("VW", Some(8..=9)) => AccountKind::Revenue,
        ("VW", _) => AccountKind::Expense,
        (_, Some(0..=1)) => AccountKind::Asset,
        (_, Some(8..=9)) => AccountKind::Revenue,
        _ => AccountKind::Expense,
    };

    Account {
        code: dto.code.clone(),
        name: if dto.description.is_empty() {
            format!("Account {}", dto.code)
        } else {
            dto.description.clone()
        },
        kind,
    }
}

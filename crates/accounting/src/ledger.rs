use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use verenigingen_events::Event;

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Account identifier + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1100"
    pub name: String, // e.g. "Bank"
    pub kind: AccountKind,
}

/// One side of a journal entry (immutable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account: Account,
    /// Positive amount in eurocents.
    pub amount: i64,
    /// true = debit, false = credit.
    pub is_debit: bool,
}

/// Ledger identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Ledger (double-entry journal).
///
/// The ledger tracks identity, tenant, and which entry ids were posted
/// (idempotent import); balances are derived from projections over
/// `JournalEntryPosted` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    tenant_id: Option<TenantId>,
    posted_entries: HashSet<Uuid>,
    version: u64,
    created: bool,
}

impl Ledger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            posted_entries: HashSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn has_entry(&self, entry_id: Uuid) -> bool {
        self.posted_entries.contains(&entry_id)
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    /// Caller-supplied entry id; re-posting the same id is a conflict,
    /// which is what makes imports idempotent.
    pub entry_id: Uuid,
    pub lines: Vec<JournalEntryLine>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    PostJournalEntry(PostJournalEntry),
}

/// Event: JournalEntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: Uuid,
    pub lines: Vec<JournalEntryLine>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    JournalEntryPosted(JournalEntryPosted),
}

impl Event for JournalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEvent::JournalEntryPosted(_) => "accounting.ledger.journal_entry_posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEvent::JournalEntryPosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = JournalCommand;
    type Event = JournalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEvent::JournalEntryPosted(e) => {
                self.id = e.ledger_id;
                self.tenant_id = Some(e.tenant_id);
                self.posted_entries.insert(e.entry_id);
                self.created = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::PostJournalEntry(cmd) => self.handle_post(cmd),
        }
    }
}

impl Ledger {
    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<JournalEvent>, DomainError> {
        if self.created && self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.has_entry(cmd.entry_id) {
            return Err(DomainError::conflict(format!(
                "entry {} was already posted",
                cmd.entry_id
            )));
        }
        if cmd.lines.len() < 2 {
            return Err(DomainError::validation(
                "a journal entry needs at least two lines",
            ));
        }

        let mut debits: i64 = 0;
        let mut credits: i64 = 0;
        for line in &cmd.lines {
            if line.amount <= 0 {
                return Err(DomainError::validation("line amounts must be positive"));
            }
            if line.is_debit {
                debits += line.amount;
            } else {
                credits += line.amount;
            }
        }
        if debits != credits {
            return Err(DomainError::invariant(format!(
                "entry is unbalanced (debits {debits}, credits {credits})"
            )));
        }

        Ok(vec![JournalEvent::JournalEntryPosted(JournalEntryPosted {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            entry_id: cmd.entry_id,
            lines: cmd.lines.clone(),
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

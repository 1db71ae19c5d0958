use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use verenigingen_events::Event;
use verenigingen_invoicing::InvoiceId;
use verenigingen_membership::MemberId;

use crate::calendar::next_collection_date;
use crate::iban::Iban;
use crate::mandate::SequenceType;

/// Batch identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectDebitBatchId(pub AggregateId);

impl DirectDebitBatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DirectDebitBatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    /// Regular dues collection (mostly RCUR entries).
    Recurring,
    /// One-off collections.
    OneOff,
}

/// Batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Draft,
    Validated,
    /// pain.008 file produced.
    Generated,
    Submitted,
    /// All entries collected.
    Processed,
    /// Some entries failed.
    PartiallyProcessed,
    /// Every entry failed.
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Processed
                | BatchStatus::PartiallyProcessed
                | BatchStatus::Failed
                | BatchStatus::Cancelled
        )
    }
}

/// Outcome of a single entry after bank processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    Collected,
    /// Returned/refused by the bank, with the ISO reason code (e.g. "AC04").
    Failed { reason_code: Option<String> },
}

/// One invoice's collection within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub invoice_id: InvoiceId,
    pub member_id: MemberId,
    pub member_name: String,
    pub amount: Money,
    pub iban: Iban,
    pub bic: Option<String>,
    pub mandate_reference: String,
    pub mandate_sign_date: NaiveDate,
    pub sequence_type: SequenceType,
    pub outcome: Option<EntryOutcome>,
}

/// Aggregate root: DirectDebitBatch.
///
/// Collects a set of unpaid dues invoices for one collection date, carries
/// them through validation, file generation and submission, and records the
/// per-entry outcomes the bank reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectDebitBatch {
    id: DirectDebitBatchId,
    tenant_id: Option<TenantId>,
    batch_type: BatchType,
    collection_date: Option<NaiveDate>,
    entries: Vec<BatchEntry>,
    status: BatchStatus,
    message_id: Option<String>,
    version: u64,
    created: bool,
}

impl DirectDebitBatch {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DirectDebitBatchId) -> Self {
        Self {
            id,
            tenant_id: None,
            batch_type: BatchType::Recurring,
            collection_date: None,
            entries: Vec::new(),
            status: BatchStatus::Draft,
            message_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DirectDebitBatchId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn batch_type(&self) -> BatchType {
        self.batch_type
    }

    pub fn collection_date(&self) -> Option<NaiveDate> {
        self.collection_date
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Control sum over all entries.
    pub fn total_amount(&self) -> Money {
        self.entries.iter().map(|e| e.amount).sum()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn entry_index(&self, invoice_id: InvoiceId) -> Option<usize> {
        self.entries.iter().position(|e| e.invoice_id == invoice_id)
    }
}

impl AggregateRoot for DirectDebitBatch {
    type Id = DirectDebitBatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub batch_type: BatchType,
    /// Requested date; rolled forward to the next business day.
    pub collection_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEntry {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub invoice_id: InvoiceId,
    pub member_id: MemberId,
    pub member_name: String,
    pub amount: Money,
    /// Raw IBAN; validated here.
    pub iban: String,
    pub bic: Option<String>,
    pub mandate_reference: String,
    pub mandate_sign_date: NaiveDate,
    pub sequence_type: SequenceType,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ValidateBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateBatch {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkGenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkGenerated {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    /// pain.008 message id (`MsgId`).
    pub message_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitBatch {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordEntryOutcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntryOutcome {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub invoice_id: InvoiceId,
    pub outcome: EntryOutcome,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseBatch {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBatch {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectDebitBatchCommand {
    CreateBatch(CreateBatch),
    AddEntry(AddEntry),
    ValidateBatch(ValidateBatch),
    MarkGenerated(MarkGenerated),
    SubmitBatch(SubmitBatch),
    RecordEntryOutcome(RecordEntryOutcome),
    CloseBatch(CloseBatch),
    CancelBatch(CancelBatch),
}

/// Event: BatchCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreated {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub batch_type: BatchType,
    /// Business-day adjusted collection date.
    pub collection_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAdded {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub entry: BatchEntry,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchValidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchValidated {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub entry_count: u32,
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchGenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchGenerated {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub message_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSubmitted {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryOutcomeRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcomeRecorded {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub invoice_id: InvoiceId,
    pub member_id: MemberId,
    pub amount: Money,
    pub outcome: EntryOutcome,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchClosed {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub final_status: BatchStatus,
    pub collected_count: u32,
    pub failed_count: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCancelled {
    pub tenant_id: TenantId,
    pub batch_id: DirectDebitBatchId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectDebitBatchEvent {
    BatchCreated(BatchCreated),
    EntryAdded(EntryAdded),
    BatchValidated(BatchValidated),
    BatchGenerated(BatchGenerated),
    BatchSubmitted(BatchSubmitted),
    EntryOutcomeRecorded(EntryOutcomeRecorded),
    BatchClosed(BatchClosed),
    BatchCancelled(BatchCancelled),
}

impl Event for DirectDebitBatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DirectDebitBatchEvent::BatchCreated(_) => "sepa.batch.created",
            DirectDebitBatchEvent::EntryAdded(_) => "sepa.batch.entry_added",
            DirectDebitBatchEvent::BatchValidated(_) => "sepa.batch.validated",
            DirectDebitBatchEvent::BatchGenerated(_) => "sepa.batch.generated",
            DirectDebitBatchEvent::BatchSubmitted(_) => "sepa.batch.submitted",
            DirectDebitBatchEvent::EntryOutcomeRecorded(_) => "sepa.batch.entry_outcome_recorded",
            DirectDebitBatchEvent::BatchClosed(_) => "sepa.batch.closed",
            DirectDebitBatchEvent::BatchCancelled(_) => "sepa.batch.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DirectDebitBatchEvent::BatchCreated(e) => e.occurred_at,
            DirectDebitBatchEvent::EntryAdded(e) => e.occurred_at,
            DirectDebitBatchEvent::BatchValidated(e) => e.occurred_at,
            DirectDebitBatchEvent::BatchGenerated(e) => e.occurred_at,
            DirectDebitBatchEvent::BatchSubmitted(e) => e.occurred_at,
            DirectDebitBatchEvent::EntryOutcomeRecorded(e) => e.occurred_at,
            DirectDebitBatchEvent::BatchClosed(e) => e.occurred_at,
            DirectDebitBatchEvent::BatchCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DirectDebitBatch {
    type Command = DirectDebitBatchCommand;
    type Event = DirectDebitBatchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DirectDebitBatchEvent::BatchCreated(e) => {
                self.id = e.batch_id;
                self.tenant_id = Some(e.tenant_id);
                self.batch_type = e.batch_type;
                self.collection_date = Some(e.collection_date);
                self.status = BatchStatus::Draft;
                self.created = true;
            }
            DirectDebitBatchEvent::EntryAdded(e) => {
                self.entries.push(e.entry.clone());
                // Adding an entry invalidates a prior validation pass.
                self.status = BatchStatus::Draft;
            }
            DirectDebitBatchEvent::BatchValidated(_) => {
                self.status = BatchStatus::Validated;
            }
            DirectDebitBatchEvent::BatchGenerated(e) => {
                self.message_id = Some(e.message_id.clone());
                self.status = BatchStatus::Generated;
            }
            DirectDebitBatchEvent::BatchSubmitted(_) => {
                self.status = BatchStatus::Submitted;
            }
            DirectDebitBatchEvent::EntryOutcomeRecorded(e) => {
                if let Some(idx) = self.entry_index(e.invoice_id) {
                    self.entries[idx].outcome = Some(e.outcome.clone());
                }
            }
            DirectDebitBatchEvent::BatchClosed(e) => {
                self.status = e.final_status;
            }
            DirectDebitBatchEvent::BatchCancelled(_) => {
                self.status = BatchStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DirectDebitBatchCommand::CreateBatch(cmd) => self.handle_create(cmd),
            DirectDebitBatchCommand::AddEntry(cmd) => self.handle_add_entry(cmd),
            DirectDebitBatchCommand::ValidateBatch(cmd) => self.handle_validate(cmd),
            DirectDebitBatchCommand::MarkGenerated(cmd) => self.handle_generated(cmd),
            DirectDebitBatchCommand::SubmitBatch(cmd) => self.handle_submit(cmd),
            DirectDebitBatchCommand::RecordEntryOutcome(cmd) => self.handle_outcome(cmd),
            DirectDebitBatchCommand::CloseBatch(cmd) => self.handle_close(cmd),
            DirectDebitBatchCommand::CancelBatch(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl DirectDebitBatch {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::invariant("batch is in a terminal state"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBatch) -> Result<Vec<DirectDebitBatchEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("batch already exists"));
        }

        Ok(vec![DirectDebitBatchEvent::BatchCreated(BatchCreated {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            batch_type: cmd.batch_type,
            collection_date: next_collection_date(cmd.collection_date),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_entry(&self, cmd: &AddEntry) -> Result<Vec<DirectDebitBatchEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if !matches!(self.status, BatchStatus::Draft | BatchStatus::Validated) {
            return Err(DomainError::invariant(
                "entries can only be added before generation",
            ));
        }
        if self.entry_index(cmd.invoice_id).is_some() {
            return Err(DomainError::conflict(format!(
                "invoice {} is already in this batch",
                cmd.invoice_id
            )));
        }
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("entry amount must be positive"));
        }
        if cmd.mandate_reference.trim().is_empty() {
            return Err(DomainError::validation("mandate reference is required"));
        }

        let iban = Iban::parse(&cmd.iban)?;

        Ok(vec![DirectDebitBatchEvent::EntryAdded(EntryAdded {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            entry: BatchEntry {
                invoice_id: cmd.invoice_id,
                member_id: cmd.member_id,
                member_name: cmd.member_name.clone(),
                amount: cmd.amount,
                iban,
                bic: cmd.bic.clone(),
                mandate_reference: cmd.mandate_reference.clone(),
                mandate_sign_date: cmd.mandate_sign_date,
                sequence_type: cmd.sequence_type,
                outcome: None,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_validate(
        &self,
        cmd: &ValidateBatch,
    ) -> Result<Vec<DirectDebitBatchEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status != BatchStatus::Draft {
            return Err(DomainError::conflict("batch is not in draft"));
        }
        if self.entries.is_empty() {
            return Err(DomainError::invariant("batch has no entries"));
        }

        Ok(vec![DirectDebitBatchEvent::BatchValidated(BatchValidated {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            entry_count: self.entries.len() as u32,
            total_amount: self.total_amount(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_generated(
        &self,
        cmd: &MarkGenerated,
    ) -> Result<Vec<DirectDebitBatchEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status != BatchStatus::Validated {
            return Err(DomainError::invariant("batch must be validated before generation"));
        }
        if cmd.message_id.trim().is_empty() {
            return Err(DomainError::validation("message id cannot be empty"));
        }

        Ok(vec![DirectDebitBatchEvent::BatchGenerated(BatchGenerated {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            message_id: cmd.message_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitBatch) -> Result<Vec<DirectDebitBatchEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status != BatchStatus::Generated {
            return Err(DomainError::invariant("batch must be generated before submission"));
        }

        Ok(vec![DirectDebitBatchEvent::BatchSubmitted(BatchSubmitted {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_outcome(
        &self,
        cmd: &RecordEntryOutcome,
    ) -> Result<Vec<DirectDebitBatchEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status != BatchStatus::Submitted {
            return Err(DomainError::invariant("outcomes arrive after submission"));
        }

        let Some(idx) = self.entry_index(cmd.invoice_id) else {
            return Err(DomainError::not_found());
        };
        let entry = &self.entries[idx];
        if entry.outcome.is_some() {
            return Err(DomainError::conflict(format!(
                "outcome for invoice {} was already recorded",
                cmd.invoice_id
            )));
        }

        Ok(vec![DirectDebitBatchEvent::EntryOutcomeRecorded(
            EntryOutcomeRecorded {
                tenant_id: cmd.tenant_id,
                batch_id: cmd.batch_id,
                invoice_id: cmd.invoice_id,
                member_id: entry.member_id,
                amount: entry.amount,
                outcome: cmd.outcome.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_close(&self, cmd: &CloseBatch) -> Result<Vec<DirectDebitBatchEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status != BatchStatus::Submitted {
            return Err(DomainError::invariant("only submitted batches can be closed"));
        }
        if self.entries.iter().any(|e| e.outcome.is_none()) {
            return Err(DomainError::invariant(
                "all entries need an outcome before closing",
            ));
        }

        let collected = self
            .entries
            .iter()
            .filter(|e| matches!(e.outcome, Some(EntryOutcome::Collected)))
            .count() as u32;
        let failed = self.entries.len() as u32 - collected;

        let final_status = if failed == 0 {
            BatchStatus::Processed
        } else if collected == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::PartiallyProcessed
        };

        Ok(vec![DirectDebitBatchEvent::BatchClosed(BatchClosed {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            final_status,
            collected_count: collected,
            failed_count: failed,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelBatch) -> Result<Vec<DirectDebitBatchEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;

        Ok(vec![DirectDebitBatchEvent::BatchCancelled(BatchCancelled {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

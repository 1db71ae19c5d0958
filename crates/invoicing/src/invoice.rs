use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use verenigingen_dues::DuesScheduleId;
use verenigingen_events::Event;
use verenigingen_membership::MemberId;

/// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Open,
    Paid,
    Void,
}

/// Aggregate root: DuesInvoice.
///
/// One invoice covers one date range of a member's dues schedule
/// (`coverage_start ..= coverage_end`). The coverage engine and the SEPA
/// batch builder both work off these ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuesInvoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    member_id: Option<MemberId>,
    schedule_id: Option<DuesScheduleId>,
    status: InvoiceStatus,
    amount: Money,
    total_paid: Money,
    due_date: Option<NaiveDate>,
    coverage_start: Option<NaiveDate>,
    coverage_end: Option<NaiveDate>,
    version: u64,
    created: bool,
}

impl DuesInvoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            member_id: None,
            schedule_id: None,
            status: InvoiceStatus::Open,
            amount: Money::ZERO,
            total_paid: Money::ZERO,
            due_date: None,
            coverage_start: None,
            coverage_end: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn member_id(&self) -> Option<MemberId> {
        self.member_id
    }

    pub fn schedule_id(&self) -> Option<DuesScheduleId> {
        self.schedule_id
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn total_paid(&self) -> Money {
        self.total_paid
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn coverage(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.coverage_start, self.coverage_end) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        }
    }

    pub fn outstanding_amount(&self) -> Money {
        self.amount.saturating_sub(self.total_paid)
    }

    /// Invariant: void invoices and settled invoices accept no payment.
    pub fn can_accept_payment(&self) -> bool {
        self.status != InvoiceStatus::Void && self.outstanding_amount().is_positive()
    }
}

impl AggregateRoot for DuesInvoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub member_id: MemberId,
    pub schedule_id: DuesScheduleId,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub coverage_start: NaiveDate,
    pub coverage_end: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuesInvoiceCommand {
    IssueInvoice(IssueInvoice),
    RegisterPayment(RegisterPayment),
    VoidInvoice(VoidInvoice),
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub member_id: MemberId,
    pub schedule_id: DuesScheduleId,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub coverage_start: NaiveDate,
    pub coverage_end: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    /// Outstanding amount after this payment.
    pub outstanding_after: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVoided {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuesInvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    PaymentRegistered(PaymentRegistered),
    InvoiceVoided(InvoiceVoided),
}

impl Event for DuesInvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DuesInvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            DuesInvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
            DuesInvoiceEvent::InvoiceVoided(_) => "invoicing.invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DuesInvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            DuesInvoiceEvent::PaymentRegistered(e) => e.occurred_at,
            DuesInvoiceEvent::InvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DuesInvoice {
    type Command = DuesInvoiceCommand;
    type Event = DuesInvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DuesInvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.member_id = Some(e.member_id);
                self.schedule_id = Some(e.schedule_id);
                self.amount = e.amount;
                self.total_paid = Money::ZERO;
                self.due_date = Some(e.due_date);
                self.coverage_start = Some(e.coverage_start);
                self.coverage_end = Some(e.coverage_end);
                self.status = InvoiceStatus::Open;
                self.created = true;
            }
            DuesInvoiceEvent::PaymentRegistered(e) => {
                self.total_paid = self
                    .total_paid
                    .checked_add(e.amount)
                    .unwrap_or(self.total_paid);
                if !self.outstanding_amount().is_positive() {
                    self.status = InvoiceStatus::Paid;
                }
            }
            DuesInvoiceEvent::InvoiceVoided(_) => {
                self.status = InvoiceStatus::Void;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DuesInvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            DuesInvoiceCommand::RegisterPayment(cmd) => self.handle_payment(cmd),
            DuesInvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

impl DuesInvoice {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<DuesInvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("invoice amount must be positive"));
        }
        if cmd.coverage_end < cmd.coverage_start {
            return Err(DomainError::validation(
                "coverage end cannot precede coverage start",
            ));
        }

        Ok(vec![DuesInvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            member_id: cmd.member_id,
            schedule_id: cmd.schedule_id,
            amount: cmd.amount,
            due_date: cmd.due_date,
            coverage_start: cmd.coverage_start,
            coverage_end: cmd.coverage_end,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RegisterPayment) -> Result<Vec<DuesInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == InvoiceStatus::Void {
            return Err(DomainError::invariant("void invoices accept no payments"));
        }
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        let outstanding = self.outstanding_amount();
        if cmd.amount > outstanding {
            return Err(DomainError::validation(format!(
                "payment {} exceeds outstanding {}",
                cmd.amount, outstanding
            )));
        }

        Ok(vec![DuesInvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            amount: cmd.amount,
            outstanding_after: outstanding.saturating_sub(cmd.amount),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> Result<Vec<DuesInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == InvoiceStatus::Void {
            return Err(DomainError::conflict("invoice is already void"));
        }
        if self.total_paid.is_positive() {
            return Err(DomainError::invariant(
                "invoices with registered payments cannot be voided",
            ));
        }

        Ok(vec![DuesInvoiceEvent::InvoiceVoided(InvoiceVoided {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

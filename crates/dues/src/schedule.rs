use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use verenigingen_events::Event;
use verenigingen_membership::MemberId;

/// Dues schedule identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuesScheduleId(pub AggregateId);

impl DuesScheduleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DuesScheduleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How often a member is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingFrequency {
    Daily,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl BillingFrequency {
    /// Advance a date by one billing period.
    ///
    /// Month-based frequencies clamp to the last day of a short month
    /// (Jan 31 + 1 month = Feb 28/29).
    pub fn advance(&self, date: NaiveDate) -> NaiveDate {
        match self {
            BillingFrequency::Daily => date.succ_opt().unwrap_or(date),
            BillingFrequency::Monthly => date + Months::new(1),
            BillingFrequency::Quarterly => date + Months::new(3),
            BillingFrequency::SemiAnnual => date + Months::new(6),
            BillingFrequency::Annual => date + Months::new(12),
        }
    }

    /// End of the billing period that starts on `start` (inclusive).
    pub fn period_end(&self, start: NaiveDate) -> NaiveDate {
        self.advance(start).pred_opt().unwrap_or(start)
    }
}

impl core::fmt::Display for BillingFrequency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            BillingFrequency::Daily => "daily",
            BillingFrequency::Monthly => "monthly",
            BillingFrequency::Quarterly => "quarterly",
            BillingFrequency::SemiAnnual => "semi_annual",
            BillingFrequency::Annual => "annual",
        };
        f.write_str(s)
    }
}

/// Schedule lifecycle.
///
/// `GracePeriod` and `Suspended` come out of the failed-collection policy:
/// each failed debit bumps the consecutive-failure counter; below three the
/// member gets a 14-day grace window, at three the schedule suspends until
/// staff intervene or a payment recovers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    GracePeriod { until: NaiveDate },
    Suspended,
    Cancelled,
}

/// Grace window granted after a failed collection, in days.
pub const GRACE_PERIOD_DAYS: u32 = 14;

/// Consecutive failures after which a schedule suspends.
pub const SUSPENSION_FAILURE_THRESHOLD: u32 = 3;

/// Default lead time for generating invoices ahead of their due date, days.
pub const DEFAULT_INVOICE_LEAD_DAYS: u32 = 30;

/// Aggregate root: DuesSchedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuesSchedule {
    id: DuesScheduleId,
    tenant_id: Option<TenantId>,
    member_id: Option<MemberId>,
    membership_type: String,
    billing_frequency: BillingFrequency,
    dues_rate: Money,
    next_invoice_date: Option<NaiveDate>,
    invoice_lead_days: u32,
    consecutive_failures: u32,
    status: ScheduleStatus,
    version: u64,
    created: bool,
}

impl DuesSchedule {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DuesScheduleId) -> Self {
        Self {
            id,
            tenant_id: None,
            member_id: None,
            membership_type: String::new(),
            billing_frequency: BillingFrequency::Monthly,
            dues_rate: Money::ZERO,
            next_invoice_date: None,
            invoice_lead_days: DEFAULT_INVOICE_LEAD_DAYS,
            consecutive_failures: 0,
            status: ScheduleStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DuesScheduleId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn member_id(&self) -> Option<MemberId> {
        self.member_id
    }

    pub fn billing_frequency(&self) -> BillingFrequency {
        self.billing_frequency
    }

    pub fn dues_rate(&self) -> Money {
        self.dues_rate
    }

    pub fn next_invoice_date(&self) -> Option<NaiveDate> {
        self.next_invoice_date
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn status(&self) -> ScheduleStatus {
        self.status
    }

    /// Whether an invoice should be generated on `date`.
    ///
    /// True when the schedule is active (grace still bills) and `date` is
    /// within the lead window before `next_invoice_date`.
    pub fn is_due_for_invoicing(&self, date: NaiveDate) -> bool {
        let billable = matches!(
            self.status,
            ScheduleStatus::Active | ScheduleStatus::GracePeriod { .. }
        );
        match (billable, self.next_invoice_date) {
            (true, Some(next)) => {
                let generate_from = next - chrono::Duration::days(i64::from(self.invoice_lead_days));
                date >= generate_from
            }
            _ => false,
        }
    }
}

impl AggregateRoot for DuesSchedule {
    type Id = DuesScheduleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateSchedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSchedule {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub member_id: MemberId,
    pub membership_type: String,
    pub billing_frequency: BillingFrequency,
    pub dues_rate: Money,
    pub first_invoice_date: NaiveDate,
    pub invoice_lead_days: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeRate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRate {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub new_rate: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInvoiceGenerated.
///
/// Issued by the billing run after it creates the coverage invoice; moves
/// `next_invoice_date` forward one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvoiceGenerated {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub coverage_start: NaiveDate,
    pub coverage_end: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPaymentFailure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPaymentFailure {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    /// Bank reason, e.g. "AC04 account closed".
    pub reason: Option<String>,
    /// Date of the failed collection; anchors the grace window.
    pub failed_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPaymentRecovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPaymentRecovered {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendSchedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendSchedule {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResumeSchedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSchedule {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelSchedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSchedule {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuesScheduleCommand {
    CreateSchedule(CreateSchedule),
    ChangeRate(ChangeRate),
    RecordInvoiceGenerated(RecordInvoiceGenerated),
    RecordPaymentFailure(RecordPaymentFailure),
    RecordPaymentRecovered(RecordPaymentRecovered),
    SuspendSchedule(SuspendSchedule),
    ResumeSchedule(ResumeSchedule),
    CancelSchedule(CancelSchedule),
}

/// Event: ScheduleCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleCreated {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub member_id: MemberId,
    pub membership_type: String,
    pub billing_frequency: BillingFrequency,
    pub dues_rate: Money,
    pub first_invoice_date: NaiveDate,
    pub invoice_lead_days: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RateChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateChanged {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub old_rate: Money,
    pub new_rate: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceGenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceGenerated {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub coverage_start: NaiveDate,
    pub coverage_end: NaiveDate,
    pub next_invoice_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentFailureRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailureRecorded {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub reason: Option<String>,
    pub consecutive_failures: u32,
    pub new_status: ScheduleStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecovered {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ScheduleSuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSuspended {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ScheduleResumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleResumed {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ScheduleCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleCancelled {
    pub tenant_id: TenantId,
    pub schedule_id: DuesScheduleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuesScheduleEvent {
    ScheduleCreated(ScheduleCreated),
    RateChanged(RateChanged),
    InvoiceGenerated(InvoiceGenerated),
    PaymentFailureRecorded(PaymentFailureRecorded),
    PaymentRecovered(PaymentRecovered),
    ScheduleSuspended(ScheduleSuspended),
    ScheduleResumed(ScheduleResumed),
    ScheduleCancelled(ScheduleCancelled),
}

impl Event for DuesScheduleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DuesScheduleEvent::ScheduleCreated(_) => "dues.schedule.created",
            DuesScheduleEvent::RateChanged(_) => "dues.schedule.rate_changed",
            DuesScheduleEvent::InvoiceGenerated(_) => "dues.schedule.invoice_generated",
            DuesScheduleEvent::PaymentFailureRecorded(_) => "dues.schedule.payment_failure_recorded",
            DuesScheduleEvent::PaymentRecovered(_) => "dues.schedule.payment_recovered",
            DuesScheduleEvent::ScheduleSuspended(_) => "dues.schedule.suspended",
            DuesScheduleEvent::ScheduleResumed(_) => "dues.schedule.resumed",
            DuesScheduleEvent::ScheduleCancelled(_) => "dues.schedule.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DuesScheduleEvent::ScheduleCreated(e) => e.occurred_at,
            DuesScheduleEvent::RateChanged(e) => e.occurred_at,
            DuesScheduleEvent::InvoiceGenerated(e) => e.occurred_at,
            DuesScheduleEvent::PaymentFailureRecorded(e) => e.occurred_at,
            DuesScheduleEvent::PaymentRecovered(e) => e.occurred_at,
            DuesScheduleEvent::ScheduleSuspended(e) => e.occurred_at,
            DuesScheduleEvent::ScheduleResumed(e) => e.occurred_at,
            DuesScheduleEvent::ScheduleCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DuesSchedule {
    type Command = DuesScheduleCommand;
    type Event = DuesScheduleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DuesScheduleEvent::ScheduleCreated(e) => {
                self.id = e.schedule_id;
                self.tenant_id = Some(e.tenant_id);
                self.member_id = Some(e.member_id);
                self.membership_type = e.membership_type.clone();
                self.billing_frequency = e.billing_frequency;
                self.dues_rate = e.dues_rate;
                self.next_invoice_date = Some(e.first_invoice_date);
                self.invoice_lead_days = e.invoice_lead_days;
                self.status = ScheduleStatus::Active;
                self.created = true;
            }
            DuesScheduleEvent::RateChanged(e) => {
                self.dues_rate = e.new_rate;
            }
            DuesScheduleEvent::InvoiceGenerated(e) => {
                self.next_invoice_date = Some(e.next_invoice_date);
            }
            DuesScheduleEvent::PaymentFailureRecorded(e) => {
                self.consecutive_failures = e.consecutive_failures;
                self.status = e.new_status;
            }
            DuesScheduleEvent::PaymentRecovered(_) => {
                self.consecutive_failures = 0;
                if self.status != ScheduleStatus::Cancelled {
                    self.status = ScheduleStatus::Active;
                }
            }
            DuesScheduleEvent::ScheduleSuspended(_) => {
                self.status = ScheduleStatus::Suspended;
            }
            DuesScheduleEvent::ScheduleResumed(_) => {
                self.consecutive_failures = 0;
                self.status = ScheduleStatus::Active;
            }
            DuesScheduleEvent::ScheduleCancelled(_) => {
                self.status = ScheduleStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DuesScheduleCommand::CreateSchedule(cmd) => self.handle_create(cmd),
            DuesScheduleCommand::ChangeRate(cmd) => self.handle_change_rate(cmd),
            DuesScheduleCommand::RecordInvoiceGenerated(cmd) => self.handle_invoice_generated(cmd),
            DuesScheduleCommand::RecordPaymentFailure(cmd) => self.handle_payment_failure(cmd),
            DuesScheduleCommand::RecordPaymentRecovered(cmd) => self.handle_payment_recovered(cmd),
            DuesScheduleCommand::SuspendSchedule(cmd) => self.handle_suspend(cmd),
            DuesScheduleCommand::ResumeSchedule(cmd) => self.handle_resume(cmd),
            DuesScheduleCommand::CancelSchedule(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl DuesSchedule {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status == ScheduleStatus::Cancelled {
            return Err(DomainError::invariant("schedule is cancelled"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSchedule) -> Result<Vec<DuesScheduleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("schedule already exists"));
        }
        if !cmd.dues_rate.is_positive() {
            return Err(DomainError::validation("dues rate must be positive"));
        }
        if cmd.membership_type.trim().is_empty() {
            return Err(DomainError::validation("membership type cannot be empty"));
        }

        Ok(vec![DuesScheduleEvent::ScheduleCreated(ScheduleCreated {
            tenant_id: cmd.tenant_id,
            schedule_id: cmd.schedule_id,
            member_id: cmd.member_id,
            membership_type: cmd.membership_type.clone(),
            billing_frequency: cmd.billing_frequency,
            dues_rate: cmd.dues_rate,
            first_invoice_date: cmd.first_invoice_date,
            invoice_lead_days: cmd.invoice_lead_days.unwrap_or(DEFAULT_INVOICE_LEAD_DAYS),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_rate(&self, cmd: &ChangeRate) -> Result<Vec<DuesScheduleEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if !cmd.new_rate.is_positive() {
            return Err(DomainError::validation("dues rate must be positive"));
        }
        if cmd.new_rate == self.dues_rate {
            return Err(DomainError::conflict("rate is unchanged"));
        }

        Ok(vec![DuesScheduleEvent::RateChanged(RateChanged {
            tenant_id: cmd.tenant_id,
            schedule_id: cmd.schedule_id,
            old_rate: self.dues_rate,
            new_rate: cmd.new_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_invoice_generated(
        &self,
        cmd: &RecordInvoiceGenerated,
    ) -> Result<Vec<DuesScheduleEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if cmd.coverage_end < cmd.coverage_start {
            return Err(DomainError::validation(
                "coverage end cannot precede coverage start",
            ));
        }

        let next = self
            .billing_frequency
            .advance(self.next_invoice_date.unwrap_or(cmd.coverage_start));

        Ok(vec![DuesScheduleEvent::InvoiceGenerated(InvoiceGenerated {
            tenant_id: cmd.tenant_id,
            schedule_id: cmd.schedule_id,
            coverage_start: cmd.coverage_start,
            coverage_end: cmd.coverage_end,
            next_invoice_date: next,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment_failure(
        &self,
        cmd: &RecordPaymentFailure,
    ) -> Result<Vec<DuesScheduleEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;

        let failures = self.consecutive_failures + 1;
        let new_status = if failures >= SUSPENSION_FAILURE_THRESHOLD {
            ScheduleStatus::Suspended
        } else {
            ScheduleStatus::GracePeriod {
                until: cmd.failed_on + chrono::Duration::days(i64::from(GRACE_PERIOD_DAYS)),
            }
        };

        Ok(vec![DuesScheduleEvent::PaymentFailureRecorded(
            PaymentFailureRecorded {
                tenant_id: cmd.tenant_id,
                schedule_id: cmd.schedule_id,
                reason: cmd.reason.clone(),
                consecutive_failures: failures,
                new_status,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_payment_recovered(
        &self,
        cmd: &RecordPaymentRecovered,
    ) -> Result<Vec<DuesScheduleEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if self.consecutive_failures == 0 && self.status == ScheduleStatus::Active {
            return Err(DomainError::conflict("no failure to recover from"));
        }

        Ok(vec![DuesScheduleEvent::PaymentRecovered(PaymentRecovered {
            tenant_id: cmd.tenant_id,
            schedule_id: cmd.schedule_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendSchedule) -> Result<Vec<DuesScheduleEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if self.status == ScheduleStatus::Suspended {
            return Err(DomainError::conflict("schedule is already suspended"));
        }

        Ok(vec![DuesScheduleEvent::ScheduleSuspended(ScheduleSuspended {
            tenant_id: cmd.tenant_id,
            schedule_id: cmd.schedule_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resume(&self, cmd: &ResumeSchedule) -> Result<Vec<DuesScheduleEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if !matches!(
            self.status,
            ScheduleStatus::Suspended | ScheduleStatus::GracePeriod { .. }
        ) {
            return Err(DomainError::conflict("schedule is not suspended"));
        }

        Ok(vec![DuesScheduleEvent::ScheduleResumed(ScheduleResumed {
            tenant_id: cmd.tenant_id,
            schedule_id: cmd.schedule_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelSchedule) -> Result<Vec<DuesScheduleEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;

        Ok(vec![DuesScheduleEvent::ScheduleCancelled(ScheduleCancelled {
            tenant_id: cmd.tenant_id,
            schedule_id: cmd.schedule_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn created_schedule(frequency: BillingFrequency) -> (DuesSchedule, TenantId, DuesScheduleId) {
        let tenant_id = TenantId::new();
        let schedule_id = DuesScheduleId::new(AggregateId::new());
        let mut s = DuesSchedule::empty(schedule_id);
        let events = s
            .handle(&DuesScheduleCommand::CreateSchedule(CreateSchedule {
                tenant_id,
                schedule_id,
                member_id: MemberId::new(AggregateId::new()),
                membership_type: "Standard".to_string(),
                billing_frequency: frequency,
                dues_rate: Money::from_cents(1250),
                first_invoice_date: ymd(2025, 2, 1),
                invoice_lead_days: Some(30),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        s.apply(&events[0]);
        (s, tenant_id, schedule_id)
    }

    #[test]
    fn monthly_advance_clamps_short_months() {
        assert_eq!(
            BillingFrequency::Monthly.advance(ymd(2025, 1, 31)),
            ymd(2025, 2, 28)
        );
        assert_eq!(
            BillingFrequency::Monthly.advance(ymd(2024, 1, 31)),
            ymd(2024, 2, 29)
        );
    }

    #[test]
    fn period_end_is_day_before_next_period() {
        assert_eq!(
            BillingFrequency::Monthly.period_end(ymd(2025, 2, 1)),
            ymd(2025, 2, 28)
        );
        assert_eq!(
            BillingFrequency::Annual.period_end(ymd(2025, 1, 1)),
            ymd(2025, 12, 31)
        );
        assert_eq!(
            BillingFrequency::Daily.period_end(ymd(2025, 3, 10)),
            ymd(2025, 3, 10)
        );
    }

    #[test]
    fn create_rejects_non_positive_rate() {
        let schedule_id = DuesScheduleId::new(AggregateId::new());
        let s = DuesSchedule::empty(schedule_id);
        let err = s
            .handle(&DuesScheduleCommand::CreateSchedule(CreateSchedule {
                tenant_id: TenantId::new(),
                schedule_id,
                member_id: MemberId::new(AggregateId::new()),
                membership_type: "Standard".to_string(),
                billing_frequency: BillingFrequency::Monthly,
                dues_rate: Money::ZERO,
                first_invoice_date: ymd(2025, 2, 1),
                invoice_lead_days: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn invoicing_eligibility_respects_lead_window() {
        let (s, _, _) = created_schedule(BillingFrequency::Monthly);
        // next_invoice_date = 2025-02-01, lead 30 days → eligible from 2025-01-02.
        assert!(!s.is_due_for_invoicing(ymd(2025, 1, 1)));
        assert!(s.is_due_for_invoicing(ymd(2025, 1, 2)));
        assert!(s.is_due_for_invoicing(ymd(2025, 2, 1)));
    }

    #[test]
    fn invoice_generated_advances_next_invoice_date() {
        let (mut s, tenant_id, schedule_id) = created_schedule(BillingFrequency::Monthly);
        let events = s
            .handle(&DuesScheduleCommand::RecordInvoiceGenerated(
                RecordInvoiceGenerated {
                    tenant_id,
                    schedule_id,
                    coverage_start: ymd(2025, 2, 1),
                    coverage_end: ymd(2025, 2, 28),
                    occurred_at: Utc::now(),
                },
            ))
            .unwrap();
        s.apply(&events[0]);
        assert_eq!(s.next_invoice_date(), Some(ymd(2025, 3, 1)));
    }

    #[test]
    fn first_failure_grants_grace_period() {
        let (mut s, tenant_id, schedule_id) = created_schedule(BillingFrequency::Monthly);
        let events = s
            .handle(&DuesScheduleCommand::RecordPaymentFailure(
                RecordPaymentFailure {
                    tenant_id,
                    schedule_id,
                    reason: Some("AC04".to_string()),
                    failed_on: ymd(2025, 3, 1),
                    occurred_at: Utc::now(),
                },
            ))
            .unwrap();
        s.apply(&events[0]);

        assert_eq!(s.consecutive_failures(), 1);
        assert_eq!(
            s.status(),
            ScheduleStatus::GracePeriod {
                until: ymd(2025, 3, 15)
            }
        );
        // Grace still bills.
        assert!(s.is_due_for_invoicing(ymd(2025, 2, 1)));
    }

    #[test]
    fn third_failure_suspends_schedule() {
        let (mut s, tenant_id, schedule_id) = created_schedule(BillingFrequency::Monthly);
        for day in 1..=3 {
            let events = s
                .handle(&DuesScheduleCommand::RecordPaymentFailure(
                    RecordPaymentFailure {
                        tenant_id,
                        schedule_id,
                        reason: None,
                        failed_on: ymd(2025, 3, day),
                        occurred_at: Utc::now(),
                    },
                ))
                .unwrap();
            s.apply(&events[0]);
        }

        assert_eq!(s.consecutive_failures(), 3);
        assert_eq!(s.status(), ScheduleStatus::Suspended);
        assert!(!s.is_due_for_invoicing(ymd(2025, 3, 10)));
    }

    #[test]
    fn recovery_resets_failures_and_reactivates() {
        let (mut s, tenant_id, schedule_id) = created_schedule(BillingFrequency::Monthly);
        let events = s
            .handle(&DuesScheduleCommand::RecordPaymentFailure(
                RecordPaymentFailure {
                    tenant_id,
                    schedule_id,
                    reason: None,
                    failed_on: ymd(2025, 3, 1),
                    occurred_at: Utc::now(),
                },
            ))
            .unwrap();
        s.apply(&events[0]);

        let events = s
            .handle(&DuesScheduleCommand::RecordPaymentRecovered(
                RecordPaymentRecovered {
                    tenant_id,
                    schedule_id,
                    occurred_at: Utc::now(),
                },
            ))
            .unwrap();
        s.apply(&events[0]);

        assert_eq!(s.consecutive_failures(), 0);
        assert_eq!(s.status(), ScheduleStatus::Active);
    }

    #[test]
    fn cancelled_schedule_rejects_everything() {
        let (mut s, tenant_id, schedule_id) = created_schedule(BillingFrequency::Monthly);
        let events = s
            .handle(&DuesScheduleCommand::CancelSchedule(CancelSchedule {
                tenant_id,
                schedule_id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        s.apply(&events[0]);

        let err = s
            .handle(&DuesScheduleCommand::ChangeRate(ChangeRate {
                tenant_id,
                schedule_id,
                new_rate: Money::from_cents(1500),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}

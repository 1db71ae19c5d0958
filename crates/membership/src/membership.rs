use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use verenigingen_events::Event;

use crate::member::MemberId;

/// Membership identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipId(pub AggregateId);

impl MembershipId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MembershipId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Membership lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Cancelled,
    Expired,
}

/// A dated enrollment window.
///
/// `end` is `None` while the membership is open-ended; coverage analysis
/// clamps open periods to "today".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPeriod {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl MembershipPeriod {
    /// Clamp to a concrete date range, substituting `today` for an open end.
    pub fn clamped(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (self.start, self.end.unwrap_or(today))
    }
}

/// Aggregate root: Membership.
///
/// One enrollment of a member into a membership type. Dues coverage walks
/// the membership period; the dues schedule (separate aggregate) decides
/// how that period is billed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    id: MembershipId,
    tenant_id: Option<TenantId>,
    member_id: Option<MemberId>,
    membership_type: String,
    period: Option<MembershipPeriod>,
    status: MembershipStatus,
    version: u64,
    created: bool,
}

impl Membership {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MembershipId) -> Self {
        Self {
            id,
            tenant_id: None,
            member_id: None,
            membership_type: String::new(),
            period: None,
            status: MembershipStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MembershipId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn member_id(&self) -> Option<MemberId> {
        self.member_id
    }

    pub fn membership_type(&self) -> &str {
        &self.membership_type
    }

    pub fn period(&self) -> Option<MembershipPeriod> {
        self.period
    }

    pub fn status(&self) -> MembershipStatus {
        self.status
    }
}

impl AggregateRoot for Membership {
    type Id = MembershipId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: StartMembership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartMembership {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub member_id: MemberId,
    pub membership_type: String,
    pub start_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenewMembership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewMembership {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    /// New minimum end of the enrollment; `None` makes it open-ended again.
    pub until: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelMembership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelMembership {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub cancellation_date: NaiveDate,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipCommand {
    StartMembership(StartMembership),
    RenewMembership(RenewMembership),
    CancelMembership(CancelMembership),
}

/// Event: MembershipStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipStarted {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub member_id: MemberId,
    pub membership_type: String,
    pub start_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MembershipRenewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRenewed {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub until: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MembershipCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipCancelled {
    pub tenant_id: TenantId,
    pub membership_id: MembershipId,
    pub cancellation_date: NaiveDate,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    MembershipStarted(MembershipStarted),
    MembershipRenewed(MembershipRenewed),
    MembershipCancelled(MembershipCancelled),
}

impl Event for MembershipEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MembershipEvent::MembershipStarted(_) => "membership.membership.started",
            MembershipEvent::MembershipRenewed(_) => "membership.membership.renewed",
            MembershipEvent::MembershipCancelled(_) => "membership.membership.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MembershipEvent::MembershipStarted(e) => e.occurred_at,
            MembershipEvent::MembershipRenewed(e) => e.occurred_at,
            MembershipEvent::MembershipCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Membership {
    type Command = MembershipCommand;
    type Event = MembershipEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MembershipEvent::MembershipStarted(e) => {
                self.id = e.membership_id;
                self.tenant_id = Some(e.tenant_id);
                self.member_id = Some(e.member_id);
                self.membership_type = e.membership_type.clone();
                self.period = Some(MembershipPeriod {
                    start: e.start_date,
                    end: None,
                });
                self.status = MembershipStatus::Active;
                self.created = true;
            }
            MembershipEvent::MembershipRenewed(e) => {
                if let Some(period) = &mut self.period {
                    period.end = e.until;
                }
                self.status = MembershipStatus::Active;
            }
            MembershipEvent::MembershipCancelled(e) => {
                if let Some(period) = &mut self.period {
                    period.end = Some(e.cancellation_date);
                }
                self.status = MembershipStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MembershipCommand::StartMembership(cmd) => self.handle_start(cmd),
            MembershipCommand::RenewMembership(cmd) => self.handle_renew(cmd),
            MembershipCommand::CancelMembership(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Membership {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_start(&self, cmd: &StartMembership) -> Result<Vec<MembershipEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("membership already exists"));
        }
        if cmd.membership_type.trim().is_empty() {
            return Err(DomainError::validation("membership type cannot be empty"));
        }

        Ok(vec![MembershipEvent::MembershipStarted(MembershipStarted {
            tenant_id: cmd.tenant_id,
            membership_id: cmd.membership_id,
            member_id: cmd.member_id,
            membership_type: cmd.membership_type.clone(),
            start_date: cmd.start_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_renew(&self, cmd: &RenewMembership) -> Result<Vec<MembershipEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != MembershipStatus::Active {
            return Err(DomainError::conflict("only active memberships can be renewed"));
        }
        if let (Some(until), Some(period)) = (cmd.until, self.period) {
            if until < period.start {
                return Err(DomainError::validation(
                    "renewal end cannot precede membership start",
                ));
            }
        }

        Ok(vec![MembershipEvent::MembershipRenewed(MembershipRenewed {
            tenant_id: cmd.tenant_id,
            membership_id: cmd.membership_id,
            until: cmd.until,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelMembership) -> Result<Vec<MembershipEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == MembershipStatus::Cancelled {
            return Err(DomainError::conflict("membership is already cancelled"));
        }
        if let Some(period) = self.period {
            if cmd.cancellation_date < period.start {
                return Err(DomainError::validation(
                    "cancellation date cannot precede membership start",
                ));
            }
        }

        Ok(vec![MembershipEvent::MembershipCancelled(MembershipCancelled {
            tenant_id: cmd.tenant_id,
            membership_id: cmd.membership_id,
            cancellation_date: cmd.cancellation_date,
            reason: cmd.reason.clone(),
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

    fn started_membership() -> (Membership, TenantId, MembershipId) {
        let tenant_id = TenantId::new();
        let membership_id = MembershipId::new(AggregateId::new());
        let mut m = Membership::empty(membership_id);
        let events = m
            .handle(&MembershipCommand::StartMembership(StartMembership {
                tenant_id,
                membership_id,
                member_id: MemberId::new(AggregateId::new()),
                membership_type: "Standard".to_string(),
                start_date: ymd(2025, 1, 1),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        m.apply(&events[0]);
        (m, tenant_id, membership_id)
    }

    #[test]
    fn start_creates_open_ended_period() {
        let (m, _, _) = started_membership();
        let period = m.period().unwrap();
        assert_eq!(period.start, ymd(2025, 1, 1));
        assert_eq!(period.end, None);
        assert_eq!(m.status(), MembershipStatus::Active);
    }

    #[test]
    fn clamped_substitutes_today_for_open_end() {
        let (m, _, _) = started_membership();
        let (start, end) = m.period().unwrap().clamped(ymd(2025, 8, 1));
        assert_eq!(start, ymd(2025, 1, 1));
        assert_eq!(end, ymd(2025, 8, 1));
    }

    #[test]
    fn cancel_sets_period_end_and_status() {
        let (mut m, tenant_id, membership_id) = started_membership();
        let events = m
            .handle(&MembershipCommand::CancelMembership(CancelMembership {
                tenant_id,
                membership_id,
                cancellation_date: ymd(2025, 6, 30),
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        m.apply(&events[0]);

        assert_eq!(m.status(), MembershipStatus::Cancelled);
        assert_eq!(m.period().unwrap().end, Some(ymd(2025, 6, 30)));
    }

    #[test]
    fn cancel_before_start_is_rejected() {
        let (m, tenant_id, membership_id) = started_membership();
        let err = m
            .handle(&MembershipCommand::CancelMembership(CancelMembership {
                tenant_id,
                membership_id,
                cancellation_date: ymd(2024, 12, 31),
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cancelled_membership_cannot_be_renewed() {
        let (mut m, tenant_id, membership_id) = started_membership();
        let events = m
            .handle(&MembershipCommand::CancelMembership(CancelMembership {
                tenant_id,
                membership_id,
                cancellation_date: ymd(2025, 3, 1),
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        m.apply(&events[0]);

        let err = m
            .handle(&MembershipCommand::RenewMembership(RenewMembership {
                tenant_id,
                membership_id,
                until: Some(ymd(2026, 1, 1)),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}

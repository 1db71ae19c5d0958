use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use verenigingen_events::Event;

/// Member identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub AggregateId);

impl MemberId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MemberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Member standing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Suspended,
    Terminated,
}

/// Contact information for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContactDetails {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub address: Option<String>,
}

/// Aggregate root: Member.
///
/// A member is a person registered with the association. The member record
/// is the anchor for memberships, dues schedules and SEPA mandates; those
/// live in their own aggregates and reference `MemberId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    id: MemberId,
    tenant_id: Option<TenantId>,
    member_number: String,
    full_name: String,
    contact: ContactDetails,
    chapter: Option<AggregateId>,
    status: MemberStatus,
    version: u64,
    created: bool,
}

impl Member {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MemberId) -> Self {
        Self {
            id,
            tenant_id: None,
            member_number: String::new(),
            full_name: String::new(),
            contact: ContactDetails::default(),
            chapter: None,
            status: MemberStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MemberId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn member_number(&self) -> &str {
        &self.member_number
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn contact(&self) -> &ContactDetails {
        &self.contact
    }

    pub fn chapter(&self) -> Option<AggregateId> {
        self.chapter
    }

    pub fn status(&self) -> MemberStatus {
        self.status
    }

    /// Invariant helper: only active members are billable.
    pub fn is_billable(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

impl AggregateRoot for Member {
    type Id = MemberId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMember {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub member_number: String,
    pub full_name: String,
    pub contact: Option<ContactDetails>,
    pub chapter: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateContactDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateContactDetails {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    /// Optional new name (if None, keep existing).
    pub full_name: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<ContactDetails>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendMember {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    /// Human-readable reason, e.g. "3 consecutive failed collections".
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReinstateMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinstateMember {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TerminateMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateMember {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub reason: Option<String>,
    pub termination_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberCommand {
    RegisterMember(RegisterMember),
    UpdateContactDetails(UpdateContactDetails),
    SuspendMember(SuspendMember),
    ReinstateMember(ReinstateMember),
    TerminateMember(TerminateMember),
}

/// Event: MemberRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRegistered {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub member_number: String,
    pub full_name: String,
    pub contact: ContactDetails,
    pub chapter: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberContactUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberContactUpdated {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub full_name: String,
    pub contact: ContactDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberSuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSuspended {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberReinstated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberReinstated {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberTerminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTerminated {
    pub tenant_id: TenantId,
    pub member_id: MemberId,
    pub reason: Option<String>,
    pub termination_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberEvent {
    MemberRegistered(MemberRegistered),
    MemberContactUpdated(MemberContactUpdated),
    MemberSuspended(MemberSuspended),
    MemberReinstated(MemberReinstated),
    MemberTerminated(MemberTerminated),
}

impl Event for MemberEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MemberEvent::MemberRegistered(_) => "membership.member.registered",
            MemberEvent::MemberContactUpdated(_) => "membership.member.contact_updated",
            MemberEvent::MemberSuspended(_) => "membership.member.suspended",
            MemberEvent::MemberReinstated(_) => "membership.member.reinstated",
            MemberEvent::MemberTerminated(_) => "membership.member.terminated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MemberEvent::MemberRegistered(e) => e.occurred_at,
            MemberEvent::MemberContactUpdated(e) => e.occurred_at,
            MemberEvent::MemberSuspended(e) => e.occurred_at,
            MemberEvent::MemberReinstated(e) => e.occurred_at,
            MemberEvent::MemberTerminated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Member {
    type Command = MemberCommand;
    type Event = MemberEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MemberEvent::MemberRegistered(e) => {
                self.id = e.member_id;
                self.tenant_id = Some(e.tenant_id);
                self.member_number = e.member_number.clone();
                self.full_name = e.full_name.clone();
                self.contact = e.contact.clone();
                self.chapter = e.chapter;
                self.status = MemberStatus::Active;
                self.created = true;
            }
            MemberEvent::MemberContactUpdated(e) => {
                self.full_name = e.full_name.clone();
                self.contact = e.contact.clone();
            }
            MemberEvent::MemberSuspended(_) => {
                self.status = MemberStatus::Suspended;
            }
            MemberEvent::MemberReinstated(_) => {
                self.status = MemberStatus::Active;
            }
            MemberEvent::MemberTerminated(_) => {
                self.status = MemberStatus::Terminated;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MemberCommand::RegisterMember(cmd) => self.handle_register(cmd),
            MemberCommand::UpdateContactDetails(cmd) => self.handle_update(cmd),
            MemberCommand::SuspendMember(cmd) => self.handle_suspend(cmd),
            MemberCommand::ReinstateMember(cmd) => self.handle_reinstate(cmd),
            MemberCommand::TerminateMember(cmd) => self.handle_terminate(cmd),
        }
    }
}

impl Member {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_member_id(&self, member_id: MemberId) -> Result<(), DomainError> {
        if self.id != member_id {
            return Err(DomainError::invariant("member_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_terminated(&self) -> Result<(), DomainError> {
        if self.status == MemberStatus::Terminated {
            return Err(DomainError::invariant(
                "terminated members accept no further changes",
            ));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterMember) -> Result<Vec<MemberEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("member already exists"));
        }

        if cmd.full_name.trim().is_empty() {
            return Err(DomainError::validation("full name cannot be empty"));
        }
        if cmd.member_number.trim().is_empty() {
            return Err(DomainError::validation("member number cannot be empty"));
        }

        let contact = cmd.contact.clone().unwrap_or_default();
        if let Some(email) = &contact.email {
            validate_email(email)?;
        }

        Ok(vec![MemberEvent::MemberRegistered(MemberRegistered {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            member_number: cmd.member_number.clone(),
            full_name: cmd.full_name.clone(),
            contact,
            chapter: cmd.chapter,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateContactDetails) -> Result<Vec<MemberEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_member_id(cmd.member_id)?;
        self.ensure_not_terminated()?;

        let new_name = cmd.full_name.clone().unwrap_or_else(|| self.full_name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("full name cannot be empty"));
        }

        let new_contact = cmd.contact.clone().unwrap_or_else(|| self.contact.clone());
        if let Some(email) = &new_contact.email {
            validate_email(email)?;
        }

        Ok(vec![MemberEvent::MemberContactUpdated(MemberContactUpdated {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            full_name: new_name,
            contact: new_contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendMember) -> Result<Vec<MemberEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_member_id(cmd.member_id)?;
        self.ensure_not_terminated()?;

        if self.status == MemberStatus::Suspended {
            return Err(DomainError::conflict("member is already suspended"));
        }

        Ok(vec![MemberEvent::MemberSuspended(MemberSuspended {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reinstate(&self, cmd: &ReinstateMember) -> Result<Vec<MemberEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_member_id(cmd.member_id)?;
        self.ensure_not_terminated()?;

        if self.status != MemberStatus::Suspended {
            return Err(DomainError::conflict("only suspended members can be reinstated"));
        }

        Ok(vec![MemberEvent::MemberReinstated(MemberReinstated {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_terminate(&self, cmd: &TerminateMember) -> Result<Vec<MemberEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_member_id(cmd.member_id)?;
        self.ensure_not_terminated()?;

        Ok(vec![MemberEvent::MemberTerminated(MemberTerminated {
            tenant_id: cmd.tenant_id,
            member_id: cmd.member_id,
            reason: cmd.reason.clone(),
            termination_date: cmd.termination_date,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Minimal structural email check; full verification is a delivery concern.
fn validate_email(email: &str) -> Result<(), DomainError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DomainError::validation(format!("invalid email: {email}")));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(DomainError::validation(format!("invalid email: {email}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_member_id() -> MemberId {
        MemberId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn register_cmd(tenant_id: TenantId, member_id: MemberId) -> RegisterMember {
        RegisterMember {
            tenant_id,
            member_id,
            member_number: "M-2025-0001".to_string(),
            full_name: "Jan de Vries".to_string(),
            contact: Some(ContactDetails {
                email: Some("jan@example.org".to_string()),
                phone: None,
                postal_code: Some("1012AB".to_string()),
                address: None,
            }),
            chapter: None,
            occurred_at: test_time(),
        }
    }

    fn registered_member() -> (Member, TenantId, MemberId) {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let mut member = Member::empty(member_id);
        let events = member
            .handle(&MemberCommand::RegisterMember(register_cmd(tenant_id, member_id)))
            .unwrap();
        member.apply(&events[0]);
        (member, tenant_id, member_id)
    }

    #[test]
    fn register_member_emits_member_registered_event() {
        let tenant_id = test_tenant_id();
        let member_id = test_member_id();
        let member = Member::empty(member_id);

        let events = member
            .handle(&MemberCommand::RegisterMember(register_cmd(tenant_id, member_id)))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            MemberEvent::MemberRegistered(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.member_id, member_id);
                assert_eq!(e.member_number, "M-2025-0001");
                assert_eq!(e.full_name, "Jan de Vries");
            }
            _ => panic!("Expected MemberRegistered event"),
        }
    }

    #[test]
    fn register_member_rejects_empty_name() {
        let member = Member::empty(test_member_id());
        let mut cmd = register_cmd(test_tenant_id(), test_member_id());
        cmd.full_name = "   ".to_string();

        let err = member
            .handle(&MemberCommand::RegisterMember(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_member_rejects_malformed_email() {
        let member = Member::empty(test_member_id());
        let mut cmd = register_cmd(test_tenant_id(), test_member_id());
        cmd.contact = Some(ContactDetails {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        });

        let err = member
            .handle(&MemberCommand::RegisterMember(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_member_rejects_duplicate_creation() {
        let (member, tenant_id, member_id) = registered_member();
        let err = member
            .handle(&MemberCommand::RegisterMember(register_cmd(tenant_id, member_id)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn suspend_then_reinstate_round_trip() {
        let (mut member, tenant_id, member_id) = registered_member();

        let events = member
            .handle(&MemberCommand::SuspendMember(SuspendMember {
                tenant_id,
                member_id,
                reason: Some("payment failures".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap();
        member.apply(&events[0]);
        assert_eq!(member.status(), MemberStatus::Suspended);
        assert!(!member.is_billable());

        let events = member
            .handle(&MemberCommand::ReinstateMember(ReinstateMember {
                tenant_id,
                member_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        member.apply(&events[0]);
        assert_eq!(member.status(), MemberStatus::Active);
        assert!(member.is_billable());
    }

    #[test]
    fn reinstate_requires_suspension() {
        let (member, tenant_id, member_id) = registered_member();
        let err = member
            .handle(&MemberCommand::ReinstateMember(ReinstateMember {
                tenant_id,
                member_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn terminated_member_accepts_no_further_commands() {
        let (mut member, tenant_id, member_id) = registered_member();

        let events = member
            .handle(&MemberCommand::TerminateMember(TerminateMember {
                tenant_id,
                member_id,
                reason: Some("left the association".to_string()),
                termination_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
                occurred_at: test_time(),
            }))
            .unwrap();
        member.apply(&events[0]);
        assert_eq!(member.status(), MemberStatus::Terminated);

        let err = member
            .handle(&MemberCommand::SuspendMember(SuspendMember {
                tenant_id,
                member_id,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn tenant_mismatch_is_rejected() {
        let (member, _tenant_id, member_id) = registered_member();
        let err = member
            .handle(&MemberCommand::SuspendMember(SuspendMember {
                tenant_id: test_tenant_id(),
                member_id,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn version_increments_on_apply() {
        let (mut member, tenant_id, member_id) = registered_member();
        assert_eq!(member.version(), 1);

        let events = member
            .handle(&MemberCommand::UpdateContactDetails(UpdateContactDetails {
                tenant_id,
                member_id,
                full_name: Some("Jan de Vries-Bakker".to_string()),
                contact: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        member.apply(&events[0]);
        assert_eq!(member.version(), 2);
        assert_eq!(member.full_name(), "Jan de Vries-Bakker");
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let (member, tenant_id, member_id) = registered_member();
        let before_version = member.version();
        let before_status = member.status();

        let _ = member
            .handle(&MemberCommand::SuspendMember(SuspendMember {
                tenant_id,
                member_id,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap();

        assert_eq!(member.version(), before_version);
        assert_eq!(member.status(), before_status);
    }
}

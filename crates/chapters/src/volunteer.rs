use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use verenigingen_events::Event;
use verenigingen_membership::MemberId;

use crate::team::TeamId;

/// Volunteer identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolunteerId(pub AggregateId);

impl VolunteerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VolunteerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A volunteering assignment to a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub team_id: TeamId,
    pub from: NaiveDate,
    pub until: Option<NaiveDate>,
}

/// Aggregate root: Volunteer.
///
/// Links a member to volunteering work. Kept separate from `Member` so
/// volunteer history survives membership status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volunteer {
    id: VolunteerId,
    tenant_id: Option<TenantId>,
    member_id: Option<MemberId>,
    active: bool,
    assignments: Vec<Assignment>,
    version: u64,
    created: bool,
}

impl Volunteer {
    pub fn empty(id: VolunteerId) -> Self {
        Self {
            id,
            tenant_id: None,
            member_id: None,
            active: false,
            assignments: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> VolunteerId {
        self.id
    }

    pub fn member_id(&self) -> Option<MemberId> {
        self.member_id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }
}

impl AggregateRoot for Volunteer {
    type Id = VolunteerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: EnrollVolunteer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollVolunteer {
    pub tenant_id: TenantId,
    pub volunteer_id: VolunteerId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordAssignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAssignment {
    pub tenant_id: TenantId,
    pub volunteer_id: VolunteerId,
    pub team_id: TeamId,
    pub from: NaiveDate,
    pub until: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkInactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInactive {
    pub tenant_id: TenantId,
    pub volunteer_id: VolunteerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolunteerCommand {
    EnrollVolunteer(EnrollVolunteer),
    RecordAssignment(RecordAssignment),
    MarkInactive(MarkInactive),
}

/// Event: VolunteerEnrolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolunteerEnrolled {
    pub tenant_id: TenantId,
    pub volunteer_id: VolunteerId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AssignmentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecorded {
    pub tenant_id: TenantId,
    pub volunteer_id: VolunteerId,
    pub team_id: TeamId,
    pub from: NaiveDate,
    pub until: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VolunteerMarkedInactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolunteerMarkedInactive {
    pub tenant_id: TenantId,
    pub volunteer_id: VolunteerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolunteerEvent {
    VolunteerEnrolled(VolunteerEnrolled),
    AssignmentRecorded(AssignmentRecorded),
    VolunteerMarkedInactive(VolunteerMarkedInactive),
}

impl Event for VolunteerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VolunteerEvent::VolunteerEnrolled(_) => "chapters.volunteer.enrolled",
            VolunteerEvent::AssignmentRecorded(_) => "chapters.volunteer.assignment_recorded",
            VolunteerEvent::VolunteerMarkedInactive(_) => "chapters.volunteer.marked_inactive",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VolunteerEvent::VolunteerEnrolled(e) => e.occurred_at,
            VolunteerEvent::AssignmentRecorded(e) => e.occurred_at,
            VolunteerEvent::VolunteerMarkedInactive(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Volunteer {
    type Command = VolunteerCommand;
    type Event = VolunteerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VolunteerEvent::VolunteerEnrolled(e) => {
                self.id = e.volunteer_id;
                self.tenant_id = Some(e.tenant_id);
                self.member_id = Some(e.member_id);
                self.active = true;
                self.created = true;
            }
            VolunteerEvent::AssignmentRecorded(e) => {
                self.assignments.push(Assignment {
                    team_id: e.team_id,
                    from: e.from,
                    until: e.until,
                });
            }
            VolunteerEvent::VolunteerMarkedInactive(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VolunteerCommand::EnrollVolunteer(cmd) => self.handle_enroll(cmd),
            VolunteerCommand::RecordAssignment(cmd) => self.handle_assignment(cmd),
            VolunteerCommand::MarkInactive(cmd) => self.handle_inactive(cmd),
        }
    }
}

impl Volunteer {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_enroll(&self, cmd: &EnrollVolunteer) -> Result<Vec<VolunteerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("volunteer already enrolled"));
        }

        Ok(vec![VolunteerEvent::VolunteerEnrolled(VolunteerEnrolled {
            tenant_id: cmd.tenant_id,
            volunteer_id: cmd.volunteer_id,
            member_id: cmd.member_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assignment(&self, cmd: &RecordAssignment) -> Result<Vec<VolunteerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if !self.active {
            return Err(DomainError::invariant(
                "inactive volunteers cannot take assignments",
            ));
        }
        if let Some(until) = cmd.until {
            if until < cmd.from {
                return Err(DomainError::validation("assignment end precedes start"));
            }
        }

        Ok(vec![VolunteerEvent::AssignmentRecorded(AssignmentRecorded {
            tenant_id: cmd.tenant_id,
            volunteer_id: cmd.volunteer_id,
            team_id: cmd.team_id,
            from: cmd.from,
            until: cmd.until,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_inactive(&self, cmd: &MarkInactive) -> Result<Vec<VolunteerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if !self.active {
            return Err(DomainError::conflict("volunteer is already inactive"));
        }

        Ok(vec![VolunteerEvent::VolunteerMarkedInactive(
            VolunteerMarkedInactive {
                tenant_id: cmd.tenant_id,
                volunteer_id: cmd.volunteer_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrolled() -> (Volunteer, TenantId, VolunteerId) {
        let tenant_id = TenantId::new();
        let volunteer_id = VolunteerId::new(AggregateId::new());
        let mut v = Volunteer::empty(volunteer_id);
        let events = v
            .handle(&VolunteerCommand::EnrollVolunteer(EnrollVolunteer {
                tenant_id,
                volunteer_id,
                member_id: MemberId::new(AggregateId::new()),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        v.apply(&events[0]);
        (v, tenant_id, volunteer_id)
    }

    #[test]
    fn assignments_require_active_volunteer() {
        let (mut v, tenant_id, volunteer_id) = enrolled();
        let events = v
            .handle(&VolunteerCommand::MarkInactive(MarkInactive {
                tenant_id,
                volunteer_id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        v.apply(&events[0]);

        let err = v
            .handle(&VolunteerCommand::RecordAssignment(RecordAssignment {
                tenant_id,
                volunteer_id,
                team_id: TeamId::new(AggregateId::new()),
                from: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                until: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn assignment_window_must_be_ordered() {
        let (v, tenant_id, volunteer_id) = enrolled();
        let err = v
            .handle(&VolunteerCommand::RecordAssignment(RecordAssignment {
                tenant_id,
                volunteer_id,
                team_id: TeamId::new(AggregateId::new()),
                from: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                until: Some(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn assignment_history_accumulates() {
        let (mut v, tenant_id, volunteer_id) = enrolled();
        for month in 1..=3 {
            let events = v
                .handle(&VolunteerCommand::RecordAssignment(RecordAssignment {
                    tenant_id,
                    volunteer_id,
                    team_id: TeamId::new(AggregateId::new()),
                    from: NaiveDate::from_ymd_opt(2025, month, 1).unwrap(),
                    until: None,
                    occurred_at: Utc::now(),
                }))
                .unwrap();
            v.apply(&events[0]);
        }
        assert_eq!(v.assignments().len(), 3);
    }
}

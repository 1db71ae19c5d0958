use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use verenigingen_events::Event;
use verenigingen_membership::MemberId;

use crate::chapter::ChapterId;

/// Team identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub AggregateId);

impl TeamId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TeamId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Role within a team. At most one leader at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Leader,
    Member,
}

/// Aggregate root: Team (working group within a chapter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    id: TeamId,
    tenant_id: Option<TenantId>,
    chapter_id: Option<ChapterId>,
    name: String,
    members: Vec<(MemberId, TeamRole)>,
    version: u64,
    created: bool,
}

impl Team {
    pub fn empty(id: TeamId) -> Self {
        Self {
            id,
            tenant_id: None,
            chapter_id: None,
            name: String::new(),
            members: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TeamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chapter_id(&self) -> Option<ChapterId> {
        self.chapter_id
    }

    pub fn members(&self) -> &[(MemberId, TeamRole)] {
        &self.members
    }

    pub fn leader(&self) -> Option<MemberId> {
        self.members
            .iter()
            .find(|(_, role)| *role == TeamRole::Leader)
            .map(|(id, _)| *id)
    }
}

impl AggregateRoot for Team {
    type Id = TeamId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTeam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTeam {
    pub tenant_id: TenantId,
    pub team_id: TeamId,
    pub chapter_id: ChapterId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddTeamMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddTeamMember {
    pub tenant_id: TenantId,
    pub team_id: TeamId,
    pub member_id: MemberId,
    pub role: TeamRole,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveTeamMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveTeamMember {
    pub tenant_id: TenantId,
    pub team_id: TeamId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamCommand {
    CreateTeam(CreateTeam),
    AddTeamMember(AddTeamMember),
    RemoveTeamMember(RemoveTeamMember),
}

/// Event: TeamCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCreated {
    pub tenant_id: TenantId,
    pub team_id: TeamId,
    pub chapter_id: ChapterId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TeamMemberAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMemberAdded {
    pub tenant_id: TenantId,
    pub team_id: TeamId,
    pub member_id: MemberId,
    pub role: TeamRole,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TeamMemberRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMemberRemoved {
    pub tenant_id: TenantId,
    pub team_id: TeamId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamEvent {
    TeamCreated(TeamCreated),
    TeamMemberAdded(TeamMemberAdded),
    TeamMemberRemoved(TeamMemberRemoved),
}

impl Event for TeamEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TeamEvent::TeamCreated(_) => "chapters.team.created",
            TeamEvent::TeamMemberAdded(_) => "chapters.team.member_added",
            TeamEvent::TeamMemberRemoved(_) => "chapters.team.member_removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TeamEvent::TeamCreated(e) => e.occurred_at,
            TeamEvent::TeamMemberAdded(e) => e.occurred_at,
            TeamEvent::TeamMemberRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Team {
    type Command = TeamCommand;
    type Event = TeamEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TeamEvent::TeamCreated(e) => {
                self.id = e.team_id;
                self.tenant_id = Some(e.tenant_id);
                self.chapter_id = Some(e.chapter_id);
                self.name = e.name.clone();
                self.created = true;
            }
            TeamEvent::TeamMemberAdded(e) => {
                self.members.push((e.member_id, e.role));
            }
            TeamEvent::TeamMemberRemoved(e) => {
                self.members.retain(|(id, _)| *id != e.member_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TeamCommand::CreateTeam(cmd) => self.handle_create(cmd),
            TeamCommand::AddTeamMember(cmd) => self.handle_add(cmd),
            TeamCommand::RemoveTeamMember(cmd) => self.handle_remove(cmd),
        }
    }
}

impl Team {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTeam) -> Result<Vec<TeamEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("team already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("team name cannot be empty"));
        }

        Ok(vec![TeamEvent::TeamCreated(TeamCreated {
            tenant_id: cmd.tenant_id,
            team_id: cmd.team_id,
            chapter_id: cmd.chapter_id,
            name: cmd.name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add(&self, cmd: &AddTeamMember) -> Result<Vec<TeamEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if self.members.iter().any(|(id, _)| *id == cmd.member_id) {
            return Err(DomainError::conflict("member is already on the team"));
        }
        if cmd.role == TeamRole::Leader && self.leader().is_some() {
            return Err(DomainError::invariant("team already has a leader"));
        }

        Ok(vec![TeamEvent::TeamMemberAdded(TeamMemberAdded {
            tenant_id: cmd.tenant_id,
            team_id: cmd.team_id,
            member_id: cmd.member_id,
            role: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveTeamMember) -> Result<Vec<TeamEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.members.iter().any(|(id, _)| *id == cmd.member_id) {
            return Err(DomainError::not_found());
        }

        Ok(vec![TeamEvent::TeamMemberRemoved(TeamMemberRemoved {
            tenant_id: cmd.tenant_id,
            team_id: cmd.team_id,
            member_id: cmd.member_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created_team() -> (Team, TenantId, TeamId) {
        let tenant_id = TenantId::new();
        let team_id = TeamId::new(AggregateId::new());
        let mut t = Team::empty(team_id);
        let events = t
            .handle(&TeamCommand::CreateTeam(CreateTeam {
                tenant_id,
                team_id,
                chapter_id: ChapterId::new(AggregateId::new()),
                name: "Events crew".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        t.apply(&events[0]);
        (t, tenant_id, team_id)
    }

    #[test]
    fn at_most_one_leader() {
        let (mut t, tenant_id, team_id) = created_team();
        let events = t
            .handle(&TeamCommand::AddTeamMember(AddTeamMember {
                tenant_id,
                team_id,
                member_id: MemberId::new(AggregateId::new()),
                role: TeamRole::Leader,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        t.apply(&events[0]);

        let err = t
            .handle(&TeamCommand::AddTeamMember(AddTeamMember {
                tenant_id,
                team_id,
                member_id: MemberId::new(AggregateId::new()),
                role: TeamRole::Leader,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn removing_leader_frees_the_role() {
        let (mut t, tenant_id, team_id) = created_team();
        let leader = MemberId::new(AggregateId::new());
        let events = t
            .handle(&TeamCommand::AddTeamMember(AddTeamMember {
                tenant_id,
                team_id,
                member_id: leader,
                role: TeamRole::Leader,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        t.apply(&events[0]);

        let events = t
            .handle(&TeamCommand::RemoveTeamMember(RemoveTeamMember {
                tenant_id,
                team_id,
                member_id: leader,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        t.apply(&events[0]);

        assert!(t.leader().is_none());
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let (mut t, tenant_id, team_id) = created_team();
        let member_id = MemberId::new(AggregateId::new());
        let add = AddTeamMember {
            tenant_id,
            team_id,
            member_id,
            role: TeamRole::Member,
            occurred_at: Utc::now(),
        };
        let events = t.handle(&TeamCommand::AddTeamMember(add.clone())).unwrap();
        t.apply(&events[0]);

        let err = t.handle(&TeamCommand::AddTeamMember(add)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}

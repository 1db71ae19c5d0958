use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use verenigingen_events::Event;
use verenigingen_membership::MemberId;

/// Chapter identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(pub AggregateId);

impl ChapterId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// An inclusive Dutch postal-code digit range ("1000"–"1099").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalRange {
    pub start: String,
    pub end: String,
}

impl PostalRange {
    pub fn validate(&self) -> Result<(), DomainError> {
        let digits = |s: &str| s.len() == 4 && s.chars().all(|c| c.is_ascii_digit());
        if !digits(&self.start) || !digits(&self.end) {
            return Err(DomainError::validation(format!(
                "postal range must use 4-digit codes: {}-{}",
                self.start, self.end
            )));
        }
        if self.start > self.end {
            return Err(DomainError::validation(format!(
                "postal range start exceeds end: {}-{}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn contains(&self, postal_digits: &str) -> bool {
        postal_digits >= self.start.as_str() && postal_digits <= self.end.as_str()
    }
}

/// Board roles within a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardRole {
    Chair,
    Secretary,
    Treasurer,
    GeneralBoard,
}

/// An active board appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardAppointment {
    pub member_id: MemberId,
    pub role: BoardRole,
    pub from: NaiveDate,
}

/// Aggregate root: Chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    id: ChapterId,
    tenant_id: Option<TenantId>,
    name: String,
    regions: Vec<PostalRange>,
    board: Vec<BoardAppointment>,
    version: u64,
    created: bool,
}

impl Chapter {
    pub fn empty(id: ChapterId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            regions: Vec::new(),
            board: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ChapterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regions(&self) -> &[PostalRange] {
        &self.regions
    }

    pub fn board(&self) -> &[BoardAppointment] {
        &self.board
    }

    /// Whether a postal code (first four digits) falls in this chapter.
    pub fn covers_postal_code(&self, postal_code: &str) -> bool {
        let digits: String = postal_code.chars().filter(|c| c.is_ascii_digit()).take(4).collect();
        if digits.len() != 4 {
            return false;
        }
        self.regions.iter().any(|r| r.contains(&digits))
    }
}

impl AggregateRoot for Chapter {
    type Id = ChapterId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateChapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChapter {
    pub tenant_id: TenantId,
    pub chapter_id: ChapterId,
    pub name: String,
    pub regions: Vec<PostalRange>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateRegions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRegions {
    pub tenant_id: TenantId,
    pub chapter_id: ChapterId,
    pub regions: Vec<PostalRange>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AppointBoardMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointBoardMember {
    pub tenant_id: TenantId,
    pub chapter_id: ChapterId,
    pub member_id: MemberId,
    pub role: BoardRole,
    pub from: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RetireBoardMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireBoardMember {
    pub tenant_id: TenantId,
    pub chapter_id: ChapterId,
    pub member_id: MemberId,
    pub role: BoardRole,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChapterCommand {
    CreateChapter(CreateChapter),
    UpdateRegions(UpdateRegions),
    AppointBoardMember(AppointBoardMember),
    RetireBoardMember(RetireBoardMember),
}

/// Event: ChapterCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterCreated {
    pub tenant_id: TenantId,
    pub chapter_id: ChapterId,
    pub name: String,
    pub regions: Vec<PostalRange>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RegionsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionsUpdated {
    pub tenant_id: TenantId,
    pub chapter_id: ChapterId,
    pub regions: Vec<PostalRange>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BoardMemberAppointed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardMemberAppointed {
    pub tenant_id: TenantId,
    pub chapter_id: ChapterId,
    pub member_id: MemberId,
    pub role: BoardRole,
    pub from: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BoardMemberRetired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardMemberRetired {
    pub tenant_id: TenantId,
    pub chapter_id: ChapterId,
    pub member_id: MemberId,
    pub role: BoardRole,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChapterEvent {
    ChapterCreated(ChapterCreated),
    RegionsUpdated(RegionsUpdated),
    BoardMemberAppointed(BoardMemberAppointed),
    BoardMemberRetired(BoardMemberRetired),
}

impl Event for ChapterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChapterEvent::ChapterCreated(_) => "chapters.chapter.created",
            ChapterEvent::RegionsUpdated(_) => "chapters.chapter.regions_updated",
            ChapterEvent::BoardMemberAppointed(_) => "chapters.chapter.board_member_appointed",
            ChapterEvent::BoardMemberRetired(_) => "chapters.chapter.board_member_retired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ChapterEvent::ChapterCreated(e) => e.occurred_at,
            ChapterEvent::RegionsUpdated(e) => e.occurred_at,
            ChapterEvent::BoardMemberAppointed(e) => e.occurred_at,
            ChapterEvent::BoardMemberRetired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Chapter {
    type Command = ChapterCommand;
    type Event = ChapterEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ChapterEvent::ChapterCreated(e) => {
                self.id = e.chapter_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.regions = e.regions.clone();
                self.created = true;
            }
            ChapterEvent::RegionsUpdated(e) => {
                self.regions = e.regions.clone();
            }
            ChapterEvent::BoardMemberAppointed(e) => {
                self.board.push(BoardAppointment {
                    member_id: e.member_id,
                    role: e.role,
                    from: e.from,
                });
            }
            ChapterEvent::BoardMemberRetired(e) => {
                self.board
                    .retain(|a| !(a.member_id == e.member_id && a.role == e.role));
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ChapterCommand::CreateChapter(cmd) => self.handle_create(cmd),
            ChapterCommand::UpdateRegions(cmd) => self.handle_update_regions(cmd),
            ChapterCommand::AppointBoardMember(cmd) => self.handle_appoint(cmd),
            ChapterCommand::RetireBoardMember(cmd) => self.handle_retire(cmd),
        }
    }
}

impl Chapter {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateChapter) -> Result<Vec<ChapterEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("chapter already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("chapter name cannot be empty"));
        }
        for region in &cmd.regions {
            region.validate()?;
        }

        Ok(vec![ChapterEvent::ChapterCreated(ChapterCreated {
            tenant_id: cmd.tenant_id,
            chapter_id: cmd.chapter_id,
            name: cmd.name.clone(),
            regions: cmd.regions.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_regions(&self, cmd: &UpdateRegions) -> Result<Vec<ChapterEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        for region in &cmd.regions {
            region.validate()?;
        }

        Ok(vec![ChapterEvent::RegionsUpdated(RegionsUpdated {
            tenant_id: cmd.tenant_id,
            chapter_id: cmd.chapter_id,
            regions: cmd.regions.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_appoint(&self, cmd: &AppointBoardMember) -> Result<Vec<ChapterEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if self
            .board
            .iter()
            .any(|a| a.member_id == cmd.member_id && a.role == cmd.role)
        {
            return Err(DomainError::conflict(
                "member already holds this board role",
            ));
        }

        Ok(vec![ChapterEvent::BoardMemberAppointed(BoardMemberAppointed {
            tenant_id: cmd.tenant_id,
            chapter_id: cmd.chapter_id,
            member_id: cmd.member_id,
            role: cmd.role,
            from: cmd.from,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_retire(&self, cmd: &RetireBoardMember) -> Result<Vec<ChapterEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if !self
            .board
            .iter()
            .any(|a| a.member_id == cmd.member_id && a.role == cmd.role)
        {
            return Err(DomainError::not_found());
        }

        Ok(vec![ChapterEvent::BoardMemberRetired(BoardMemberRetired {
            tenant_id: cmd.tenant_id,
            chapter_id: cmd.chapter_id,
            member_id: cmd.member_id,
            role: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: &str, end: &str) -> PostalRange {
        PostalRange {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    fn created_chapter() -> (Chapter, TenantId, ChapterId) {
        let tenant_id = TenantId::new();
        let chapter_id = ChapterId::new(AggregateId::new());
        let mut c = Chapter::empty(chapter_id);
        let events = c
            .handle(&ChapterCommand::CreateChapter(CreateChapter {
                tenant_id,
                chapter_id,
                name: "Amsterdam".to_string(),
                regions: vec![range("1000", "1099")],
                occurred_at: Utc::now(),
            }))
            .unwrap();
        c.apply(&events[0]);
        (c, tenant_id, chapter_id)
    }

    #[test]
    fn postal_coverage_uses_digit_prefix() {
        let (c, _, _) = created_chapter();
        assert!(c.covers_postal_code("1012AB"));
        assert!(c.covers_postal_code("1099 ZZ"));
        assert!(!c.covers_postal_code("1100AA"));
        assert!(!c.covers_postal_code("10"));
    }

    #[test]
    fn malformed_postal_range_is_rejected() {
        let chapter_id = ChapterId::new(AggregateId::new());
        let c = Chapter::empty(chapter_id);
        let err = c
            .handle(&ChapterCommand::CreateChapter(CreateChapter {
                tenant_id: TenantId::new(),
                chapter_id,
                name: "Rotterdam".to_string(),
                regions: vec![range("3099", "3000")],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn duplicate_board_appointment_is_rejected() {
        let (mut c, tenant_id, chapter_id) = created_chapter();
        let member_id = MemberId::new(AggregateId::new());
        let appoint = AppointBoardMember {
            tenant_id,
            chapter_id,
            member_id,
            role: BoardRole::Chair,
            from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            occurred_at: Utc::now(),
        };

        let events = c
            .handle(&ChapterCommand::AppointBoardMember(appoint.clone()))
            .unwrap();
        c.apply(&events[0]);

        let err = c
            .handle(&ChapterCommand::AppointBoardMember(appoint))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn retire_removes_the_appointment() {
        let (mut c, tenant_id, chapter_id) = created_chapter();
        let member_id = MemberId::new(AggregateId::new());
        let events = c
            .handle(&ChapterCommand::AppointBoardMember(AppointBoardMember {
                tenant_id,
                chapter_id,
                member_id,
                role: BoardRole::Treasurer,
                from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        c.apply(&events[0]);
        assert_eq!(c.board().len(), 1);

        let events = c
            .handle(&ChapterCommand::RetireBoardMember(RetireBoardMember {
                tenant_id,
                chapter_id,
                member_id,
                role: BoardRole::Treasurer,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        c.apply(&events[0]);
        assert!(c.board().is_empty());
    }
}

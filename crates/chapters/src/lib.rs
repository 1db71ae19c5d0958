//! Chapter governance and volunteer management: geographic chapters with
//! board appointments, working teams, and volunteer enrollment.

pub mod chapter;
pub mod team;
pub mod volunteer;

pub use chapter::{
    AppointBoardMember, BoardRole, Chapter, ChapterCommand, ChapterEvent, ChapterId,
    CreateChapter, PostalRange, RetireBoardMember, UpdateRegions,
};
pub use team::{
    AddTeamMember, CreateTeam, RemoveTeamMember, Team, TeamCommand, TeamEvent, TeamId, TeamRole,
};
pub use volunteer::{
    EnrollVolunteer, MarkInactive, RecordAssignment, Volunteer, VolunteerCommand, VolunteerEvent,
    VolunteerId,
};

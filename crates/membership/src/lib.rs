//! Member administration: the `Member` aggregate (who someone is, their
//! standing with the association) and the `Membership` aggregate (a dated
//! enrollment into a membership type, the basis of dues coverage).

pub mod member;
pub mod membership;

pub use member::{
    ContactDetails, Member, MemberCommand, MemberEvent, MemberId, MemberStatus, RegisterMember,
    ReinstateMember, SuspendMember, TerminateMember, UpdateContactDetails,
};
pub use membership::{
    CancelMembership, Membership, MembershipCommand, MembershipEvent, MembershipId,
    MembershipPeriod, MembershipStatus, RenewMembership, StartMembership,
};

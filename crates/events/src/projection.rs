use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Projections implement the CQRS read side: they turn events (write model)
/// into queryable state such as the member directory, open invoices per
/// member, and batch statuses. Read models are **disposable**: delete them and rebuild
/// from events whenever the schema changes or a projection bug is fixed.
///
/// Projections must be **idempotent**: the bus delivers at-least-once, so
/// applying the same event twice must produce the same result. The
/// `ProjectionRunner` tracks sequence numbers to skip duplicates, but
/// projections should also be idempotent at the domain level (upserts).
///
/// Persistence is out of scope here; implementations may hold a HashMap
/// (tests) or a SQL table (production).
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// The envelope carries `tenant_id`; projections must scope updates to
    /// that tenant. Events irrelevant to the projection are ignored.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}

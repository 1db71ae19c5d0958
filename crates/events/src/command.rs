use verenigingen_core::AggregateId;

/// A command targets a specific aggregate (command abstraction).
///
/// Commands represent **intent** - a request to perform an action on an
/// aggregate. They are transient (not persisted) and are transformed into
/// events (which are persisted).
///
/// - **Command**: intent ("collect €12.50 from this member")
/// - **Event**: fact ("BatchEntryAdded { amount: 1250 }")
///
/// Commands are rejected if invalid; events represent accepted changes.
///
/// Each command operates on exactly one aggregate (the transaction
/// boundary), addressed via `target_aggregate_id()`. Tenant scoping is
/// enforced at the event level (envelopes), not on commands: the tenant
/// context comes from the transport layer (JWT middleware) and is attached
/// during persistence.
///
/// Commands must be `Clone + Send + Sync + 'static` so they can be retried,
/// logged and moved across worker threads.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}

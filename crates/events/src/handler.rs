use crate::{Command, Event};

/// Handles a command and emits events (command handler abstraction).
///
/// A simpler, standalone interface than the full aggregate lifecycle;
/// useful for background workers (e.g. the migration runner turning
/// eBoekhouden mutations into journal-entry commands) and for tests.
/// Errors are domain-specific, hence the associated error type.
pub trait CommandHandler {
    type Cmd: Command;
    type Ev: Event;
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn handle(&self, command: Self::Cmd) -> Result<Vec<Self::Ev>, Self::Error>;
}

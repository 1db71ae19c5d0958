//! Read-model projections.
//!
//! Each projection consumes published event envelopes and maintains a
//! queryable view: the member directory, open invoices (feeding batch
//! creation), dues coverage, and batch statuses. All of them are
//! cursor-tracked, idempotent and tenant-isolated; all of them can be
//! rebuilt from the event store.

pub mod batches;
pub mod dues_coverage;
pub mod members;
pub mod open_invoices;

pub use batches::{BatchStatusProjection, BatchStatusReadModel};
pub use dues_coverage::DuesCoverageProjection;
pub use members::{MemberDirectoryProjection, MemberReadModel};
pub use open_invoices::{OpenInvoiceReadModel, OpenInvoicesProjection};

//! eBoekhouden integration: REST client + staged migration runner.
//!
//! The domain model (mutation types, account mapping, ledger) lives in
//! `verenigingen-accounting`; this module owns the HTTP surface and the
//! orchestration that turns remote mutations into posted journal entries.

pub mod client;
pub mod migration;

pub use client::{BoekhoudenClient, BoekhoudenError, ErrorType, LedgerAccountDto};
pub use migration::{
    MigrationConfig, MigrationReport, MigrationRunner, MigrationStage, MigrationState,
};

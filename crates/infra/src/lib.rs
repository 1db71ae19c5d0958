//! `verenigingen-infra` — infrastructure composition for the association
//! core: event store backends, the command dispatcher, read-model
//! projections, the job queue (SEPA retries, migration stages), sagas, the
//! eBoekhouden REST client and migration runner.
//!
//! Domain crates stay pure; everything that touches IO, clocks or storage
//! lives here.

pub mod boekhouden;
pub mod command_dispatcher;
pub mod event_store;
pub mod jobs;
pub mod projections;
pub mod read_model;
pub mod saga;
pub mod workers;

//! Saga implementations (cross-aggregate process managers).

pub mod dues_collection;

pub use dues_collection::{DuesCollectionSaga, DuesCollectionSagaEvent, DuesCollectionSagaState};

//! SEPA direct-debit collection: mandates (authorization to debit a
//! member's account), direct-debit batches (the collection lifecycle), the
//! Dutch collection calendar, and pain.008 file generation.

pub mod batch;
pub mod calendar;
pub mod iban;
pub mod mandate;
pub mod pain008;

pub use batch::{
    AddEntry, BatchEntry, BatchStatus, BatchType, CancelBatch, CloseBatch, CreateBatch,
    DirectDebitBatch, DirectDebitBatchCommand, DirectDebitBatchEvent, DirectDebitBatchId,
    EntryOutcome, MarkGenerated, RecordEntryOutcome, SubmitBatch, ValidateBatch,
};
pub use calendar::{is_business_day, next_collection_date};
pub use iban::Iban;
pub use mandate::{
    ActivateMandate, CancelMandate, MandateKind, MandateStatus, RecordUsage, SepaMandate,
    SepaMandateCommand, SepaMandateEvent, SepaMandateId, SequenceType, SignMandate,
    SuspendMandate,
};
pub use pain008::generate_pain008;

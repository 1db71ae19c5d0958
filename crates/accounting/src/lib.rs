//! Accounting: the double-entry `Ledger` aggregate plus the eBoekhouden
//! import model (mutation types, account mapping, journal-entry
//! translation). The REST client and migration runner live in infra; this
//! crate is pure domain.

pub mod ledger;
pub mod mapping;
pub mod mutation;

pub use ledger::{
    Account, AccountKind, JournalCommand, JournalEntryLine, JournalEvent, Ledger, LedgerId,
    PostJournalEntry,
};
pub use mapping::{AccountMapping, MappingError, map_mutation_to_journal_lines};
pub use mutation::{Mutation, MutationRow, MutationType};

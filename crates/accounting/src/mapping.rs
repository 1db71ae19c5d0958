//! eBoekhouden ledger-code mapping and mutation → journal translation.
//!
//! Every imported mutation becomes one balanced journal entry. The mapping
//! table translates upstream ledger codes to local accounts; unmapped codes
//! fall back to kind-appropriate defaults so a partial mapping still
//! produces a usable ledger (the fallbacks are reported per entry).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{Account, AccountKind, JournalEntryLine};
use crate::mutation::{Mutation, MutationType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("mutation {0} has no rows and no amount")]
    EmptyMutation(i64),
    #[error("mutation {id} amount {amount} cannot be represented in cents")]
    AmountOverflow { id: i64, amount: String },
}

/// Mapping from eBoekhouden ledger codes to local accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountMapping {
    accounts: HashMap<i64, Account>,
}

impl AccountMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ledger_code: i64, account: Account) {
        self.accounts.insert(ledger_code, account);
    }

    pub fn get(&self, ledger_code: i64) -> Option<&Account> {
        self.accounts.get(&ledger_code)
    }

    /// Resolve a ledger code, falling back to a kind-appropriate default.
    ///
    /// Returns the account and whether a fallback was used.
    pub fn resolve(&self, ledger_code: i64, fallback_kind: AccountKind) -> (Account, bool) {
        match self.accounts.get(&ledger_code) {
            Some(account) => (account.clone(), false),
            None => (default_account(fallback_kind, ledger_code), true),
        }
    }
}

fn default_account(kind: AccountKind, ledger_code: i64) -> Account {
    let (code, name) = match kind {
        AccountKind::Asset => ("1999", "Unmapped assets"),
        AccountKind::Liability => ("2999", "Unmapped liabilities"),
        AccountKind::Equity => ("3999", "Opening balances"),
        AccountKind::Revenue => ("8999", "Unmapped revenue"),
        AccountKind::Expense => ("6999", "Unmapped expenses"),
    };
    Account {
        code: code.to_string(),
        name: format!("{name} (eBoekhouden {ledger_code})"),
        kind,
    }
}

/// Euro float from the API to cents, half-away-from-zero.
fn to_cents(id: i64, amount: f64) -> Result<i64, MappingError> {
    let cents = (amount * 100.0).round();
    if !cents.is_finite() || cents.abs() > 9e17 {
        return Err(MappingError::AmountOverflow {
            id,
            amount: amount.to_string(),
        });
    }
    Ok(cents as i64)
}

/// The counter-side kind for a mutation's main ledger account.
fn main_account_kind(mutation_type: MutationType) -> AccountKind {
    match mutation_type {
        // Invoices post against receivable/payable.
        MutationType::SalesInvoice => AccountKind::Asset,
        MutationType::PurchaseInvoice => AccountKind::Liability,
        // Payments and money movements run through the bank.
        MutationType::CustomerPayment
        | MutationType::SupplierPayment
        | MutationType::MoneyReceived
        | MutationType::MoneyPaid => AccountKind::Asset,
        MutationType::OpeningBalance => AccountKind::Equity,
        MutationType::GeneralJournal => AccountKind::Asset,
    }
}

/// The row-side kind (what the detail rows book against).
fn row_account_kind(mutation_type: MutationType) -> AccountKind {
    match mutation_type {
        MutationType::SalesInvoice | MutationType::MoneyReceived => AccountKind::Revenue,
        MutationType::PurchaseInvoice | MutationType::MoneyPaid => AccountKind::Expense,
        // Payments settle open invoices on the receivable/payable side.
        MutationType::CustomerPayment => AccountKind::Asset,
        MutationType::SupplierPayment => AccountKind::Liability,
        MutationType::OpeningBalance => AccountKind::Asset,
        MutationType::GeneralJournal => AccountKind::Expense,
    }
}

/// Whether the main account is debited for a positive amount.
fn main_side_is_debit(mutation_type: MutationType) -> bool {
    match mutation_type {
        // Money/claims coming in: debit bank/receivable.
        MutationType::SalesInvoice
        | MutationType::CustomerPayment
        | MutationType::MoneyReceived => true,
        // Obligations and money going out: credit the main account.
        MutationType::PurchaseInvoice
        | MutationType::SupplierPayment
        | MutationType::MoneyPaid => false,
        MutationType::OpeningBalance => false,
        MutationType::GeneralJournal => true,
    }
}

/// Translate one mutation into balanced journal lines.
///
/// The main ledger account takes the total on one side; each row books the
/// counter side. Rows with negative amounts flip sides, so credit notes and
/// corrections keep the entry balanced. Returns the lines plus the upstream
/// ledger codes that fell back to a default account.
pub fn map_mutation_to_journal_lines(
    mutation: &Mutation,
    mapping: &AccountMapping,
) -> Result<(Vec<JournalEntryLine>, Vec<i64>), MappingError> {
    if mutation.rows.is_empty() && mutation.amount == 0.0 {
        return Err(MappingError::EmptyMutation(mutation.id));
    }
    // A row-less mutation books its full amount against the counter-kind
    // default account; ledger code 0 marks the synthesized row.
    let rows: Vec<(i64, f64)> = if mutation.rows.is_empty() {
        vec![(0, mutation.amount)]
    } else {
        mutation
            .rows
            .iter()
            .map(|r| (r.ledger_id, r.amount))
            .collect()
    };

    let mut unmapped = Vec::new();
    let mut lines = Vec::new();

    let total_cents: i64 = {
        let mut sum = 0i64;
        for (_, amount) in &rows {
            sum += to_cents(mutation.id, *amount)?;
        }
        sum
    };
    if total_cents == 0 && rows.iter().all(|(_, a)| *a == 0.0) {
        return Err(MappingError::EmptyMutation(mutation.id));
    }

    let main_debit = main_side_is_debit(mutation.mutation_type);

    // Main side: the total, flipped if negative. Offsetting rows sum to
    // zero and balance among themselves, so the main line is omitted then.
    if total_cents != 0 {
        let (main_account, main_fallback) = mapping.resolve(
            mutation.ledger_id,
            main_account_kind(mutation.mutation_type),
        );
        if main_fallback {
            unmapped.push(mutation.ledger_id);
        }
        lines.push(JournalEntryLine {
            account: main_account,
            amount: total_cents.abs(),
            is_debit: if total_cents > 0 { main_debit } else { !main_debit },
        });
    }

    // Counter side: one line per row.
    for (ledger_code, amount) in rows {
        let cents = to_cents(mutation.id, amount)?;
        if cents == 0 {
            continue;
        }
        let (account, fallback) =
            mapping.resolve(ledger_code, row_account_kind(mutation.mutation_type));
        if fallback && ledger_code != 0 && !unmapped.contains(&ledger_code) {
            unmapped.push(ledger_code);
        }
        lines.push(JournalEntryLine {
            account,
            amount: cents.abs(),
            is_debit: if cents >= 0 { !main_debit } else { main_debit },
        });
    }

    Ok((lines, unmapped))
}

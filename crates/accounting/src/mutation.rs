//! eBoekhouden mutation model.
//!
//! The REST API's `v1/mutation` items, as the import pipeline sees them.
//! Mutation types follow the upstream numbering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upstream mutation type (`type` field of `v1/mutation` items).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MutationType {
    OpeningBalance,
    PurchaseInvoice,
    SalesInvoice,
    CustomerPayment,
    SupplierPayment,
    MoneyReceived,
    MoneyPaid,
    GeneralJournal,
}

impl TryFrom<i64> for MutationType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MutationType::OpeningBalance),
            1 => Ok(MutationType::PurchaseInvoice),
            2 => Ok(MutationType::SalesInvoice),
            3 => Ok(MutationType::CustomerPayment),
            4 => Ok(MutationType::SupplierPayment),
            5 => Ok(MutationType::MoneyReceived),
            6 => Ok(MutationType::MoneyPaid),
            7 => Ok(MutationType::GeneralJournal),
            other => Err(format!("unknown mutation type {other}")),
        }
    }
}

impl From<MutationType> for i64 {
    fn from(value: MutationType) -> Self {
        match value {
            MutationType::OpeningBalance => 0,
            MutationType::PurchaseInvoice => 1,
            MutationType::SalesInvoice => 2,
            MutationType::CustomerPayment => 3,
            MutationType::SupplierPayment => 4,
            MutationType::MoneyReceived => 5,
            MutationType::MoneyPaid => 6,
            MutationType::GeneralJournal => 7,
        }
    }
}

/// One row of a mutation (amount against one ledger code).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRow {
    #[serde(rename = "ledgerId")]
    pub ledger_id: i64,
    /// Amount in euros as reported upstream; converted to cents at mapping
    /// time.
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// A mutation (bookkeeping transaction) from the eBoekhouden REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub id: i64,
    #[serde(rename = "type")]
    pub mutation_type: MutationType,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    /// Main ledger code (bank account, receivable, etc. depending on type).
    #[serde(rename = "ledgerId")]
    pub ledger_id: i64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default, rename = "invoiceNumber")]
    pub invoice_number: Option<String>,
    #[serde(default, rename = "relationId")]
    pub relation_id: Option<i64>,
    #[serde(default)]
    pub rows: Vec<MutationRow>,
}

impl Mutation {
    /// Whether the import should skip this mutation entirely.
    ///
    /// The list endpoint includes a placeholder row with `id = 0` that
    /// cannot be fetched individually; automated system notifications on
    /// invoice types carry no bookkeeping value. Zero-amount mutations are
    /// otherwise valid and imported.
    pub fn should_skip(&self) -> bool {
        if self.id == 0 {
            return true;
        }
        if matches!(
            self.mutation_type,
            MutationType::PurchaseInvoice | MutationType::SalesInvoice
        ) {
            let description = self.description.as_deref().unwrap_or("").to_lowercase();
            if description.contains("system notification") || description.contains("status update")
            {
                return true;
            }
        }
        false
    }
}

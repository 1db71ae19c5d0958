use serde::{Deserialize, Serialize};

use verenigingen_dues::{BillingFrequency, CoverageAnalysis};
use verenigingen_infra::boekhouden::MigrationStage;
use verenigingen_infra::projections::{BatchStatusReadModel, MemberReadModel, OpenInvoiceReadModel};
use verenigingen_membership::ContactDetails;
use verenigingen_sepa::batch::BatchType;
use verenigingen_sepa::{MandateKind, SequenceType};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterMemberRequest {
    pub member_number: String,
    pub full_name: String,
    pub contact: Option<ContactDetails>,
    /// Chapter aggregate id, if the member joins through one.
    pub chapter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuspendMemberRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TerminateMemberRequest {
    pub reason: Option<String>,
    /// ISO date ("2025-06-30").
    pub termination_date: String,
}

#[derive(Debug, Deserialize)]
pub struct StartMembershipRequest {
    pub member_id: String,
    pub membership_type: String,
    pub start_date: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelMembershipRequest {
    pub cancellation_date: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub member_id: String,
    pub membership_type: String,
    pub billing_frequency: BillingFrequency,
    /// Decimal euro amount ("12.50").
    pub dues_rate: String,
    pub first_invoice_date: String,
    pub invoice_lead_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRateRequest {
    pub new_rate: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueInvoiceRequest {
    pub member_id: String,
    pub schedule_id: String,
    pub amount: String,
    pub due_date: String,
    pub coverage_start: String,
    pub coverage_end: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPaymentRequest {
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct VoidInvoiceRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignMandateRequest {
    pub member_id: String,
    pub mandate_reference: String,
    pub iban: String,
    pub bic: Option<String>,
    pub kind: MandateKind,
    pub sign_date: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub collection_date: String,
    pub batch_type: BatchType,
    /// Invoices to collect, with their mandate details. Amounts and member
    /// ids come from the open-invoices read model.
    pub entries: Vec<BatchEntryRequest>,
}

#[derive(Debug, Deserialize)]
pub struct BatchEntryRequest {
    pub invoice_id: String,
    pub member_name: String,
    pub iban: String,
    pub bic: Option<String>,
    pub mandate_reference: String,
    pub mandate_sign_date: String,
    pub sequence_type: SequenceType,
}

#[derive(Debug, Deserialize)]
pub struct RecordOutcomesRequest {
    pub outcomes: Vec<EntryOutcomeRequest>,
    /// Close the batch once all outcomes are in.
    #[serde(default)]
    pub close: bool,
}

#[derive(Debug, Deserialize)]
pub struct EntryOutcomeRequest {
    pub invoice_id: String,
    /// "collected" or "failed".
    pub outcome: String,
    pub reason_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartMigrationRequest {
    pub administration: String,
    pub stages: Vec<MigrationStage>,
    pub date_from: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub id: String,
    pub member_number: String,
    pub full_name: String,
    pub contact: ContactDetails,
    pub chapter: Option<String>,
    pub status: String,
}

impl From<&MemberReadModel> for MemberResponse {
    fn from(model: &MemberReadModel) -> Self {
        Self {
            id: model.member_id.to_string(),
            member_number: model.member_number.clone(),
            full_name: model.full_name.clone(),
            contact: model.contact.clone(),
            chapter: model.chapter.map(|c| c.to_string()),
            status: format!("{:?}", model.status).to_lowercase(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: String,
    pub member_id: String,
    pub schedule_id: String,
    pub status: String,
    pub amount: String,
    pub outstanding: String,
    pub due_date: String,
    pub coverage_start: String,
    pub coverage_end: String,
}

impl From<&OpenInvoiceReadModel> for InvoiceResponse {
    fn from(model: &OpenInvoiceReadModel) -> Self {
        Self {
            id: model.invoice_id.to_string(),
            member_id: model.member_id.to_string(),
            schedule_id: model.schedule_id.to_string(),
            status: format!("{:?}", model.status).to_lowercase(),
            amount: model.amount.to_euro_string(),
            outstanding: model.outstanding().to_euro_string(),
            due_date: model.due_date.to_string(),
            coverage_start: model.coverage_start.to_string(),
            coverage_end: model.coverage_end.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub id: String,
    pub batch_type: BatchType,
    pub collection_date: String,
    pub status: String,
    pub entry_count: u32,
    pub total_amount: String,
    pub message_id: Option<String>,
    pub outcomes_recorded: usize,
}

impl From<&BatchStatusReadModel> for BatchResponse {
    fn from(model: &BatchStatusReadModel) -> Self {
        Self {
            id: model.batch_id.to_string(),
            batch_type: model.batch_type,
            collection_date: model.collection_date.to_string(),
            status: format!("{:?}", model.status).to_lowercase(),
            entry_count: model.entry_count,
            total_amount: model.total_amount.to_euro_string(),
            message_id: model.message_id.clone(),
            outcomes_recorded: model.outcomes.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CoverageResponse {
    pub member_id: String,
    pub analysis: CoverageAnalysis,
}

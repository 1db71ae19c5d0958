use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use verenigingen_core::{Money, TenantId};
use verenigingen_dues::schedule::DuesScheduleEvent;
use verenigingen_dues::{
    BillingFrequency, CoverageAnalysis, CoveragePeriod, DuesScheduleId, PaymentStatus,
    analyze_coverage,
};
use verenigingen_events::EventEnvelope;
use verenigingen_invoicing::invoice::InvoiceStatus;
use verenigingen_membership::membership::MembershipEvent;
use verenigingen_membership::{MemberId, MembershipId, MembershipPeriod};

use super::open_invoices::OpenInvoiceReadModel;

/// What the coverage report needs to know per member: membership periods
/// plus the active schedule's billing parameters.
#[derive(Debug, Clone, Default)]
struct MemberBillingState {
    periods: HashMap<MembershipId, MembershipPeriod>,
    frequency: Option<BillingFrequency>,
    rate: Money,
}

#[derive(Debug, Error)]
pub enum CoverageProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),
}

/// Dues coverage projection.
///
/// Consumes membership and dues-schedule events to keep per-member billing
/// state, then runs the pure coverage engine against the member's invoices
/// on demand. Membership-period tracking needs the membership stream;
/// invoice coverage comes in via the open-invoices read model at query time
/// so the two projections stay independently rebuildable.
#[derive(Debug, Default)]
pub struct DuesCoverageProjection {
    members: RwLock<HashMap<(TenantId, MemberId), MemberBillingState>>,
    membership_owner: RwLock<HashMap<(TenantId, MembershipId), MemberId>>,
    schedule_owner: RwLock<HashMap<(TenantId, DuesScheduleId), MemberId>>,
}

impl DuesCoverageProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CoverageProjectionError> {
        match envelope.aggregate_type() {
            "membership.membership" => self.apply_membership(envelope),
            "dues.schedule" => self.apply_schedule(envelope),
            _ => Ok(()),
        }
    }

    fn apply_membership(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CoverageProjectionError> {
        let ev: MembershipEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| CoverageProjectionError::Deserialize(e.to_string()))?;
        let tenant_id = envelope.tenant_id();

        match ev {
            MembershipEvent::MembershipStarted(e) => {
                if let Ok(mut owners) = self.membership_owner.write() {
                    owners.insert((tenant_id, e.membership_id), e.member_id);
                }
                if let Ok(mut members) = self.members.write() {
                    let state = members.entry((tenant_id, e.member_id)).or_default();
                    state.periods.insert(
                        e.membership_id,
                        MembershipPeriod {
                            start: e.start_date,
                            end: None,
                        },
                    );
                }
            }
            MembershipEvent::MembershipRenewed(e) => {
                self.with_period(tenant_id, e.membership_id, |period| {
                    period.end = e.until;
                });
            }
            MembershipEvent::MembershipCancelled(e) => {
                self.with_period(tenant_id, e.membership_id, |period| {
                    period.end = Some(e.cancellation_date);
                });
            }
        }
        Ok(())
    }

    fn with_period(
        &self,
        tenant_id: TenantId,
        membership_id: MembershipId,
        f: impl FnOnce(&mut MembershipPeriod),
    ) {
        let owner = match self.membership_owner.read() {
            Ok(owners) => owners.get(&(tenant_id, membership_id)).copied(),
            Err(_) => None,
        };
        let Some(member_id) = owner else { return };
        if let Ok(mut members) = self.members.write() {
            if let Some(state) = members.get_mut(&(tenant_id, member_id)) {
                if let Some(period) = state.periods.get_mut(&membership_id) {
                    f(period);
                }
            }
        }
    }

    fn apply_schedule(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CoverageProjectionError> {
        let ev: DuesScheduleEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| CoverageProjectionError::Deserialize(e.to_string()))?;
        let tenant_id = envelope.tenant_id();

        match ev {
            DuesScheduleEvent::ScheduleCreated(e) => {
                if let Ok(mut owners) = self.schedule_owner.write() {
                    owners.insert((tenant_id, e.schedule_id), e.member_id);
                }
                if let Ok(mut members) = self.members.write() {
                    let state = members.entry((tenant_id, e.member_id)).or_default();
                    state.frequency = Some(e.billing_frequency);
                    state.rate = e.dues_rate;
                }
            }
            // Rate changes do not rewrite history; catch-up periods bill at
            // the rate in effect when the analysis runs, matching the
            // original report's use of the current schedule rate.
            DuesScheduleEvent::RateChanged(e) => {
                let owner = match self.schedule_owner.read() {
                    Ok(owners) => owners.get(&(tenant_id, e.schedule_id)).copied(),
                    Err(_) => None,
                };
                if let Some(member_id) = owner {
                    if let Ok(mut members) = self.members.write() {
                        if let Some(state) = members.get_mut(&(tenant_id, member_id)) {
                            state.rate = e.new_rate;
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Membership periods for a member, sorted by start date.
    pub fn membership_periods(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
    ) -> Vec<MembershipPeriod> {
        let members = match self.members.read() {
            Ok(m) => m,
            Err(_) => return Vec::new(),
        };
        let mut periods: Vec<MembershipPeriod> = members
            .get(&(tenant_id, member_id))
            .map(|s| s.periods.values().copied().collect())
            .unwrap_or_default();
        periods.sort_by_key(|p| p.start);
        periods
    }

    /// Run the coverage analysis for a member against their invoices.
    pub fn analyze(
        &self,
        tenant_id: TenantId,
        member_id: MemberId,
        invoices: &[OpenInvoiceReadModel],
        today: NaiveDate,
    ) -> CoverageAnalysis {
        let (frequency, rate) = {
            let members = self.members.read().ok();
            members
                .as_ref()
                .and_then(|m| m.get(&(tenant_id, member_id)))
                .map(|s| (s.frequency, s.rate))
                .unwrap_or((None, Money::ZERO))
        };

        let coverage_invoices: Vec<CoveragePeriod> = invoices
            .iter()
            .filter(|inv| inv.status != InvoiceStatus::Void)
            .map(|inv| CoveragePeriod {
                invoice: inv.invoice_id.to_string(),
                coverage_start: inv.coverage_start,
                coverage_end: inv.coverage_end,
                payment_status: match inv.status {
                    InvoiceStatus::Paid => PaymentStatus::Paid,
                    InvoiceStatus::Open if inv.due_date < today => PaymentStatus::Overdue,
                    _ => PaymentStatus::Outstanding,
                },
                amount: inv.amount,
                outstanding: inv.outstanding(),
            })
            .collect();

        let periods = self.membership_periods(tenant_id, member_id);
        analyze_coverage(&periods, &coverage_invoices, frequency, rate, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use verenigingen_core::AggregateId;
    use verenigingen_dues::schedule::ScheduleCreated;
    use verenigingen_dues::{DuesScheduleId, GapSeverity};
    use verenigingen_invoicing::InvoiceId;
    use verenigingen_membership::membership::MembershipStarted;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn envelope(tenant_id: TenantId, aggregate_type: &str, payload: JsonValue) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            AggregateId::new(),
            aggregate_type,
            1,
            payload,
        )
    }

    fn seed(p: &DuesCoverageProjection, tenant_id: TenantId, member_id: MemberId) {
        let membership_id = MembershipId::new(AggregateId::new());
        p.apply_envelope(&envelope(
            tenant_id,
            "membership.membership",
            serde_json::to_value(MembershipEvent::MembershipStarted(MembershipStarted {
                tenant_id,
                membership_id,
                member_id,
                membership_type: "Standard".to_string(),
                start_date: ymd(2025, 1, 1),
                occurred_at: Utc::now(),
            }))
            .unwrap(),
        ))
        .unwrap();

        p.apply_envelope(&envelope(
            tenant_id,
            "dues.schedule",
            serde_json::to_value(DuesScheduleEvent::ScheduleCreated(ScheduleCreated {
                tenant_id,
                schedule_id: DuesScheduleId::new(AggregateId::new()),
                member_id,
                membership_type: "Standard".to_string(),
                billing_frequency: BillingFrequency::Monthly,
                dues_rate: Money::from_cents(1250),
                first_invoice_date: ymd(2025, 1, 1),
                invoice_lead_days: 30,
                occurred_at: Utc::now(),
            }))
            .unwrap(),
        ))
        .unwrap();
    }

    fn paid_invoice(
        member_id: MemberId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> OpenInvoiceReadModel {
        OpenInvoiceReadModel {
            invoice_id: InvoiceId::new(AggregateId::new()),
            member_id,
            schedule_id: DuesScheduleId::new(AggregateId::new()),
            status: InvoiceStatus::Paid,
            amount: Money::from_cents(1250),
            total_paid: Money::from_cents(1250),
            due_date: start,
            coverage_start: start,
            coverage_end: end,
        }
    }

    #[test]
    fn detects_gap_and_catchup_for_member() {
        let p = DuesCoverageProjection::new();
        let tenant_id = TenantId::new();
        let member_id = MemberId::new(AggregateId::new());
        seed(&p, tenant_id, member_id);

        // January covered, February missing, analysis as of March 1.
        let invoices = vec![paid_invoice(member_id, ymd(2025, 1, 1), ymd(2025, 1, 31))];
        let analysis = p.analyze(tenant_id, member_id, &invoices, ymd(2025, 3, 1));

        assert_eq!(analysis.stats.total_active_days, 60);
        assert_eq!(analysis.stats.covered_days, 31);
        assert_eq!(analysis.stats.gap_days, 29);
        assert!(analysis.catchup.required);
        assert_eq!(analysis.catchup.total_amount, Money::from_cents(2 * 1250));
    }

    #[test]
    fn severity_uses_monthly_billing_context() {
        let p = DuesCoverageProjection::new();
        let tenant_id = TenantId::new();
        let member_id = MemberId::new(AggregateId::new());
        seed(&p, tenant_id, member_id);

        // No invoices at all, analysis 70 days in: critical for monthly.
        let analysis = p.analyze(tenant_id, member_id, &[], ymd(2025, 3, 11));
        assert_eq!(analysis.gaps.len(), 1);
        assert_eq!(analysis.gaps[0].severity, GapSeverity::Critical);
    }

    #[test]
    fn void_invoices_do_not_cover() {
        let p = DuesCoverageProjection::new();
        let tenant_id = TenantId::new();
        let member_id = MemberId::new(AggregateId::new());
        seed(&p, tenant_id, member_id);

        let mut invoice = paid_invoice(member_id, ymd(2025, 1, 1), ymd(2025, 1, 31));
        invoice.status = InvoiceStatus::Void;
        let analysis = p.analyze(tenant_id, member_id, &[invoice], ymd(2025, 2, 1));

        assert_eq!(analysis.stats.covered_days, 0);
    }

    #[test]
    fn unknown_member_yields_empty_analysis() {
        let p = DuesCoverageProjection::new();
        let analysis = p.analyze(
            TenantId::new(),
            MemberId::new(AggregateId::new()),
            &[],
            ymd(2025, 3, 1),
        );
        assert_eq!(analysis.stats.total_active_days, 0);
    }
}

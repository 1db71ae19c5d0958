//! Coverage analysis: which days of a membership were invoiced, where the
//! gaps are, how severe they are, and which catch-up invoices would close
//! them.
//!
//! Everything here is pure date/interval arithmetic over data the caller
//! already loaded (membership periods, invoices with coverage ranges), so it
//! can run inside a projection, a report endpoint, or a test without IO.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use verenigingen_core::Money;
use verenigingen_membership::MembershipPeriod;

use crate::schedule::BillingFrequency;

/// Payment state of a coverage invoice, as seen by the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Outstanding,
    Overdue,
}

/// An invoice's claim on a date range, clipped to a membership period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveragePeriod {
    /// Invoice reference (display id).
    pub invoice: String,
    pub coverage_start: NaiveDate,
    pub coverage_end: NaiveDate,
    pub payment_status: PaymentStatus,
    pub amount: Money,
    pub outstanding: Money,
}

impl CoveragePeriod {
    pub fn days(&self) -> i64 {
        (self.coverage_end - self.coverage_start).num_days() + 1
    }

    fn overlaps(&self, other: &CoveragePeriod) -> bool {
        self.coverage_start <= other.coverage_end && self.coverage_end >= other.coverage_start
    }
}

/// Gap severity, classified by elapsed days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GapSeverity {
    Minor,
    Moderate,
    Significant,
    Critical,
}

impl core::fmt::Display for GapSeverity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            GapSeverity::Minor => "minor",
            GapSeverity::Moderate => "moderate",
            GapSeverity::Significant => "significant",
            GapSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// An uncovered day range within a membership period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub gap_start: NaiveDate,
    pub gap_end: NaiveDate,
    pub gap_days: i64,
    pub severity: GapSeverity,
}

/// One billing period a catch-up invoice would have to cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchupPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub amount: Money,
    pub billing_frequency: BillingFrequency,
}

/// Catch-up requirements derived from the detected gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchupPlan {
    pub periods: Vec<CatchupPeriod>,
    pub total_amount: Money,
    pub required: bool,
}

/// Aggregated coverage statistics for a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub total_active_days: i64,
    pub covered_days: i64,
    pub gap_days: i64,
    pub coverage_percentage: f64,
    pub unpaid_coverage_days: i64,
    pub outstanding_amount: Money,
}

/// Full analysis result for one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageAnalysis {
    pub timeline: Vec<CoveragePeriod>,
    pub gaps: Vec<CoverageGap>,
    pub stats: CoverageStats,
    pub catchup: CatchupPlan,
}

/// Classify gap severity by elapsed days alone.
pub fn classify_gap(gap_days: i64) -> GapSeverity {
    if gap_days <= 7 {
        GapSeverity::Minor
    } else if gap_days <= 30 {
        GapSeverity::Moderate
    } else if gap_days <= 90 {
        GapSeverity::Significant
    } else {
        GapSeverity::Critical
    }
}

/// Refine a base classification with the schedule's billing frequency.
///
/// A two-week hole means little on an annual schedule and a lot on a daily
/// one; Daily and Monthly schedules get tightened thresholds, the rest keep
/// the base classification.
pub fn classify_gap_with_billing_context(
    gap_days: i64,
    frequency: BillingFrequency,
    base: GapSeverity,
) -> GapSeverity {
    match frequency {
        BillingFrequency::Daily => {
            if gap_days >= 14 {
                GapSeverity::Critical
            } else if gap_days >= 7 {
                GapSeverity::Significant
            } else if gap_days >= 3 {
                GapSeverity::Moderate
            } else {
                GapSeverity::Minor
            }
        }
        BillingFrequency::Monthly => {
            if gap_days >= 60 {
                GapSeverity::Critical
            } else if gap_days >= 35 {
                GapSeverity::Significant
            } else if gap_days >= 14 {
                GapSeverity::Moderate
            } else {
                GapSeverity::Minor
            }
        }
        _ => base,
    }
}

/// Clip invoices to a membership period and deduplicate overlaps.
///
/// Invoices that do not intersect the period are dropped. Overlapping
/// invoices are resolved earliest-start-wins, so a catch-up invoice issued
/// on top of an already-covered range does not double-count days.
pub fn build_coverage_map(
    invoices: &[CoveragePeriod],
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Vec<CoveragePeriod> {
    let mut clipped: Vec<CoveragePeriod> = invoices
        .iter()
        .filter_map(|inv| {
            let start = inv.coverage_start.max(period_start);
            let end = inv.coverage_end.min(period_end);
            (start <= end).then(|| CoveragePeriod {
                coverage_start: start,
                coverage_end: end,
                ..inv.clone()
            })
        })
        .collect();

    clipped.sort_by_key(|c| c.coverage_start);

    let mut deduplicated: Vec<CoveragePeriod> = Vec::with_capacity(clipped.len());
    for coverage in clipped {
        if !deduplicated.iter().any(|kept| kept.overlaps(&coverage)) {
            deduplicated.push(coverage);
        }
    }
    deduplicated
}

/// Walk a membership period against its coverage map and report the gaps.
///
/// `coverage` must be the output of [`build_coverage_map`] (sorted,
/// non-overlapping, clipped to the period).
pub fn identify_gaps(
    coverage: &[CoveragePeriod],
    period_start: NaiveDate,
    period_end: NaiveDate,
    frequency: Option<BillingFrequency>,
) -> Vec<CoverageGap> {
    let mut gaps = Vec::new();
    let mut current = period_start;

    let mut push_gap = |start: NaiveDate, end: NaiveDate| {
        let days = (end - start).num_days() + 1;
        let base = classify_gap(days);
        let severity = match frequency {
            Some(freq) => classify_gap_with_billing_context(days, freq, base),
            None => base,
        };
        gaps.push(CoverageGap {
            gap_start: start,
            gap_end: end,
            gap_days: days,
            severity,
        });
    };

    for cov in coverage {
        if current < cov.coverage_start {
            push_gap(current, cov.coverage_start.pred_opt().unwrap());
        }
        let after = cov.coverage_end.succ_opt().unwrap();
        current = current.max(after);
    }

    if current <= period_end {
        push_gap(current, period_end);
    }

    gaps
}

fn month_period(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date.with_day(1).unwrap();
    let end = (start + chrono::Months::new(1)).pred_opt().unwrap();
    (start, end)
}

fn quarter_period(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let quarter_start_month = ((date.month0() / 3) * 3) + 1;
    let start = NaiveDate::from_ymd_opt(date.year(), quarter_start_month, 1).unwrap();
    let end = (start + chrono::Months::new(3)).pred_opt().unwrap();
    (start, end)
}

fn half_year_period(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start_month = if date.month() <= 6 { 1 } else { 7 };
    let start = NaiveDate::from_ymd_opt(date.year(), start_month, 1).unwrap();
    let end = (start + chrono::Months::new(6)).pred_opt().unwrap();
    (start, end)
}

fn year_period(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap();
    (start, end)
}

/// Enumerate the calendar billing periods needed to fill one gap.
///
/// Calendar-aligned frequencies bill whole calendar months/quarters/years,
/// clipped to the gap; Daily treats the whole gap as a single period.
pub fn billing_periods_for_gap(
    gap_start: NaiveDate,
    gap_end: NaiveDate,
    frequency: BillingFrequency,
    rate: Money,
) -> Vec<CatchupPeriod> {
    let mut periods = Vec::new();

    if frequency == BillingFrequency::Daily {
        periods.push(CatchupPeriod {
            start: gap_start,
            end: gap_end,
            amount: rate,
            billing_frequency: frequency,
        });
        return periods;
    }

    let mut current = gap_start;
    while current <= gap_end {
        let (raw_start, raw_end) = match frequency {
            BillingFrequency::Monthly => month_period(current),
            BillingFrequency::Quarterly => quarter_period(current),
            BillingFrequency::SemiAnnual => half_year_period(current),
            BillingFrequency::Annual => year_period(current),
            BillingFrequency::Daily => unreachable!(),
        };

        let start = raw_start.max(gap_start);
        let end = raw_end.min(gap_end);
        periods.push(CatchupPeriod {
            start,
            end,
            amount: rate,
            billing_frequency: frequency,
        });

        current = end.succ_opt().unwrap();
    }

    periods
}

/// Run the full coverage analysis for one member.
///
/// `today` clamps open-ended membership periods; pass the business date so
/// the analysis stays deterministic in tests.
pub fn analyze_coverage(
    membership_periods: &[MembershipPeriod],
    invoices: &[CoveragePeriod],
    frequency: Option<BillingFrequency>,
    rate: Money,
    today: NaiveDate,
) -> CoverageAnalysis {
    let mut timeline = Vec::new();
    let mut gaps = Vec::new();
    let mut total_active_days = 0i64;
    let mut covered_days = 0i64;
    let mut unpaid_days = 0i64;
    let mut outstanding = Money::ZERO;

    for period in membership_periods {
        let (start, end) = period.clamped(today);
        if start > end {
            continue;
        }
        total_active_days += (end - start).num_days() + 1;

        let coverage = build_coverage_map(invoices, start, end);
        covered_days += coverage.iter().map(CoveragePeriod::days).sum::<i64>();
        unpaid_days += coverage
            .iter()
            .filter(|c| c.payment_status != PaymentStatus::Paid)
            .map(CoveragePeriod::days)
            .sum::<i64>();
        outstanding = coverage
            .iter()
            .filter(|c| c.payment_status != PaymentStatus::Paid)
            .map(|c| c.outstanding)
            .fold(outstanding, |acc, o| acc.checked_add(o).unwrap_or(acc));

        gaps.extend(identify_gaps(&coverage, start, end, frequency));
        timeline.extend(coverage);
    }

    let gap_days: i64 = gaps.iter().map(|g| g.gap_days).sum();
    let coverage_percentage = if total_active_days > 0 {
        (covered_days as f64 / total_active_days as f64) * 100.0
    } else {
        0.0
    };

    let catchup = match frequency {
        Some(freq) => {
            let periods: Vec<CatchupPeriod> = gaps
                .iter()
                .flat_map(|gap| billing_periods_for_gap(gap.gap_start, gap.gap_end, freq, rate))
                .collect();
            let total_amount = periods.iter().map(|p| p.amount).sum();
            CatchupPlan {
                required: !periods.is_empty(),
                total_amount,
                periods,
            }
        }
        None => CatchupPlan {
            periods: Vec::new(),
            total_amount: Money::ZERO,
            required: false,
        },
    };

    CoverageAnalysis {
        timeline,
        gaps,
        stats: CoverageStats {
            total_active_days,
            covered_days,
            gap_days,
            coverage_percentage,
            unpaid_coverage_days: unpaid_days,
            outstanding_amount: outstanding,
        },
        catchup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn paid(invoice: &str, start: NaiveDate, end: NaiveDate) -> CoveragePeriod {
        CoveragePeriod {
            invoice: invoice.to_string(),
            coverage_start: start,
            coverage_end: end,
            payment_status: PaymentStatus::Paid,
            amount: Money::from_cents(1250),
            outstanding: Money::ZERO,
        }
    }

    fn outstanding(invoice: &str, start: NaiveDate, end: NaiveDate) -> CoveragePeriod {
        CoveragePeriod {
            invoice: invoice.to_string(),
            coverage_start: start,
            coverage_end: end,
            payment_status: PaymentStatus::Outstanding,
            amount: Money::from_cents(1250),
            outstanding: Money::from_cents(1250),
        }
    }

    #[test]
    fn severity_thresholds() {
        assert_eq!(classify_gap(7), GapSeverity::Minor);
        assert_eq!(classify_gap(8), GapSeverity::Moderate);
        assert_eq!(classify_gap(30), GapSeverity::Moderate);
        assert_eq!(classify_gap(31), GapSeverity::Significant);
        assert_eq!(classify_gap(90), GapSeverity::Significant);
        assert_eq!(classify_gap(91), GapSeverity::Critical);
    }

    #[test]
    fn daily_billing_tightens_severity() {
        assert_eq!(
            classify_gap_with_billing_context(3, BillingFrequency::Daily, classify_gap(3)),
            GapSeverity::Moderate
        );
        assert_eq!(
            classify_gap_with_billing_context(7, BillingFrequency::Daily, classify_gap(7)),
            GapSeverity::Significant
        );
        assert_eq!(
            classify_gap_with_billing_context(14, BillingFrequency::Daily, classify_gap(14)),
            GapSeverity::Critical
        );
    }

    #[test]
    fn monthly_billing_adjusts_severity() {
        assert_eq!(
            classify_gap_with_billing_context(20, BillingFrequency::Monthly, classify_gap(20)),
            GapSeverity::Moderate
        );
        assert_eq!(
            classify_gap_with_billing_context(40, BillingFrequency::Monthly, classify_gap(40)),
            GapSeverity::Significant
        );
        assert_eq!(
            classify_gap_with_billing_context(60, BillingFrequency::Monthly, classify_gap(60)),
            GapSeverity::Critical
        );
    }

    #[test]
    fn annual_billing_keeps_base_severity() {
        assert_eq!(
            classify_gap_with_billing_context(40, BillingFrequency::Annual, classify_gap(40)),
            GapSeverity::Significant
        );
    }

    #[test]
    fn coverage_map_clips_to_period() {
        let invoices = vec![paid("INV-1", ymd(2024, 12, 15), ymd(2025, 1, 14))];
        let map = build_coverage_map(&invoices, ymd(2025, 1, 1), ymd(2025, 12, 31));
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].coverage_start, ymd(2025, 1, 1));
        assert_eq!(map[0].coverage_end, ymd(2025, 1, 14));
    }

    #[test]
    fn coverage_map_drops_overlapping_later_invoice() {
        let invoices = vec![
            paid("INV-1", ymd(2025, 1, 1), ymd(2025, 1, 31)),
            paid("INV-2", ymd(2025, 1, 15), ymd(2025, 2, 14)),
        ];
        let map = build_coverage_map(&invoices, ymd(2025, 1, 1), ymd(2025, 12, 31));
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].invoice, "INV-1");
    }

    #[test]
    fn gap_before_between_and_after_coverage() {
        let coverage = build_coverage_map(
            &[
                paid("INV-1", ymd(2025, 2, 1), ymd(2025, 2, 28)),
                paid("INV-2", ymd(2025, 4, 1), ymd(2025, 4, 30)),
            ],
            ymd(2025, 1, 1),
            ymd(2025, 5, 31),
        );
        let gaps = identify_gaps(&coverage, ymd(2025, 1, 1), ymd(2025, 5, 31), None);

        assert_eq!(gaps.len(), 3);
        assert_eq!(gaps[0].gap_start, ymd(2025, 1, 1));
        assert_eq!(gaps[0].gap_end, ymd(2025, 1, 31));
        assert_eq!(gaps[0].gap_days, 31);
        assert_eq!(gaps[1].gap_start, ymd(2025, 3, 1));
        assert_eq!(gaps[1].gap_end, ymd(2025, 3, 31));
        assert_eq!(gaps[2].gap_start, ymd(2025, 5, 1));
        assert_eq!(gaps[2].gap_end, ymd(2025, 5, 31));
    }

    #[test]
    fn fully_covered_period_has_no_gaps() {
        let coverage = build_coverage_map(
            &[paid("INV-1", ymd(2025, 1, 1), ymd(2025, 12, 31))],
            ymd(2025, 1, 1),
            ymd(2025, 12, 31),
        );
        let gaps = identify_gaps(&coverage, ymd(2025, 1, 1), ymd(2025, 12, 31), None);
        assert!(gaps.is_empty());
    }

    #[test]
    fn monthly_catchup_bills_calendar_months_clipped_to_gap() {
        let periods = billing_periods_for_gap(
            ymd(2025, 1, 15),
            ymd(2025, 3, 10),
            BillingFrequency::Monthly,
            Money::from_cents(1250),
        );
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].start, ymd(2025, 1, 15));
        assert_eq!(periods[0].end, ymd(2025, 1, 31));
        assert_eq!(periods[1].start, ymd(2025, 2, 1));
        assert_eq!(periods[1].end, ymd(2025, 2, 28));
        assert_eq!(periods[2].start, ymd(2025, 3, 1));
        assert_eq!(periods[2].end, ymd(2025, 3, 10));
    }

    #[test]
    fn quarterly_catchup_bills_calendar_quarters() {
        let periods = billing_periods_for_gap(
            ymd(2025, 2, 1),
            ymd(2025, 8, 15),
            BillingFrequency::Quarterly,
            Money::from_cents(3000),
        );
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].end, ymd(2025, 3, 31));
        assert_eq!(periods[1].start, ymd(2025, 4, 1));
        assert_eq!(periods[1].end, ymd(2025, 6, 30));
        assert_eq!(periods[2].start, ymd(2025, 7, 1));
        assert_eq!(periods[2].end, ymd(2025, 8, 15));
    }

    #[test]
    fn daily_catchup_is_a_single_period() {
        let periods = billing_periods_for_gap(
            ymd(2025, 3, 1),
            ymd(2025, 3, 20),
            BillingFrequency::Daily,
            Money::from_cents(50),
        );
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start, ymd(2025, 3, 1));
        assert_eq!(periods[0].end, ymd(2025, 3, 20));
    }

    #[test]
    fn full_analysis_accounts_every_day_once() {
        let membership = [MembershipPeriod {
            start: ymd(2025, 1, 1),
            end: Some(ymd(2025, 6, 30)),
        }];
        let invoices = [
            paid("INV-1", ymd(2025, 1, 1), ymd(2025, 1, 31)),
            outstanding("INV-2", ymd(2025, 2, 1), ymd(2025, 2, 28)),
            paid("INV-3", ymd(2025, 5, 1), ymd(2025, 5, 31)),
        ];

        let analysis = analyze_coverage(
            &membership,
            &invoices,
            Some(BillingFrequency::Monthly),
            Money::from_cents(1250),
            ymd(2025, 8, 1),
        );

        assert_eq!(analysis.stats.total_active_days, 181);
        assert_eq!(analysis.stats.covered_days, 31 + 28 + 31);
        assert_eq!(analysis.stats.gap_days, 181 - 90);
        assert_eq!(
            analysis.stats.covered_days + analysis.stats.gap_days,
            analysis.stats.total_active_days
        );
        assert_eq!(analysis.stats.unpaid_coverage_days, 28);
        assert_eq!(analysis.stats.outstanding_amount, Money::from_cents(1250));

        // Gaps: March-April (61 days, critical for monthly) and June (30 days).
        assert_eq!(analysis.gaps.len(), 2);
        assert_eq!(analysis.gaps[0].severity, GapSeverity::Critical);

        // Catch-up: March, April, June as whole months.
        assert!(analysis.catchup.required);
        assert_eq!(analysis.catchup.periods.len(), 3);
        assert_eq!(analysis.catchup.total_amount, Money::from_cents(3 * 1250));
    }

    #[test]
    fn empty_membership_yields_empty_analysis() {
        let analysis = analyze_coverage(
            &[],
            &[],
            Some(BillingFrequency::Monthly),
            Money::from_cents(1250),
            ymd(2025, 8, 1),
        );
        assert_eq!(analysis.stats.total_active_days, 0);
        assert_eq!(analysis.stats.coverage_percentage, 0.0);
        assert!(!analysis.catchup.required);
    }

    proptest! {
        /// Covered days plus gap days always equals active days: the walk
        /// never double-counts or loses a day.
        #[test]
        fn days_are_partitioned(
            starts in proptest::collection::vec(0i64..300, 0..6),
            lens in proptest::collection::vec(1i64..60, 0..6),
        ) {
            let period_start = ymd(2025, 1, 1);
            let period_end = ymd(2025, 12, 31);

            let invoices: Vec<CoveragePeriod> = starts
                .iter()
                .zip(lens.iter())
                .enumerate()
                .map(|(i, (s, l))| {
                    let start = period_start + chrono::Duration::days(*s);
                    paid(&format!("INV-{i}"), start, start + chrono::Duration::days(*l))
                })
                .collect();

            let coverage = build_coverage_map(&invoices, period_start, period_end);
            let gaps = identify_gaps(&coverage, period_start, period_end, None);

            let covered: i64 = coverage.iter().map(CoveragePeriod::days).sum();
            let gap_days: i64 = gaps.iter().map(|g| g.gap_days).sum();
            let active = (period_end - period_start).num_days() + 1;

            prop_assert_eq!(covered + gap_days, active);
        }

        /// Catch-up periods tile a gap exactly: contiguous, inside the gap,
        /// covering every day of it.
        #[test]
        fn catchup_periods_tile_the_gap(
            start_off in 0i64..600,
            len in 0i64..400,
        ) {
            let gap_start = ymd(2024, 1, 1) + chrono::Duration::days(start_off);
            let gap_end = gap_start + chrono::Duration::days(len);

            for freq in [
                BillingFrequency::Monthly,
                BillingFrequency::Quarterly,
                BillingFrequency::SemiAnnual,
                BillingFrequency::Annual,
            ] {
                let periods =
                    billing_periods_for_gap(gap_start, gap_end, freq, Money::from_cents(100));
                prop_assert!(!periods.is_empty());
                prop_assert_eq!(periods[0].start, gap_start);
                prop_assert_eq!(periods.last().unwrap().end, gap_end);
                for pair in periods.windows(2) {
                    prop_assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
                }
            }
        }
    }
}

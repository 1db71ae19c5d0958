//! Dues billing: the `DuesSchedule` aggregate (how a member is billed) and
//! the coverage engine (which days of a membership were actually invoiced,
//! where the gaps are, and what it takes to catch up).

pub mod coverage;
pub mod schedule;

pub use coverage::{
    CatchupPlan, CatchupPeriod, CoverageAnalysis, CoverageGap, CoveragePeriod, CoverageStats,
    GapSeverity, PaymentStatus, analyze_coverage, billing_periods_for_gap, build_coverage_map,
    classify_gap, classify_gap_with_billing_context, identify_gaps,
};
pub use schedule::{
    BillingFrequency, CancelSchedule, ChangeRate, CreateSchedule, DuesSchedule,
    DuesScheduleCommand, DuesScheduleEvent, DuesScheduleId, RecordInvoiceGenerated,
    RecordPaymentFailure, RecordPaymentRecovered, ResumeSchedule, ScheduleStatus, SuspendSchedule,
};

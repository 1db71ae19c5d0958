use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use verenigingen_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use verenigingen_events::Event;
use verenigingen_membership::MemberId;

use crate::iban::Iban;

/// Mandate identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SepaMandateId(pub AggregateId);

impl SepaMandateId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SepaMandateId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// SEPA sequence type of a collection under a mandate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceType {
    /// First collection under a recurrent mandate.
    Frst,
    /// Subsequent collection under a recurrent mandate.
    Rcur,
    /// Single collection under a one-off mandate.
    Ooff,
    /// Final collection; the mandate is exhausted afterwards.
    Fnal,
}

impl SequenceType {
    /// Wire representation used in pain.008 (`SeqTp`).
    pub fn as_code(&self) -> &'static str {
        match self {
            SequenceType::Frst => "FRST",
            SequenceType::Rcur => "RCUR",
            SequenceType::Ooff => "OOFF",
            SequenceType::Fnal => "FNAL",
        }
    }
}

impl core::fmt::Display for SequenceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// What kind of authorization the debtor signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateKind {
    Recurrent,
    OneOff,
}

/// Mandate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateStatus {
    Pending,
    Active,
    Suspended,
    Cancelled,
    /// A one-off mandate that was used, or a recurrent mandate after FNAL.
    Exhausted,
}

/// Months of disuse after which a recurrent mandate goes dormant and the
/// next collection must be presented as FRST again.
pub const DORMANCY_MONTHS: u32 = 36;

/// Aggregate root: SepaMandate.
///
/// Authorization from a member to debit their account. Usage history drives
/// the sequence type of each collection (FRST/RCUR/OOFF/FNAL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SepaMandate {
    id: SepaMandateId,
    tenant_id: Option<TenantId>,
    member_id: Option<MemberId>,
    mandate_reference: String,
    iban: Option<Iban>,
    bic: Option<String>,
    kind: MandateKind,
    sign_date: Option<NaiveDate>,
    status: MandateStatus,
    last_used_on: Option<NaiveDate>,
    last_sequence_type: Option<SequenceType>,
    version: u64,
    created: bool,
}

impl SepaMandate {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SepaMandateId) -> Self {
        Self {
            id,
            tenant_id: None,
            member_id: None,
            mandate_reference: String::new(),
            iban: None,
            bic: None,
            kind: MandateKind::Recurrent,
            sign_date: None,
            status: MandateStatus::Pending,
            last_used_on: None,
            last_sequence_type: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SepaMandateId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn member_id(&self) -> Option<MemberId> {
        self.member_id
    }

    pub fn mandate_reference(&self) -> &str {
        &self.mandate_reference
    }

    pub fn iban(&self) -> Option<&Iban> {
        self.iban.as_ref()
    }

    pub fn bic(&self) -> Option<&str> {
        self.bic.as_deref()
    }

    pub fn kind(&self) -> MandateKind {
        self.kind
    }

    pub fn sign_date(&self) -> Option<NaiveDate> {
        self.sign_date
    }

    pub fn status(&self) -> MandateStatus {
        self.status
    }

    pub fn last_used_on(&self) -> Option<NaiveDate> {
        self.last_used_on
    }

    /// Decide the sequence type for a collection on `collection_date`.
    ///
    /// Rules:
    /// - one-off mandates collect exactly once, as OOFF;
    /// - a recurrent mandate's first collection is FRST;
    /// - a recurrent mandate unused for more than 36 months is dormant and
    ///   presents FRST again;
    /// - otherwise RCUR. Exhausted/suspended/cancelled mandates refuse.
    pub fn next_sequence_type(
        &self,
        collection_date: NaiveDate,
    ) -> Result<SequenceType, DomainError> {
        match self.status {
            MandateStatus::Active => {}
            MandateStatus::Pending => {
                return Err(DomainError::invariant("mandate is not yet active"));
            }
            MandateStatus::Suspended => {
                return Err(DomainError::invariant("mandate is suspended"));
            }
            MandateStatus::Cancelled => {
                return Err(DomainError::invariant("mandate is cancelled"));
            }
            MandateStatus::Exhausted => {
                return Err(DomainError::invariant("mandate is exhausted"));
            }
        }

        match self.kind {
            MandateKind::OneOff => match self.last_used_on {
                None => Ok(SequenceType::Ooff),
                Some(_) => Err(DomainError::invariant("one-off mandate was already used")),
            },
            MandateKind::Recurrent => match self.last_used_on {
                None => Ok(SequenceType::Frst),
                Some(last) => {
                    let dormant_after = last + Months::new(DORMANCY_MONTHS);
                    if collection_date > dormant_after {
                        Ok(SequenceType::Frst)
                    } else {
                        Ok(SequenceType::Rcur)
                    }
                }
            },
        }
    }
}

impl AggregateRoot for SepaMandate {
    type Id = SepaMandateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SignMandate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignMandate {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub member_id: MemberId,
    pub mandate_reference: String,
    /// Raw IBAN as entered; validated here.
    pub iban: String,
    pub bic: Option<String>,
    pub kind: MandateKind,
    pub sign_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateMandate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateMandate {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordUsage.
///
/// Issued when a collection under this mandate is submitted to the bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUsage {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub sequence_type: SequenceType,
    pub collected_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendMandate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendMandate {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelMandate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelMandate {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SepaMandateCommand {
    SignMandate(SignMandate),
    ActivateMandate(ActivateMandate),
    RecordUsage(RecordUsage),
    SuspendMandate(SuspendMandate),
    CancelMandate(CancelMandate),
}

/// Event: MandateSigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandateSigned {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub member_id: MemberId,
    pub mandate_reference: String,
    pub iban: Iban,
    pub bic: Option<String>,
    pub kind: MandateKind,
    pub sign_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MandateActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandateActivated {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MandateUsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandateUsed {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub sequence_type: SequenceType,
    pub collected_on: NaiveDate,
    /// Whether this usage exhausted the mandate (OOFF/FNAL).
    pub exhausted: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MandateSuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandateSuspended {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MandateCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandateCancelled {
    pub tenant_id: TenantId,
    pub mandate_id: SepaMandateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SepaMandateEvent {
    MandateSigned(MandateSigned),
    MandateActivated(MandateActivated),
    MandateUsed(MandateUsed),
    MandateSuspended(MandateSuspended),
    MandateCancelled(MandateCancelled),
}

impl Event for SepaMandateEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SepaMandateEvent::MandateSigned(_) => "sepa.mandate.signed",
            SepaMandateEvent::MandateActivated(_) => "sepa.mandate.activated",
            SepaMandateEvent::MandateUsed(_) => "sepa.mandate.used",
            SepaMandateEvent::MandateSuspended(_) => "sepa.mandate.suspended",
            SepaMandateEvent::MandateCancelled(_) => "sepa.mandate.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SepaMandateEvent::MandateSigned(e) => e.occurred_at,
            SepaMandateEvent::MandateActivated(e) => e.occurred_at,
            SepaMandateEvent::MandateUsed(e) => e.occurred_at,
            SepaMandateEvent::MandateSuspended(e) => e.occurred_at,
            SepaMandateEvent::MandateCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SepaMandate {
    type Command = SepaMandateCommand;
    type Event = SepaMandateEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SepaMandateEvent::MandateSigned(e) => {
                self.id = e.mandate_id;
                self.tenant_id = Some(e.tenant_id);
                self.member_id = Some(e.member_id);
                self.mandate_reference = e.mandate_reference.clone();
                self.iban = Some(e.iban.clone());
                self.bic = e.bic.clone();
                self.kind = e.kind;
                self.sign_date = Some(e.sign_date);
                self.status = MandateStatus::Pending;
                self.created = true;
            }
            SepaMandateEvent::MandateActivated(_) => {
                self.status = MandateStatus::Active;
            }
            SepaMandateEvent::MandateUsed(e) => {
                self.last_used_on = Some(e.collected_on);
                self.last_sequence_type = Some(e.sequence_type);
                if e.exhausted {
                    self.status = MandateStatus::Exhausted;
                }
            }
            SepaMandateEvent::MandateSuspended(_) => {
                self.status = MandateStatus::Suspended;
            }
            SepaMandateEvent::MandateCancelled(_) => {
                self.status = MandateStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SepaMandateCommand::SignMandate(cmd) => self.handle_sign(cmd),
            SepaMandateCommand::ActivateMandate(cmd) => self.handle_activate(cmd),
            SepaMandateCommand::RecordUsage(cmd) => self.handle_usage(cmd),
            SepaMandateCommand::SuspendMandate(cmd) => self.handle_suspend(cmd),
            SepaMandateCommand::CancelMandate(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl SepaMandate {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_sign(&self, cmd: &SignMandate) -> Result<Vec<SepaMandateEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("mandate already exists"));
        }
        if cmd.mandate_reference.trim().is_empty() {
            return Err(DomainError::validation("mandate reference cannot be empty"));
        }
        // SEPA restricts mandate references to 35 chars of the basic set.
        if cmd.mandate_reference.len() > 35 {
            return Err(DomainError::validation("mandate reference exceeds 35 characters"));
        }

        let iban = Iban::parse(&cmd.iban)?;

        Ok(vec![SepaMandateEvent::MandateSigned(MandateSigned {
            tenant_id: cmd.tenant_id,
            mandate_id: cmd.mandate_id,
            member_id: cmd.member_id,
            mandate_reference: cmd.mandate_reference.clone(),
            iban,
            bic: cmd.bic.clone(),
            kind: cmd.kind,
            sign_date: cmd.sign_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateMandate) -> Result<Vec<SepaMandateEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if self.status != MandateStatus::Pending && self.status != MandateStatus::Suspended {
            return Err(DomainError::conflict("mandate cannot be activated"));
        }

        Ok(vec![SepaMandateEvent::MandateActivated(MandateActivated {
            tenant_id: cmd.tenant_id,
            mandate_id: cmd.mandate_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_usage(&self, cmd: &RecordUsage) -> Result<Vec<SepaMandateEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        let expected = self.next_sequence_type(cmd.collected_on)?;
        // FNAL may substitute for an expected RCUR: the creditor announces the
        // last collection. Everything else must match the mandate state.
        let acceptable = cmd.sequence_type == expected
            || (cmd.sequence_type == SequenceType::Fnal && expected == SequenceType::Rcur);
        if !acceptable {
            return Err(DomainError::invariant(format!(
                "sequence type {} not allowed (expected {})",
                cmd.sequence_type, expected
            )));
        }

        let exhausted = matches!(cmd.sequence_type, SequenceType::Ooff | SequenceType::Fnal);

        Ok(vec![SepaMandateEvent::MandateUsed(MandateUsed {
            tenant_id: cmd.tenant_id,
            mandate_id: cmd.mandate_id,
            sequence_type: cmd.sequence_type,
            collected_on: cmd.collected_on,
            exhausted,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendMandate) -> Result<Vec<SepaMandateEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if self.status != MandateStatus::Active {
            return Err(DomainError::conflict("only active mandates can be suspended"));
        }

        Ok(vec![SepaMandateEvent::MandateSuspended(MandateSuspended {
            tenant_id: cmd.tenant_id,
            mandate_id: cmd.mandate_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelMandate) -> Result<Vec<SepaMandateEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if matches!(self.status, MandateStatus::Cancelled) {
            return Err(DomainError::conflict("mandate is already cancelled"));
        }

        Ok(vec![SepaMandateEvent::MandateCancelled(MandateCancelled {
            tenant_id: cmd.tenant_id,
            mandate_id: cmd.mandate_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn active_mandate(kind: MandateKind) -> (SepaMandate, TenantId, SepaMandateId) {
        let tenant_id = TenantId::new();
        let mandate_id = SepaMandateId::new(AggregateId::new());
        let mut m = SepaMandate::empty(mandate_id);

        let events = m
            .handle(&SepaMandateCommand::SignMandate(SignMandate {
                tenant_id,
                mandate_id,
                member_id: MemberId::new(AggregateId::new()),
                mandate_reference: "VV-2025-000123".to_string(),
                iban: "NL91 ABNA 0417 1643 00".to_string(),
                bic: Some("ABNANL2A".to_string()),
                kind,
                sign_date: ymd(2025, 1, 10),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        m.apply(&events[0]);

        let events = m
            .handle(&SepaMandateCommand::ActivateMandate(ActivateMandate {
                tenant_id,
                mandate_id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        m.apply(&events[0]);

        (m, tenant_id, mandate_id)
    }

    #[test]
    fn sign_validates_iban() {
        let mandate_id = SepaMandateId::new(AggregateId::new());
        let m = SepaMandate::empty(mandate_id);
        let err = m
            .handle(&SepaMandateCommand::SignMandate(SignMandate {
                tenant_id: TenantId::new(),
                mandate_id,
                member_id: MemberId::new(AggregateId::new()),
                mandate_reference: "VV-1".to_string(),
                iban: "NL00BAD".to_string(),
                bic: None,
                kind: MandateKind::Recurrent,
                sign_date: ymd(2025, 1, 10),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn first_use_of_recurrent_mandate_is_frst() {
        let (m, _, _) = active_mandate(MandateKind::Recurrent);
        assert_eq!(
            m.next_sequence_type(ymd(2025, 2, 1)).unwrap(),
            SequenceType::Frst
        );
    }

    #[test]
    fn subsequent_use_is_rcur() {
        let (mut m, tenant_id, mandate_id) = active_mandate(MandateKind::Recurrent);
        let events = m
            .handle(&SepaMandateCommand::RecordUsage(RecordUsage {
                tenant_id,
                mandate_id,
                sequence_type: SequenceType::Frst,
                collected_on: ymd(2025, 2, 1),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        m.apply(&events[0]);

        assert_eq!(
            m.next_sequence_type(ymd(2025, 3, 1)).unwrap(),
            SequenceType::Rcur
        );
    }

    #[test]
    fn dormant_mandate_presents_frst_again() {
        let (mut m, tenant_id, mandate_id) = active_mandate(MandateKind::Recurrent);
        let events = m
            .handle(&SepaMandateCommand::RecordUsage(RecordUsage {
                tenant_id,
                mandate_id,
                sequence_type: SequenceType::Frst,
                collected_on: ymd(2020, 1, 15),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        m.apply(&events[0]);

        // 36 months later to the day is still RCUR; a day past is dormant.
        assert_eq!(
            m.next_sequence_type(ymd(2023, 1, 15)).unwrap(),
            SequenceType::Rcur
        );
        assert_eq!(
            m.next_sequence_type(ymd(2023, 1, 16)).unwrap(),
            SequenceType::Frst
        );
    }

    #[test]
    fn one_off_mandate_collects_once() {
        let (mut m, tenant_id, mandate_id) = active_mandate(MandateKind::OneOff);
        assert_eq!(
            m.next_sequence_type(ymd(2025, 2, 1)).unwrap(),
            SequenceType::Ooff
        );

        let events = m
            .handle(&SepaMandateCommand::RecordUsage(RecordUsage {
                tenant_id,
                mandate_id,
                sequence_type: SequenceType::Ooff,
                collected_on: ymd(2025, 2, 1),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        m.apply(&events[0]);

        assert_eq!(m.status(), MandateStatus::Exhausted);
        assert!(m.next_sequence_type(ymd(2025, 3, 1)).is_err());
    }

    #[test]
    fn fnal_exhausts_recurrent_mandate() {
        let (mut m, tenant_id, mandate_id) = active_mandate(MandateKind::Recurrent);
        for (seq, day) in [(SequenceType::Frst, 1), (SequenceType::Fnal, 2)] {
            let events = m
                .handle(&SepaMandateCommand::RecordUsage(RecordUsage {
                    tenant_id,
                    mandate_id,
                    sequence_type: seq,
                    collected_on: ymd(2025, 2, day),
                    occurred_at: Utc::now(),
                }))
                .unwrap();
            m.apply(&events[0]);
        }

        assert_eq!(m.status(), MandateStatus::Exhausted);
        assert!(m.next_sequence_type(ymd(2025, 3, 1)).is_err());
    }

    #[test]
    fn wrong_sequence_type_is_rejected() {
        let (m, tenant_id, mandate_id) = active_mandate(MandateKind::Recurrent);
        // Mandate never used → RCUR is not acceptable yet.
        let err = m
            .handle(&SepaMandateCommand::RecordUsage(RecordUsage {
                tenant_id,
                mandate_id,
                sequence_type: SequenceType::Rcur,
                collected_on: ymd(2025, 2, 1),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn suspended_mandate_refuses_collection() {
        let (mut m, tenant_id, mandate_id) = active_mandate(MandateKind::Recurrent);
        let events = m
            .handle(&SepaMandateCommand::SuspendMandate(SuspendMandate {
                tenant_id,
                mandate_id,
                reason: Some("member request".to_string()),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        m.apply(&events[0]);

        assert!(m.next_sequence_type(ymd(2025, 3, 1)).is_err());
    }
}

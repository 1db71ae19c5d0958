//! SEPA pain.008.001.08 file generation.
//!
//! Builds the customer-direct-debit-initiation XML the bank ingests for a
//! batch. Entries are grouped into one `PmtInf` block per sequence type
//! (FRST/RCUR/OOFF/FNAL must not share a block); amounts come from
//! [`Money`] so control sums never touch floating point.

use chrono::{DateTime, NaiveDate, Utc};

use verenigingen_core::{DomainError, Money};

use crate::batch::{BatchEntry, DirectDebitBatch};
use crate::iban::Iban;
use crate::mandate::SequenceType;

/// Creditor-side constants for a pain.008 file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditorInfo {
    /// Association name as it appears at the bank.
    pub name: String,
    pub iban: Iban,
    pub bic: String,
    /// SEPA creditor identifier (e.g. "NL13ZZZ123456780000").
    pub creditor_id: String,
}

/// Escape the five XML-reserved characters.
fn esc(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(line);
    out.push('\n');
}

fn sequence_groups(entries: &[BatchEntry]) -> Vec<(SequenceType, Vec<&BatchEntry>)> {
    let mut groups: Vec<(SequenceType, Vec<&BatchEntry>)> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|(st, _)| *st == entry.sequence_type) {
            Some((_, list)) => list.push(entry),
            None => groups.push((entry.sequence_type, vec![entry])),
        }
    }
    groups
}

/// Render a pain.008.001.08 document for a generated batch.
///
/// The batch must carry a message id (i.e. `MarkGenerated` ran) and at
/// least one entry; the collection date is taken from the batch.
pub fn generate_pain008(
    batch: &DirectDebitBatch,
    creditor: &CreditorInfo,
    created_at: DateTime<Utc>,
) -> Result<String, DomainError> {
    let message_id = batch
        .message_id()
        .ok_or_else(|| DomainError::invariant("batch has no message id"))?;
    let collection_date: NaiveDate = batch
        .collection_date()
        .ok_or_else(|| DomainError::invariant("batch has no collection date"))?;
    if batch.entries().is_empty() {
        return Err(DomainError::invariant("batch has no entries"));
    }

    let total: Money = batch.total_amount();
    let count = batch.entry_count();

    let mut out = String::new();
    push_line(&mut out, 0, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    push_line(
        &mut out,
        0,
        r#"<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pain.008.001.08">"#,
    );
    push_line(&mut out, 1, "<CstmrDrctDbtInitn>");

    // Group header: message id, creation time, batch totals.
    push_line(&mut out, 2, "<GrpHdr>");
    push_line(&mut out, 3, &format!("<MsgId>{}</MsgId>", esc(message_id)));
    push_line(
        &mut out,
        3,
        &format!("<CreDtTm>{}</CreDtTm>", created_at.format("%Y-%m-%dT%H:%M:%S")),
    );
    push_line(&mut out, 3, &format!("<NbOfTxs>{count}</NbOfTxs>"));
    push_line(
        &mut out,
        3,
        &format!("<CtrlSum>{}</CtrlSum>", total.to_euro_string()),
    );
    push_line(&mut out, 3, "<InitgPty>");
    push_line(&mut out, 4, &format!("<Nm>{}</Nm>", esc(&creditor.name)));
    push_line(&mut out, 3, "</InitgPty>");
    push_line(&mut out, 2, "</GrpHdr>");

    for (sequence_type, entries) in sequence_groups(batch.entries()) {
        let group_sum: Money = entries.iter().map(|e| e.amount).sum();

        push_line(&mut out, 2, "<PmtInf>");
        push_line(
            &mut out,
            3,
            &format!(
                "<PmtInfId>{}-{}</PmtInfId>",
                esc(message_id),
                sequence_type.as_code()
            ),
        );
        push_line(&mut out, 3, "<PmtMtd>DD</PmtMtd>");
        push_line(&mut out, 3, &format!("<NbOfTxs>{}</NbOfTxs>", entries.len()));
        push_line(
            &mut out,
            3,
            &format!("<CtrlSum>{}</CtrlSum>", group_sum.to_euro_string()),
        );
        push_line(&mut out, 3, "<PmtTpInf>");
        push_line(&mut out, 4, "<SvcLvl><Cd>SEPA</Cd></SvcLvl>");
        push_line(&mut out, 4, "<LclInstrm><Cd>CORE</Cd></LclInstrm>");
        push_line(
            &mut out,
            4,
            &format!("<SeqTp>{}</SeqTp>", sequence_type.as_code()),
        );
        push_line(&mut out, 3, "</PmtTpInf>");
        push_line(
            &mut out,
            3,
            &format!("<ReqdColltnDt>{}</ReqdColltnDt>", collection_date.format("%Y-%m-%d")),
        );
        push_line(&mut out, 3, "<Cdtr>");
        push_line(&mut out, 4, &format!("<Nm>{}</Nm>", esc(&creditor.name)));
        push_line(&mut out, 3, "</Cdtr>");
        push_line(&mut out, 3, "<CdtrAcct>");
        push_line(
            &mut out,
            4,
            &format!("<Id><IBAN>{}</IBAN></Id>", creditor.iban.as_str()),
        );
        push_line(&mut out, 3, "</CdtrAcct>");
        push_line(&mut out, 3, "<CdtrAgt>");
        push_line(
            &mut out,
            4,
            &format!("<FinInstnId><BICFI>{}</BICFI></FinInstnId>", esc(&creditor.bic)),
        );
        push_line(&mut out, 3, "</CdtrAgt>");
        push_line(&mut out, 3, "<CdtrSchmeId>");
        push_line(&mut out, 4, "<Id><PrvtId><Othr>");
        push_line(&mut out, 5, &format!("<Id>{}</Id>", esc(&creditor.creditor_id)));
        push_line(&mut out, 5, "<SchmeNm><Prtry>SEPA</Prtry></SchmeNm>");
        push_line(&mut out, 4, "</Othr></PrvtId></Id>");
        push_line(&mut out, 3, "</CdtrSchmeId>");

        for entry in entries {
            push_line(&mut out, 3, "<DrctDbtTxInf>");
            push_line(&mut out, 4, "<PmtId>");
            push_line(
                &mut out,
                5,
                &format!("<EndToEndId>{}</EndToEndId>", entry.invoice_id),
            );
            push_line(&mut out, 4, "</PmtId>");
            push_line(
                &mut out,
                4,
                &format!(
                    r#"<InstdAmt Ccy="EUR">{}</InstdAmt>"#,
                    entry.amount.to_euro_string()
                ),
            );
            push_line(&mut out, 4, "<DrctDbtTx>");
            push_line(&mut out, 5, "<MndtRltdInf>");
            push_line(
                &mut out,
                6,
                &format!("<MndtId>{}</MndtId>", esc(&entry.mandate_reference)),
            );
            push_line(
                &mut out,
                6,
                &format!(
                    "<DtOfSgntr>{}</DtOfSgntr>",
                    entry.mandate_sign_date.format("%Y-%m-%d")
                ),
            );
            push_line(&mut out, 5, "</MndtRltdInf>");
            push_line(&mut out, 4, "</DrctDbtTx>");
            push_line(&mut out, 4, "<DbtrAgt>");
            match &entry.bic {
                Some(bic) => push_line(
                    &mut out,
                    5,
                    &format!("<FinInstnId><BICFI>{}</BICFI></FinInstnId>", esc(bic)),
                ),
                None => push_line(
                    &mut out,
                    5,
                    "<FinInstnId><Othr><Id>NOTPROVIDED</Id></Othr></FinInstnId>",
                ),
            }
            push_line(&mut out, 4, "</DbtrAgt>");
            push_line(&mut out, 4, "<Dbtr>");
            push_line(&mut out, 5, &format!("<Nm>{}</Nm>", esc(&entry.member_name)));
            push_line(&mut out, 4, "</Dbtr>");
            push_line(&mut out, 4, "<DbtrAcct>");
            push_line(
                &mut out,
                5,
                &format!("<Id><IBAN>{}</IBAN></Id>", entry.iban.as_str()),
            );
            push_line(&mut out, 4, "</DbtrAcct>");
            push_line(&mut out, 3, "</DrctDbtTxInf>");
        }

        push_line(&mut out, 2, "</PmtInf>");
    }

    push_line(&mut out, 1, "</CstmrDrctDbtInitn>");
    push_line(&mut out, 0, "</Document>");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{
        AddEntry, BatchType, CreateBatch, DirectDebitBatchCommand, DirectDebitBatchId,
        MarkGenerated, ValidateBatch,
    };
    use chrono::TimeZone;
    use verenigingen_core::{Aggregate, AggregateId, TenantId};
    use verenigingen_invoicing::InvoiceId;
    use verenigingen_membership::MemberId;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn creditor() -> CreditorInfo {
        CreditorInfo {
            name: "Vereniging Voorbeeld & Co".to_string(),
            iban: Iban::parse("NL91ABNA0417164300").unwrap(),
            bic: "ABNANL2A".to_string(),
            creditor_id: "NL13ZZZ123456780000".to_string(),
        }
    }

    fn generated_batch() -> DirectDebitBatch {
        let tenant_id = TenantId::new();
        let batch_id = DirectDebitBatchId::new(AggregateId::new());
        let mut b = DirectDebitBatch::empty(batch_id);

        let cmds = vec![
            DirectDebitBatchCommand::CreateBatch(CreateBatch {
                tenant_id,
                batch_id,
                batch_type: BatchType::Recurring,
                collection_date: ymd(2025, 8, 6),
                occurred_at: Utc::now(),
            }),
            DirectDebitBatchCommand::AddEntry(AddEntry {
                tenant_id,
                batch_id,
                invoice_id: InvoiceId::new(AggregateId::new()),
                member_id: MemberId::new(AggregateId::new()),
                member_name: "Jan de Vries".to_string(),
                amount: verenigingen_core::Money::from_cents(1250),
                iban: "NL91ABNA0417164300".to_string(),
                bic: Some("ABNANL2A".to_string()),
                mandate_reference: "VV-2025-000123".to_string(),
                mandate_sign_date: ymd(2025, 1, 10),
                sequence_type: SequenceType::Rcur,
                occurred_at: Utc::now(),
            }),
            DirectDebitBatchCommand::AddEntry(AddEntry {
                tenant_id,
                batch_id,
                invoice_id: InvoiceId::new(AggregateId::new()),
                member_id: MemberId::new(AggregateId::new()),
                member_name: "Fatima <el> Amrani".to_string(),
                amount: verenigingen_core::Money::from_cents(750),
                iban: "DE89370400440532013000".to_string(),
                bic: None,
                mandate_reference: "VV-2025-000124".to_string(),
                mandate_sign_date: ymd(2025, 7, 1),
                sequence_type: SequenceType::Frst,
                occurred_at: Utc::now(),
            }),
            DirectDebitBatchCommand::ValidateBatch(ValidateBatch {
                tenant_id,
                batch_id,
                occurred_at: Utc::now(),
            }),
            DirectDebitBatchCommand::MarkGenerated(MarkGenerated {
                tenant_id,
                batch_id,
                message_id: "VV-BATCH-20250806-001".to_string(),
                occurred_at: Utc::now(),
            }),
        ];
        for cmd in cmds {
            let events = b.handle(&cmd).unwrap();
            for e in &events {
                b.apply(e);
            }
        }
        b
    }

    #[test]
    fn renders_group_header_with_integral_control_sum() {
        let batch = generated_batch();
        let created = Utc.with_ymd_and_hms(2025, 8, 6, 9, 30, 0).unwrap();
        let xml = generate_pain008(&batch, &creditor(), created).unwrap();

        assert!(xml.contains("pain.008.001.08"));
        assert!(xml.contains("<MsgId>VV-BATCH-20250806-001</MsgId>"));
        assert!(xml.contains("<NbOfTxs>2</NbOfTxs>"));
        assert!(xml.contains("<CtrlSum>20.00</CtrlSum>"));
        assert!(xml.contains("<CreDtTm>2025-08-06T09:30:00</CreDtTm>"));
    }

    #[test]
    fn splits_payment_info_per_sequence_type() {
        let batch = generated_batch();
        let xml = generate_pain008(&batch, &creditor(), Utc::now()).unwrap();

        assert_eq!(xml.matches("<PmtInf>").count(), 2);
        assert!(xml.contains("<SeqTp>RCUR</SeqTp>"));
        assert!(xml.contains("<SeqTp>FRST</SeqTp>"));
        assert!(xml.contains("<ReqdColltnDt>2025-08-06</ReqdColltnDt>"));
    }

    #[test]
    fn escapes_names_and_handles_missing_bic() {
        let batch = generated_batch();
        let xml = generate_pain008(&batch, &creditor(), Utc::now()).unwrap();

        assert!(xml.contains("Fatima &lt;el&gt; Amrani"));
        assert!(xml.contains("Vereniging Voorbeeld &amp; Co"));
        assert!(xml.contains("<Othr><Id>NOTPROVIDED</Id></Othr>"));
        assert!(!xml.contains("Fatima <el>"));
    }

    #[test]
    fn requires_generated_batch() {
        let batch_id = DirectDebitBatchId::new(AggregateId::new());
        let batch = DirectDebitBatch::empty(batch_id);
        assert!(generate_pain008(&batch, &creditor(), Utc::now()).is_err());
    }

    #[test]
    fn mandate_details_appear_per_transaction() {
        let batch = generated_batch();
        let xml = generate_pain008(&batch, &creditor(), Utc::now()).unwrap();

        assert!(xml.contains("<MndtId>VV-2025-000123</MndtId>"));
        assert!(xml.contains("<DtOfSgntr>2025-01-10</DtOfSgntr>"));
        assert!(xml.contains(r#"<InstdAmt Ccy="EUR">12.50</InstdAmt>"#));
        assert!(xml.contains(r#"<InstdAmt Ccy="EUR">7.50</InstdAmt>"#));
    }
}

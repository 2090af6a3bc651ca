#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use origin_kernel_contracts::audit::{
    AuditEventId, AuditEventInput, AuditEventType, AuditPayloadMin, PayloadKey, PayloadValue,
};
use origin_kernel_contracts::ledger::Principal;
use origin_kernel_contracts::{LedgerHeight, ReasonCodeId};
use origin_storage::repo::QaAuditRepo;
use origin_storage::store::{QaStore, StorageError};

fn ev(t: u64, subject: &str, event_type: AuditEventType) -> AuditEventInput {
    let mut entries = BTreeMap::new();
    entries.insert(
        PayloadKey::new("status").unwrap(),
        PayloadValue::new("passed").unwrap(),
    );
    AuditEventInput::v1(
        LedgerHeight(t),
        Principal::new("ST1INSPECTOR").unwrap(),
        event_type,
        ReasonCodeId(0x5141_0007),
        subject.to_string(),
        AuditPayloadMin::v1(entries).unwrap(),
    )
    .unwrap()
}

#[test]
fn at_qa_db_audit_01_event_ids_are_monotonic() {
    let mut s = QaStore::new_in_memory();
    let a = s
        .append_audit_row(ev(10, "0xaa", AuditEventType::CheckPerformed))
        .unwrap();
    let b = s
        .append_audit_row(ev(11, "0xaa", AuditEventType::CheckFinalized))
        .unwrap();
    assert_eq!(a, AuditEventId(1));
    assert_eq!(b, AuditEventId(2));
    assert_eq!(s.audit_rows().len(), 2);
}

#[test]
fn at_qa_db_audit_02_rows_are_append_only() {
    let mut s = QaStore::new_in_memory();
    let id = s
        .append_audit_row(ev(10, "0xaa", AuditEventType::CheckPerformed))
        .unwrap();
    assert_eq!(
        s.attempt_overwrite_audit_event(id),
        Err(StorageError::AppendOnlyViolation {
            table: "audit_events"
        })
    );
}

#[test]
fn at_qa_db_audit_03_subject_filter_and_rollback() {
    let mut s = QaStore::new_in_memory();
    s.append_audit_row(ev(10, "0xaa", AuditEventType::CheckPerformed))
        .unwrap();
    s.append_audit_row(ev(11, "0xbb", AuditEventType::CheckPerformed))
        .unwrap();

    let out: Result<(), StorageError> = s.transaction(|tx| {
        tx.append_audit_row(ev(12, "0xaa", AuditEventType::CheckFinalized))?;
        Err(StorageError::AppendOnlyViolation {
            table: "audit_events",
        })
    });
    assert!(out.is_err());

    let rows = s.audit_rows_for_subject("0xaa");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payload_min.get("status"), Some("passed"));
    let next = s
        .append_audit_row(ev(13, "0xaa", AuditEventType::CheckFinalized))
        .unwrap();
    assert_eq!(next, AuditEventId(3));
}

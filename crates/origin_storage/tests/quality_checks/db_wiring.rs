#![forbid(unsafe_code)]

use origin_kernel_contracts::ledger::{CheckId, Principal, ProductId, TemplateId, VerificationHash};
use origin_kernel_contracts::qa::{
    CertificationLevel, CheckResultRecord, CheckStatus, CheckTemplateRecord, InspectorRecord,
    ParameterName, QualityCheckRecord,
};
use origin_kernel_contracts::LedgerHeight;
use origin_storage::repo::{QaCheckRepo, QaCheckTemplateRepo, QaInspectorRepo};
use origin_storage::store::{QaStore, StorageError};

fn inspector() -> Principal {
    Principal::new("ST1INSPECTOR").unwrap()
}

fn template_id() -> TemplateId {
    TemplateId::from_bytes([2; 32]).unwrap()
}

fn check_id(b: u8) -> CheckId {
    CheckId::from_bytes([b; 32]).unwrap()
}

fn param(v: &str) -> ParameterName {
    ParameterName::new(v).unwrap()
}

fn seeded_store() -> QaStore {
    let mut s = QaStore::new_in_memory();
    s.insert_inspector_row(
        InspectorRecord::v1(
            inspector(),
            "J. Smith".to_string(),
            "Global Quality Assurance Inc.".to_string(),
            CertificationLevel(3),
            LedgerHeight(1),
        )
        .unwrap(),
    )
    .unwrap();
    s.insert_check_template_row(
        CheckTemplateRecord::v1(
            template_id(),
            "Coffee Bean Quality Check".to_string(),
            String::new(),
            CertificationLevel(2),
            vec![param("moisture"), param("size")],
            inspector(),
            LedgerHeight(2),
        )
        .unwrap(),
    )
    .unwrap();
    s
}

fn pending(id: u8, template: TemplateId) -> QualityCheckRecord {
    QualityCheckRecord::pending_v1(
        check_id(id),
        ProductId::from_bytes([1; 32]).unwrap(),
        template,
        inspector(),
        "Processing Facility #7".to_string(),
        String::new(),
        LedgerHeight(5),
    )
    .unwrap()
}

fn result(id: u8, p: &str, value: &str, pass: bool) -> CheckResultRecord {
    CheckResultRecord::v1(
        check_id(id),
        param(p),
        value.to_string(),
        pass,
        inspector(),
        LedgerHeight(6),
    )
    .unwrap()
}

#[test]
fn at_qa_db_checks_01_foreign_keys_enforced() {
    let mut s = seeded_store();
    assert!(matches!(
        s.insert_quality_check_row(pending(3, TemplateId::from_bytes([9; 32]).unwrap())),
        Err(StorageError::ForeignKeyViolation {
            table: "quality_checks.template_id",
            ..
        })
    ));
    assert!(matches!(
        s.upsert_check_result_row(result(3, "moisture", "12.5%", true)),
        Err(StorageError::ForeignKeyViolation {
            table: "check_results.check_id",
            ..
        })
    ));

    s.insert_quality_check_row(pending(3, template_id())).unwrap();
    assert!(matches!(
        s.upsert_check_result_row(result(3, "weight", "1kg", true)),
        Err(StorageError::ForeignKeyViolation {
            table: "check_results.parameter",
            ..
        })
    ));
}

#[test]
fn at_qa_db_checks_02_check_id_is_unique_key() {
    let mut s = seeded_store();
    s.insert_quality_check_row(pending(3, template_id())).unwrap();
    assert!(matches!(
        s.insert_quality_check_row(pending(3, template_id())),
        Err(StorageError::DuplicateKey {
            table: "quality_checks",
            ..
        })
    ));
}

#[test]
fn at_qa_db_checks_03_one_result_row_per_parameter() {
    let mut s = seeded_store();
    s.insert_quality_check_row(pending(3, template_id())).unwrap();
    s.upsert_check_result_row(result(3, "size", "14", false))
        .unwrap();
    s.upsert_check_result_row(result(3, "size", "18", true))
        .unwrap();
    s.upsert_check_result_row(result(3, "moisture", "12.5%", true))
        .unwrap();

    let rows = s.check_result_rows_for(&check_id(3));
    assert_eq!(rows.len(), 2);
    let size = s.check_result_row(&check_id(3), &param("size")).unwrap();
    assert_eq!(size.value, "18");
    assert!(size.pass);
}

#[test]
fn at_qa_db_checks_04_finalized_check_is_append_only() {
    let mut s = seeded_store();
    s.insert_quality_check_row(pending(3, template_id())).unwrap();
    s.upsert_check_result_row(result(3, "moisture", "12.5%", true))
        .unwrap();
    let hash = VerificationHash::from_bytes([7; 32]).unwrap();

    let row = s
        .finalize_quality_check(
            &check_id(3),
            CheckStatus::Passed,
            LedgerHeight(8),
            inspector(),
            Some(hash),
        )
        .unwrap();
    assert_eq!(row.verification_hash, Some(hash));

    assert_eq!(
        s.finalize_quality_check(
            &check_id(3),
            CheckStatus::Failed,
            LedgerHeight(9),
            inspector(),
            None
        )
        .map(|_| ()),
        Err(StorageError::AppendOnlyViolation {
            table: "quality_checks"
        })
    );
    assert_eq!(
        s.upsert_check_result_row(result(3, "size", "18", true)),
        Err(StorageError::AppendOnlyViolation {
            table: "check_results"
        })
    );
    assert_eq!(
        s.quality_check_row(&check_id(3)).unwrap().status,
        CheckStatus::Passed
    );
}

#[test]
fn at_qa_db_checks_05_transaction_restores_tables_on_error() {
    let mut s = seeded_store();
    let before = s.clone();
    let out: Result<(), StorageError> = s.transaction(|tx| {
        tx.insert_quality_check_row(pending(3, template_id()))?;
        tx.insert_quality_check_row(pending(3, template_id()))
    });
    assert!(out.is_err());
    assert_eq!(s, before);
    assert!(s.quality_check_row(&check_id(3)).is_none());
}

#[test]
fn at_qa_db_checks_06_rollback_journal_tracks_touched_rows_only() {
    let mut s = seeded_store();
    for i in 0..500u32 {
        s.insert_inspector_row(
            InspectorRecord::v1(
                Principal::new(format!("ST1BULK{i}")).unwrap(),
                "Bulk Inspector".to_string(),
                "Global Quality Assurance Inc.".to_string(),
                CertificationLevel(1),
                LedgerHeight(1),
            )
            .unwrap(),
        )
        .unwrap();
    }
    s.insert_quality_check_row(pending(3, template_id())).unwrap();
    s.upsert_check_result_row(result(3, "moisture", "14%", false))
        .unwrap();
    assert_eq!(s.pending_undo_len(), 0);
    let before = s.clone();

    let out: Result<(), StorageError> = s.transaction(|tx| {
        tx.upsert_check_result_row(result(3, "moisture", "12.5%", true))?;
        tx.upsert_check_result_row(result(3, "size", "18", true))?;
        tx.finalize_quality_check(
            &check_id(3),
            CheckStatus::Failed,
            LedgerHeight(9),
            inspector(),
            None,
        )?;
        assert_eq!(tx.pending_undo_len(), 3);
        Err(StorageError::AppendOnlyViolation {
            table: "quality_checks",
        })
    });

    assert!(out.is_err());
    assert_eq!(s, before);
    assert_eq!(s.pending_undo_len(), 0);
    assert_eq!(
        s.check_result_row(&check_id(3), &param("moisture"))
            .unwrap()
            .value,
        "14%"
    );
    assert!(s.check_result_row(&check_id(3), &param("size")).is_none());
}

#[test]
fn at_qa_db_checks_07_committed_transaction_keeps_writes_and_clears_journal() {
    let mut s = seeded_store();
    let out: Result<(), StorageError> = s.transaction(|tx| {
        tx.insert_quality_check_row(pending(3, template_id()))?;
        let inner: Result<(), StorageError> = tx.transaction(|inner| {
            inner.upsert_check_result_row(result(3, "size", "18", true))?;
            Err(StorageError::AppendOnlyViolation {
                table: "check_results",
            })
        });
        assert!(inner.is_err());
        assert_eq!(tx.pending_undo_len(), 1);
        Ok(())
    });

    assert!(out.is_ok());
    assert_eq!(s.pending_undo_len(), 0);
    assert!(s.quality_check_row(&check_id(3)).is_some());
    assert!(s.check_result_rows_for(&check_id(3)).is_empty());
}

#![forbid(unsafe_code)]

use origin_kernel_contracts::ledger::Principal;
use origin_kernel_contracts::qa::{CertificationLevel, InspectorRecord};
use origin_kernel_contracts::LedgerHeight;
use origin_storage::repo::QaInspectorRepo;
use origin_storage::store::{QaStore, StorageError};

fn principal(v: &str) -> Principal {
    Principal::new(v).unwrap()
}

fn inspector(p: &str, level: u8, at: u64) -> InspectorRecord {
    InspectorRecord::v1(
        principal(p),
        "J. Smith".to_string(),
        "Global Quality Assurance Inc.".to_string(),
        CertificationLevel(level),
        LedgerHeight(at),
    )
    .unwrap()
}

#[test]
fn at_qa_db_inspectors_01_principal_is_unique_key() {
    let mut s = QaStore::new_in_memory();
    s.insert_inspector_row(inspector("ST1INSPECTOR", 3, 10))
        .unwrap();

    let err = s
        .insert_inspector_row(inspector("ST1INSPECTOR", 5, 11))
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::DuplicateKey {
            table: "inspectors",
            ..
        }
    ));
    assert_eq!(
        s.inspector_row(&principal("ST1INSPECTOR"))
            .unwrap()
            .certification_level,
        CertificationLevel(3)
    );
}

#[test]
fn at_qa_db_inspectors_02_update_keeps_registration_height() {
    let mut s = QaStore::new_in_memory();
    s.insert_inspector_row(inspector("ST1INSPECTOR", 2, 10))
        .unwrap();

    let mut raised = inspector("ST1INSPECTOR", 4, 10);
    raised.active = false;
    s.update_inspector_row(raised).unwrap();
    let row = s.inspector_row(&principal("ST1INSPECTOR")).unwrap();
    assert_eq!(row.certification_level, CertificationLevel(4));
    assert!(!row.active);

    assert_eq!(
        s.update_inspector_row(inspector("ST1INSPECTOR", 5, 99)),
        Err(StorageError::AppendOnlyViolation {
            table: "inspectors.registered_at"
        })
    );
}

#[test]
fn at_qa_db_inspectors_03_update_requires_existing_row() {
    let mut s = QaStore::new_in_memory();
    assert!(matches!(
        s.update_inspector_row(inspector("ST1GHOST", 2, 10)),
        Err(StorageError::ForeignKeyViolation {
            table: "inspectors",
            ..
        })
    ));
    assert!(s.inspector_rows().is_empty());
}

#![forbid(unsafe_code)]

use origin_kernel_contracts::ledger::{Principal, TemplateId};
use origin_kernel_contracts::qa::{CertificationLevel, CheckTemplateRecord, ParameterName};
use origin_kernel_contracts::LedgerHeight;
use origin_storage::repo::QaCheckTemplateRepo;
use origin_storage::store::{QaStore, StorageError};

fn template(id: u8, params: &[&str]) -> CheckTemplateRecord {
    CheckTemplateRecord::v1(
        TemplateId::from_bytes([id; 32]).unwrap(),
        "Coffee Bean Quality Check".to_string(),
        "Standard quality check for coffee beans".to_string(),
        CertificationLevel(2),
        params
            .iter()
            .map(|p| ParameterName::new(*p).unwrap())
            .collect(),
        Principal::new("ST1ADMIN").unwrap(),
        LedgerHeight(3),
    )
    .unwrap()
}

#[test]
fn at_qa_db_templates_01_template_id_is_unique_key() {
    let mut s = QaStore::new_in_memory();
    s.insert_check_template_row(template(1, &["moisture", "size"]))
        .unwrap();
    s.insert_check_template_row(template(2, &["color"])).unwrap();

    assert!(matches!(
        s.insert_check_template_row(template(1, &["color"])),
        Err(StorageError::DuplicateKey {
            table: "check_templates",
            ..
        })
    ));
    assert_eq!(s.check_template_rows().len(), 2);
}

#[test]
fn at_qa_db_templates_02_parameter_order_is_preserved() {
    let mut s = QaStore::new_in_memory();
    s.insert_check_template_row(template(1, &["size", "moisture", "color"]))
        .unwrap();
    let row = s
        .check_template_row(&TemplateId::from_bytes([1; 32]).unwrap())
        .unwrap();
    let names: Vec<&str> = row.parameters.iter().map(|p| p.as_str()).collect();
    assert_eq!(names, vec!["size", "moisture", "color"]);
}

#[test]
fn at_qa_db_templates_03_templates_are_immutable() {
    let mut s = QaStore::new_in_memory();
    s.insert_check_template_row(template(1, &["moisture"]))
        .unwrap();
    assert_eq!(
        s.attempt_overwrite_check_template(&TemplateId::from_bytes([1; 32]).unwrap()),
        Err(StorageError::AppendOnlyViolation {
            table: "check_templates"
        })
    );
}

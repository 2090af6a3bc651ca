#![forbid(unsafe_code)]

use origin_kernel_contracts::ledger::{Principal, ProductId, VerificationHash};
use origin_kernel_contracts::product::VerificationSource;
use origin_kernel_contracts::LedgerHeight;
use origin_storage::registry::{ConsumerVerificationStore, ProductRegistryStore, RegistryError};
use origin_storage::repo::{ConsumerVerification, ProductRegistry, VerificationError};

fn principal(v: &str) -> Principal {
    Principal::new(v).unwrap()
}

fn product(b: u8) -> ProductId {
    ProductId::from_bytes([b; 32]).unwrap()
}

fn hash(b: u8) -> VerificationHash {
    VerificationHash::from_bytes([b; 32]).unwrap()
}

fn registry() -> ProductRegistryStore {
    let mut r = ProductRegistryStore::new_in_memory();
    r.register_product(
        LedgerHeight(1),
        product(1),
        "Organic Coffee Beans".to_string(),
        principal("ST1MANUFACTURER"),
    )
    .unwrap();
    r
}

#[test]
fn at_qa_db_products_01_registration_and_transfer() {
    let mut r = registry();
    assert_eq!(
        r.register_product(
            LedgerHeight(2),
            product(1),
            "Copy".to_string(),
            principal("ST1OTHER")
        ),
        Err(RegistryError::ProductExists(product(1)))
    );
    assert!(r.product_exists(&product(1)));
    assert!(!r.product_exists(&product(2)));

    assert_eq!(
        r.transfer_product(&principal("ST1OTHER"), &product(1), principal("ST1OTHER")),
        Err(RegistryError::NotProductOwner(product(1)))
    );
    r.transfer_product(
        &principal("ST1MANUFACTURER"),
        &product(1),
        principal("ST1DISTRIBUTOR"),
    )
    .unwrap();
    assert_eq!(
        r.current_owner(&product(1)),
        Some(principal("ST1DISTRIBUTOR"))
    );
}

#[test]
fn at_qa_db_products_02_owner_verification_gated_by_registry() {
    let r = registry();
    let mut v = ConsumerVerificationStore::new_in_memory();

    assert_eq!(
        v.add_verification(&r, &principal("ST1MANUFACTURER"), &product(2), hash(1)),
        Err(VerificationError::ProductNotFound(product(2)))
    );
    assert_eq!(
        v.add_verification(&r, &principal("ST1OTHER"), &product(1), hash(1)),
        Err(VerificationError::NotProductOwner(product(1)))
    );
    v.add_verification(&r, &principal("ST1MANUFACTURER"), &product(1), hash(1))
        .unwrap();

    assert!(v.verify_product(&product(1), &hash(1)));
    assert!(!v.verify_product(&product(1), &hash(2)));
    assert!(!v.verify_product(&product(2), &hash(1)));
    assert_eq!(
        v.get_verification(&product(1)).unwrap().source,
        VerificationSource::Owner
    );
}

#[test]
fn at_qa_db_products_03_engine_hash_replaces_previous() {
    let r = registry();
    let mut v = ConsumerVerificationStore::new_in_memory();
    v.add_verification(&r, &principal("ST1MANUFACTURER"), &product(1), hash(1))
        .unwrap();
    v.record_hash(&product(1), hash(2)).unwrap();

    assert!(v.verify(&product(1), &hash(2)));
    assert!(!v.verify(&product(1), &hash(1)));
    assert_eq!(
        v.get_verification(&product(1)).unwrap().source,
        VerificationSource::QualityAssurance
    );
}

#[test]
fn at_qa_db_products_04_owner_cannot_replace_verdict_hash() {
    let r = registry();
    let mut v = ConsumerVerificationStore::new_in_memory();
    v.record_hash(&product(1), hash(3)).unwrap();

    assert_eq!(
        v.add_verification(&r, &principal("ST1MANUFACTURER"), &product(1), hash(4)),
        Err(VerificationError::VerdictHashLocked(product(1)))
    );
    assert!(v.verify_product(&product(1), &hash(3)));
    assert!(!v.verify_product(&product(1), &hash(4)));

    v.record_hash(&product(1), hash(5)).unwrap();
    assert!(v.verify_product(&product(1), &hash(5)));
}

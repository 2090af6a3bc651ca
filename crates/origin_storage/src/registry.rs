#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use origin_kernel_contracts::ledger::{Principal, ProductId, VerificationHash};
use origin_kernel_contracts::product::{ProductRecord, VerificationRecord, VerificationSource};
use origin_kernel_contracts::{ContractViolation, LedgerHeight};

use crate::repo::{ConsumerVerification, ProductRegistry, VerificationError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("product {0} is already registered")]
    ProductExists(ProductId),
    #[error("product {0} is not registered")]
    ProductNotFound(ProductId),
    #[error("caller is not the current owner of product {0}")]
    NotProductOwner(ProductId),
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

/// In-memory product registration table: identity and current owner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductRegistryStore {
    products: BTreeMap<ProductId, ProductRecord>,
}

impl ProductRegistryStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn register_product(
        &mut self,
        now: LedgerHeight,
        product_id: ProductId,
        name: String,
        owner: Principal,
    ) -> Result<(), RegistryError> {
        if self.products.contains_key(&product_id) {
            return Err(RegistryError::ProductExists(product_id));
        }
        let record = ProductRecord::v1(product_id, name, owner, now)?;
        self.products.insert(product_id, record);
        Ok(())
    }

    /// Only the current owner may hand a product on.
    pub fn transfer_product(
        &mut self,
        caller: &Principal,
        product_id: &ProductId,
        new_owner: Principal,
    ) -> Result<(), RegistryError> {
        let Some(record) = self.products.get_mut(product_id) else {
            return Err(RegistryError::ProductNotFound(*product_id));
        };
        if &record.owner != caller {
            return Err(RegistryError::NotProductOwner(*product_id));
        }
        record.owner = new_owner;
        Ok(())
    }

    pub fn get_product(&self, product_id: &ProductId) -> Option<&ProductRecord> {
        self.products.get(product_id)
    }

    pub fn products(&self) -> &BTreeMap<ProductId, ProductRecord> {
        &self.products
    }
}

impl ProductRegistry for ProductRegistryStore {
    fn product_exists(&self, product_id: &ProductId) -> bool {
        self.products.contains_key(product_id)
    }

    fn current_owner(&self, product_id: &ProductId) -> Option<Principal> {
        self.products.get(product_id).map(|p| p.owner.clone())
    }
}

/// In-memory consumer verification table: one current hash per product.
///
/// Owners publish through [`ConsumerVerificationStore::add_verification`]; the
/// quality-assurance engine publishes passed verdicts through [`ConsumerVerification::record_hash`].
/// A verdict hash replaces any previous row. An owner hash never replaces a verdict hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerVerificationStore {
    verifications: BTreeMap<ProductId, VerificationRecord>,
}

impl ConsumerVerificationStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn add_verification<P: ProductRegistry>(
        &mut self,
        products: &P,
        caller: &Principal,
        product_id: &ProductId,
        hash: VerificationHash,
    ) -> Result<(), VerificationError> {
        match products.current_owner(product_id) {
            None => return Err(VerificationError::ProductNotFound(*product_id)),
            Some(owner) if &owner != caller => {
                return Err(VerificationError::NotProductOwner(*product_id))
            }
            Some(_) => {}
        }
        if self
            .verifications
            .get(product_id)
            .is_some_and(|r| r.source == VerificationSource::QualityAssurance)
        {
            return Err(VerificationError::VerdictHashLocked(*product_id));
        }
        let record = VerificationRecord::v1(*product_id, hash, VerificationSource::Owner)?;
        self.verifications.insert(*product_id, record);
        Ok(())
    }

    /// Anyone may check a presented hash against the stored one.
    pub fn verify_product(&self, product_id: &ProductId, hash: &VerificationHash) -> bool {
        self.verifications
            .get(product_id)
            .is_some_and(|r| &r.hash == hash)
    }

    pub fn get_verification(&self, product_id: &ProductId) -> Option<&VerificationRecord> {
        self.verifications.get(product_id)
    }
}

impl ConsumerVerification for ConsumerVerificationStore {
    fn record_hash(
        &mut self,
        product_id: &ProductId,
        hash: VerificationHash,
    ) -> Result<(), VerificationError> {
        let record =
            VerificationRecord::v1(*product_id, hash, VerificationSource::QualityAssurance)?;
        self.verifications.insert(*product_id, record);
        Ok(())
    }

    fn verify(&self, product_id: &ProductId, hash: &VerificationHash) -> bool {
        self.verify_product(product_id, hash)
    }
}

#![forbid(unsafe_code)]

use origin_kernel_contracts::ledger::{Principal, ProductId, VerificationHash};
use origin_kernel_contracts::product::ProductRecord;
use origin_kernel_contracts::qa::{QaRequest, QaResponse};
use origin_kernel_contracts::{ContractViolation, LedgerHeight};
use origin_storage::registry::{ConsumerVerificationStore, ProductRegistryStore, RegistryError};
use origin_storage::repo::VerificationError;
use origin_storage::store::QaStore;
use tracing::debug;

use crate::quality_assurance::{QaConfig, QaError, QualityAssuranceRuntime};

/// Hosts the product registry, the quality-assurance tables and the consumer verification
/// table behind one serialized call surface.
///
/// `&mut self` on every write means calls never interleave.
#[derive(Debug, Clone)]
pub struct TraceabilityLedger {
    runtime: QualityAssuranceRuntime,
    qa: QaStore,
    products: ProductRegistryStore,
    verification: ConsumerVerificationStore,
}

impl TraceabilityLedger {
    pub fn new(config: QaConfig) -> Result<Self, ContractViolation> {
        Ok(Self {
            runtime: QualityAssuranceRuntime::new(config)?,
            qa: QaStore::new_in_memory(),
            products: ProductRegistryStore::new_in_memory(),
            verification: ConsumerVerificationStore::new_in_memory(),
        })
    }

    /// One quality-assurance call. Either every store reflects it or none does: the verdict
    /// publish is the runtime's last effect and `record_hash` writes nothing on `Err`.
    pub fn call(&mut self, req: &QaRequest) -> Result<QaResponse, QaError> {
        self.runtime
            .run(&mut self.qa, &self.products, &mut self.verification, req)
    }

    pub fn register_product(
        &mut self,
        caller: &Principal,
        now: LedgerHeight,
        product_id: ProductId,
        name: String,
    ) -> Result<(), RegistryError> {
        self.products
            .register_product(now, product_id, name, caller.clone())?;
        debug!(product_id = %product_id, owner = %caller, "product registered");
        Ok(())
    }

    pub fn transfer_product(
        &mut self,
        caller: &Principal,
        product_id: &ProductId,
        new_owner: Principal,
    ) -> Result<(), RegistryError> {
        self.products
            .transfer_product(caller, product_id, new_owner.clone())?;
        debug!(product_id = %product_id, new_owner = %new_owner, "product transferred");
        Ok(())
    }

    pub fn get_product(&self, product_id: &ProductId) -> Option<&ProductRecord> {
        self.products.get_product(product_id)
    }

    pub fn add_verification(
        &mut self,
        caller: &Principal,
        product_id: &ProductId,
        hash: VerificationHash,
    ) -> Result<(), VerificationError> {
        self.verification
            .add_verification(&self.products, caller, product_id, hash)?;
        debug!(product_id = %product_id, "owner verification recorded");
        Ok(())
    }

    pub fn verify_product(&self, product_id: &ProductId, hash: &VerificationHash) -> bool {
        self.verification.verify_product(product_id, hash)
    }

    pub fn qa_store(&self) -> &QaStore {
        &self.qa
    }

    pub fn product_registry(&self) -> &ProductRegistryStore {
        &self.products
    }

    pub fn verification_store(&self) -> &ConsumerVerificationStore {
        &self.verification
    }

    pub fn config(&self) -> &QaConfig {
        self.runtime.config()
    }
}

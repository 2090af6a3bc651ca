#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::ledger::{Principal, ProductId, VerificationHash};
use crate::{ContractViolation, LedgerHeight, SchemaVersion, Validate};

pub const PRODUCT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const PRODUCT_NAME_MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub schema_version: SchemaVersion,
    pub product_id: ProductId,
    pub name: String,
    pub owner: Principal,
    pub registered_at: LedgerHeight,
}

impl ProductRecord {
    pub fn v1(
        product_id: ProductId,
        name: String,
        owner: Principal,
        registered_at: LedgerHeight,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: PRODUCT_CONTRACT_VERSION,
            product_id,
            name,
            owner,
            registered_at,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for ProductRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PRODUCT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "product_record.schema_version",
                reason: "must match PRODUCT_CONTRACT_VERSION",
            });
        }
        self.product_id.validate()?;
        validate_text("product_record.name", &self.name, PRODUCT_NAME_MAX_LEN)?;
        self.owner.validate()?;
        self.registered_at.validate()
    }
}

/// Who wrote the currently stored verification hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationSource {
    Owner,
    QualityAssurance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub schema_version: SchemaVersion,
    pub product_id: ProductId,
    pub hash: VerificationHash,
    pub source: VerificationSource,
}

impl VerificationRecord {
    pub fn v1(
        product_id: ProductId,
        hash: VerificationHash,
        source: VerificationSource,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: PRODUCT_CONTRACT_VERSION,
            product_id,
            hash,
            source,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for VerificationRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PRODUCT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "verification_record.schema_version",
                reason: "must match PRODUCT_CONTRACT_VERSION",
            });
        }
        self.product_id.validate()?;
        self.hash.validate()
    }
}

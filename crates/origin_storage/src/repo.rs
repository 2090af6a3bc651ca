#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use origin_kernel_contracts::audit::{AuditEvent, AuditEventId, AuditEventInput};
use origin_kernel_contracts::ledger::{CheckId, Principal, ProductId, TemplateId, VerificationHash};
use origin_kernel_contracts::qa::{
    CheckResultRecord, CheckTemplateRecord, InspectorRecord, ParameterName, QualityCheckRecord,
};
use origin_kernel_contracts::ContractViolation;

use crate::store::{QaStore, StorageError};

/// Typed repository interface for inspector profile rows.
pub trait QaInspectorRepo {
    fn insert_inspector_row(&mut self, record: InspectorRecord) -> Result<(), StorageError>;
    fn update_inspector_row(&mut self, record: InspectorRecord) -> Result<(), StorageError>;
    fn inspector_row(&self, principal: &Principal) -> Option<&InspectorRecord>;
    fn inspector_rows(&self) -> &BTreeMap<Principal, InspectorRecord>;
}

/// Typed repository interface for immutable check template rows.
pub trait QaCheckTemplateRepo {
    fn insert_check_template_row(&mut self, record: CheckTemplateRecord)
        -> Result<(), StorageError>;
    fn check_template_row(&self, template_id: &TemplateId) -> Option<&CheckTemplateRecord>;
    fn check_template_rows(&self) -> &BTreeMap<TemplateId, CheckTemplateRecord>;
}

/// Typed repository interface for quality checks and their per-parameter results.
pub trait QaCheckRepo {
    fn insert_quality_check_row(&mut self, record: QualityCheckRecord) -> Result<(), StorageError>;
    fn quality_check_row(&self, check_id: &CheckId) -> Option<&QualityCheckRecord>;
    fn upsert_check_result_row(&mut self, record: CheckResultRecord) -> Result<(), StorageError>;
    fn check_result_row(
        &self,
        check_id: &CheckId,
        parameter: &ParameterName,
    ) -> Option<&CheckResultRecord>;
    fn check_result_rows_for(&self, check_id: &CheckId) -> Vec<&CheckResultRecord>;
}

/// Typed repository interface for the append-only audit ledger.
pub trait QaAuditRepo {
    fn append_audit_row(&mut self, input: AuditEventInput) -> Result<AuditEventId, StorageError>;
    fn audit_rows(&self) -> &[AuditEvent];
    fn audit_rows_for_subject(&self, subject: &str) -> Vec<&AuditEvent>;
}

impl QaInspectorRepo for QaStore {
    fn insert_inspector_row(&mut self, record: InspectorRecord) -> Result<(), StorageError> {
        self.insert_inspector(record)
    }

    fn update_inspector_row(&mut self, record: InspectorRecord) -> Result<(), StorageError> {
        self.update_inspector(record)
    }

    fn inspector_row(&self, principal: &Principal) -> Option<&InspectorRecord> {
        self.get_inspector(principal)
    }

    fn inspector_rows(&self) -> &BTreeMap<Principal, InspectorRecord> {
        self.inspectors()
    }
}

impl QaCheckTemplateRepo for QaStore {
    fn insert_check_template_row(
        &mut self,
        record: CheckTemplateRecord,
    ) -> Result<(), StorageError> {
        self.insert_check_template(record)
    }

    fn check_template_row(&self, template_id: &TemplateId) -> Option<&CheckTemplateRecord> {
        self.get_check_template(template_id)
    }

    fn check_template_rows(&self) -> &BTreeMap<TemplateId, CheckTemplateRecord> {
        self.check_templates()
    }
}

impl QaCheckRepo for QaStore {
    fn insert_quality_check_row(&mut self, record: QualityCheckRecord) -> Result<(), StorageError> {
        self.insert_quality_check(record)
    }

    fn quality_check_row(&self, check_id: &CheckId) -> Option<&QualityCheckRecord> {
        self.get_quality_check(check_id)
    }

    fn upsert_check_result_row(&mut self, record: CheckResultRecord) -> Result<(), StorageError> {
        self.upsert_check_result(record)
    }

    fn check_result_row(
        &self,
        check_id: &CheckId,
        parameter: &ParameterName,
    ) -> Option<&CheckResultRecord> {
        self.get_check_result(check_id, parameter)
    }

    fn check_result_rows_for(&self, check_id: &CheckId) -> Vec<&CheckResultRecord> {
        self.check_results_for(check_id)
    }
}

impl QaAuditRepo for QaStore {
    fn append_audit_row(&mut self, input: AuditEventInput) -> Result<AuditEventId, StorageError> {
        self.append_audit_event(input)
    }

    fn audit_rows(&self) -> &[AuditEvent] {
        self.audit_events()
    }

    fn audit_rows_for_subject(&self, subject: &str) -> Vec<&AuditEvent> {
        self.audit_events_for_subject(subject)
    }
}

// ------------------------
// Collaborating stores consumed by the quality-assurance engine.
// ------------------------

/// Product identity and ownership, as exposed by the product registry.
pub trait ProductRegistry {
    fn product_exists(&self, product_id: &ProductId) -> bool;
    fn current_owner(&self, product_id: &ProductId) -> Option<Principal>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("product {0} is not registered")]
    ProductNotFound(ProductId),
    #[error("caller is not the current owner of product {0}")]
    NotProductOwner(ProductId),
    #[error("product {0} carries a quality-assurance verdict hash")]
    VerdictHashLocked(ProductId),
    #[error("verification store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

/// Content-hash authenticity proofs, as exposed by the consumer verification store.
///
/// `record_hash` must be all-or-nothing: on `Err` nothing is written.
pub trait ConsumerVerification {
    fn record_hash(
        &mut self,
        product_id: &ProductId,
        hash: VerificationHash,
    ) -> Result<(), VerificationError>;
    fn verify(&self, product_id: &ProductId, hash: &VerificationHash) -> bool;
}

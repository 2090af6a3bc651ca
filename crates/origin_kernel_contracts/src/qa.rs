#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{validate_opt_text, validate_text};
use crate::ledger::{CheckId, Principal, ProductId, TemplateId, VerificationHash};
use crate::{ContractViolation, LedgerHeight, SchemaVersion, Validate};

pub const QA_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const INSPECTOR_NAME_MAX_LEN: usize = 64;
pub const ORGANIZATION_MAX_LEN: usize = 128;
pub const TEMPLATE_NAME_MAX_LEN: usize = 64;
pub const TEMPLATE_DESCRIPTION_MAX_LEN: usize = 256;
pub const TEMPLATE_MAX_PARAMETERS: usize = 32;
pub const PARAMETER_NAME_MAX_LEN: usize = 64;
pub const LOCATION_MAX_LEN: usize = 128;
pub const NOTES_MAX_LEN: usize = 512;
pub const RESULT_VALUE_MAX_LEN: usize = 128;

fn validate_schema(field: &'static str, v: SchemaVersion) -> Result<(), ContractViolation> {
    if v != QA_CONTRACT_VERSION {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must match QA_CONTRACT_VERSION",
        });
    }
    Ok(())
}

/// Numeric certification tier. Gating is always `held >= required`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CertificationLevel(pub u8);

impl Validate for CertificationLevel {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "certification_level",
                reason: "must be >= 1",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectorRecord {
    pub schema_version: SchemaVersion,
    pub principal: Principal,
    pub name: String,
    pub organization: String,
    pub certification_level: CertificationLevel,
    pub active: bool,
    pub registered_at: LedgerHeight,
}

impl InspectorRecord {
    pub fn v1(
        principal: Principal,
        name: String,
        organization: String,
        certification_level: CertificationLevel,
        registered_at: LedgerHeight,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: QA_CONTRACT_VERSION,
            principal,
            name,
            organization,
            certification_level,
            active: true,
            registered_at,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for InspectorRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_schema("inspector_record.schema_version", self.schema_version)?;
        self.principal.validate()?;
        validate_text("inspector_record.name", &self.name, INSPECTOR_NAME_MAX_LEN)?;
        validate_text(
            "inspector_record.organization",
            &self.organization,
            ORGANIZATION_MAX_LEN,
        )?;
        self.certification_level.validate()?;
        self.registered_at.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParameterName(String);

impl ParameterName {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let p = Self(v.into());
        p.validate()?;
        Ok(p)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ParameterName {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("parameter_name", &self.0, PARAMETER_NAME_MAX_LEN)?;
        if self.0.trim() != self.0 {
            return Err(ContractViolation::InvalidValue {
                field: "parameter_name",
                reason: "must not have leading or trailing whitespace",
            });
        }
        Ok(())
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTemplateRecord {
    pub schema_version: SchemaVersion,
    pub template_id: TemplateId,
    pub name: String,
    pub description: String,
    pub required_certification_level: CertificationLevel,
    pub parameters: Vec<ParameterName>,
    pub author: Principal,
    pub created_at: LedgerHeight,
}

impl CheckTemplateRecord {
    pub fn v1(
        template_id: TemplateId,
        name: String,
        description: String,
        required_certification_level: CertificationLevel,
        parameters: Vec<ParameterName>,
        author: Principal,
        created_at: LedgerHeight,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: QA_CONTRACT_VERSION,
            template_id,
            name,
            description,
            required_certification_level,
            parameters,
            author,
            created_at,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn declares(&self, parameter: &ParameterName) -> bool {
        self.parameters.iter().any(|p| p == parameter)
    }
}

impl Validate for CheckTemplateRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_schema("check_template_record.schema_version", self.schema_version)?;
        self.template_id.validate()?;
        validate_text("check_template_record.name", &self.name, TEMPLATE_NAME_MAX_LEN)?;
        validate_opt_text(
            "check_template_record.description",
            &self.description,
            TEMPLATE_DESCRIPTION_MAX_LEN,
        )?;
        self.required_certification_level.validate()?;
        if self.parameters.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "check_template_record.parameters",
                reason: "must not be empty",
            });
        }
        if self.parameters.len() > TEMPLATE_MAX_PARAMETERS {
            return Err(ContractViolation::InvalidValue {
                field: "check_template_record.parameters",
                reason: "must be <= 32 entries",
            });
        }
        let mut seen = BTreeSet::new();
        for p in &self.parameters {
            p.validate()?;
            if !seen.insert(p) {
                return Err(ContractViolation::InvalidValue {
                    field: "check_template_record.parameters",
                    reason: "parameter names must be unique",
                });
            }
        }
        self.author.validate()?;
        self.created_at.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Passed,
    Failed,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pending => "pending",
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
        }
    }

    pub fn is_final(self) -> bool {
        !matches!(self, CheckStatus::Pending)
    }
}

impl FromStr for CheckStatus {
    type Err = ContractViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CheckStatus::Pending),
            "passed" => Ok(CheckStatus::Passed),
            "failed" => Ok(CheckStatus::Failed),
            _ => Err(ContractViolation::InvalidValue {
                field: "check_status",
                reason: "must be one of pending, passed, failed",
            }),
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCheckRecord {
    pub schema_version: SchemaVersion,
    pub check_id: CheckId,
    pub product_id: ProductId,
    pub template_id: TemplateId,
    pub inspector: Principal,
    pub location: String,
    pub notes: String,
    pub status: CheckStatus,
    pub created_at: LedgerHeight,
    pub finalized_at: Option<LedgerHeight>,
    pub finalized_by: Option<Principal>,
    pub verification_hash: Option<VerificationHash>,
}

impl QualityCheckRecord {
    /// New checks always start `pending`.
    pub fn pending_v1(
        check_id: CheckId,
        product_id: ProductId,
        template_id: TemplateId,
        inspector: Principal,
        location: String,
        notes: String,
        created_at: LedgerHeight,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: QA_CONTRACT_VERSION,
            check_id,
            product_id,
            template_id,
            inspector,
            location,
            notes,
            status: CheckStatus::Pending,
            created_at,
            finalized_at: None,
            finalized_by: None,
            verification_hash: None,
        };
        r.validate()?;
        Ok(r)
    }

    /// Terminal transition. `verification_hash` must be present exactly when `status` is `passed`.
    pub fn finalized(
        &self,
        status: CheckStatus,
        finalized_at: LedgerHeight,
        finalized_by: Principal,
        verification_hash: Option<VerificationHash>,
    ) -> Result<Self, ContractViolation> {
        if self.status.is_final() {
            return Err(ContractViolation::InvalidValue {
                field: "quality_check_record.status",
                reason: "already finalized",
            });
        }
        let r = Self {
            status,
            finalized_at: Some(finalized_at),
            finalized_by: Some(finalized_by),
            verification_hash,
            ..self.clone()
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for QualityCheckRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_schema("quality_check_record.schema_version", self.schema_version)?;
        self.check_id.validate()?;
        self.product_id.validate()?;
        self.template_id.validate()?;
        self.inspector.validate()?;
        validate_text("quality_check_record.location", &self.location, LOCATION_MAX_LEN)?;
        validate_opt_text("quality_check_record.notes", &self.notes, NOTES_MAX_LEN)?;
        self.created_at.validate()?;

        match (self.status, self.finalized_at, &self.finalized_by) {
            (CheckStatus::Pending, None, None) => {}
            (CheckStatus::Pending, _, _) => {
                return Err(ContractViolation::InvalidValue {
                    field: "quality_check_record.finalized_at",
                    reason: "must be absent while pending",
                });
            }
            (_, Some(at), Some(by)) => {
                at.validate()?;
                by.validate()?;
                if at < self.created_at {
                    return Err(ContractViolation::InvalidValue {
                        field: "quality_check_record.finalized_at",
                        reason: "must be >= created_at",
                    });
                }
            }
            _ => {
                return Err(ContractViolation::InvalidValue {
                    field: "quality_check_record.finalized_at",
                    reason: "must be present once finalized",
                });
            }
        }

        if (self.status == CheckStatus::Passed) != self.verification_hash.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "quality_check_record.verification_hash",
                reason: "must be present exactly when status is passed",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResultRecord {
    pub schema_version: SchemaVersion,
    pub check_id: CheckId,
    pub parameter: ParameterName,
    pub value: String,
    pub pass: bool,
    pub recorded_by: Principal,
    pub recorded_at: LedgerHeight,
}

impl CheckResultRecord {
    pub fn v1(
        check_id: CheckId,
        parameter: ParameterName,
        value: String,
        pass: bool,
        recorded_by: Principal,
        recorded_at: LedgerHeight,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: QA_CONTRACT_VERSION,
            check_id,
            parameter,
            value,
            pass,
            recorded_by,
            recorded_at,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for CheckResultRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_schema("check_result_record.schema_version", self.schema_version)?;
        self.check_id.validate()?;
        self.parameter.validate()?;
        validate_text("check_result_record.value", &self.value, RESULT_VALUE_MAX_LEN)?;
        self.recorded_by.validate()?;
        self.recorded_at.validate()?;
        Ok(())
    }
}

// ------------------------
// Call surface.
// ------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterInspectorRequest {
    pub name: String,
    pub organization: String,
    pub certification_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetInspectorLevelRequest {
    pub inspector: Principal,
    pub certification_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetInspectorActiveRequest {
    pub inspector: Principal,
    pub active: bool,
}

/// Parameters stay raw strings so empty and duplicate sets surface as distinct errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckTemplateRequest {
    pub template_id: TemplateId,
    pub name: String,
    pub description: String,
    pub required_certification_level: u8,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformQualityCheckRequest {
    pub check_id: CheckId,
    pub product_id: ProductId,
    pub template_id: TemplateId,
    pub location: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCheckResultRequest {
    pub check_id: CheckId,
    pub parameter: String,
    pub value: String,
    pub pass: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeQualityCheckRequest {
    pub check_id: CheckId,
    pub status: CheckStatus,
}

/// State-changing calls. Each one commits atomically or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaCommand {
    RegisterInspector(RegisterInspectorRequest),
    SetInspectorCertificationLevel(SetInspectorLevelRequest),
    SetInspectorActive(SetInspectorActiveRequest),
    CreateCheckTemplate(CreateCheckTemplateRequest),
    PerformQualityCheck(PerformQualityCheckRequest),
    RecordCheckResult(RecordCheckResultRequest),
    FinalizeQualityCheck(FinalizeQualityCheckRequest),
}

impl QaCommand {
    pub fn name(&self) -> &'static str {
        match self {
            QaCommand::RegisterInspector(_) => "register-inspector",
            QaCommand::SetInspectorCertificationLevel(_) => "set-inspector-certification-level",
            QaCommand::SetInspectorActive(_) => "set-inspector-active",
            QaCommand::CreateCheckTemplate(_) => "create-check-template",
            QaCommand::PerformQualityCheck(_) => "perform-quality-check",
            QaCommand::RecordCheckResult(_) => "record-check-result",
            QaCommand::FinalizeQualityCheck(_) => "finalize-quality-check",
        }
    }
}

/// Read-only lookups; never mutate and need no authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaQuery {
    GetInspector(Principal),
    GetCheckTemplate(TemplateId),
    GetCheck(CheckId),
    GetCheckResult { check_id: CheckId, parameter: String },
    GetCheckResults(CheckId),
    CheckPassed(CheckId),
}

impl QaQuery {
    pub fn name(&self) -> &'static str {
        match self {
            QaQuery::GetInspector(_) => "get-inspector",
            QaQuery::GetCheckTemplate(_) => "get-check-template",
            QaQuery::GetCheck(_) => "get-check",
            QaQuery::GetCheckResult { .. } => "get-check-result",
            QaQuery::GetCheckResults(_) => "get-check-results",
            QaQuery::CheckPassed(_) => "check-passed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaOperation {
    Command(QaCommand),
    Query(QaQuery),
}

impl QaOperation {
    pub fn name(&self) -> &'static str {
        match self {
            QaOperation::Command(c) => c.name(),
            QaOperation::Query(q) => q.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaRequest {
    pub schema_version: SchemaVersion,
    pub caller: Principal,
    pub now: LedgerHeight,
    pub operation: QaOperation,
}

impl QaRequest {
    pub fn v1(
        caller: Principal,
        now: LedgerHeight,
        operation: QaOperation,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: QA_CONTRACT_VERSION,
            caller,
            now,
            operation,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for QaRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_schema("qa_request.schema_version", self.schema_version)?;
        self.caller.validate()?;
        self.now.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaResponse {
    /// `ok(true)` for every mutating operation.
    Committed,
    Inspector(Option<InspectorRecord>),
    Template(Option<CheckTemplateRecord>),
    Check(Option<QualityCheckRecord>),
    CheckResult(Option<CheckResultRecord>),
    CheckResults(Vec<CheckResultRecord>),
    CheckPassed(bool),
}

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use origin_engines::authz::CallerRole;
use origin_engines::verdict::{
    evaluate_finalize, results_in_template_order, verdict_hash, FinalizeRejection, VerdictPolicy,
};
use origin_kernel_contracts::audit::{
    AuditEventInput, AuditEventType, AuditPayloadMin, PayloadKey, PayloadValue,
};
use origin_kernel_contracts::ledger::Principal;
use origin_kernel_contracts::qa::{
    CertificationLevel, CheckResultRecord, CheckStatus, CheckTemplateRecord,
    CreateCheckTemplateRequest, FinalizeQualityCheckRequest, InspectorRecord, ParameterName,
    PerformQualityCheckRequest, QaCommand, QaOperation, QaQuery, QaRequest, QaResponse,
    QualityCheckRecord, RecordCheckResultRequest, RegisterInspectorRequest,
    SetInspectorActiveRequest, SetInspectorLevelRequest,
};
use origin_kernel_contracts::{ContractViolation, LedgerHeight, ReasonCodeId, Validate};
use origin_storage::repo::{ConsumerVerification, ProductRegistry, VerificationError};
use origin_storage::store::{QaStore, StorageError};
use tracing::{debug, warn};

pub mod reason_codes {
    use origin_kernel_contracts::ReasonCodeId;

    // QA reason-code namespace.
    pub const QA_OK_REGISTER_INSPECTOR: ReasonCodeId = ReasonCodeId(0x5141_0001);
    pub const QA_OK_SET_INSPECTOR_LEVEL: ReasonCodeId = ReasonCodeId(0x5141_0002);
    pub const QA_OK_SET_INSPECTOR_ACTIVE: ReasonCodeId = ReasonCodeId(0x5141_0003);
    pub const QA_OK_CREATE_CHECK_TEMPLATE: ReasonCodeId = ReasonCodeId(0x5141_0004);
    pub const QA_OK_PERFORM_QUALITY_CHECK: ReasonCodeId = ReasonCodeId(0x5141_0005);
    pub const QA_OK_RECORD_CHECK_RESULT: ReasonCodeId = ReasonCodeId(0x5141_0006);
    pub const QA_OK_FINALIZE_PASSED: ReasonCodeId = ReasonCodeId(0x5141_0007);
    pub const QA_OK_FINALIZE_FAILED: ReasonCodeId = ReasonCodeId(0x5141_0008);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaConfig {
    pub admin: Principal,
    pub template_author_min_level: u8,
    pub max_certification_level: u8,
    pub verdict_policy: VerdictPolicy,
}

impl QaConfig {
    pub fn mvp_v1(admin: Principal) -> Self {
        Self {
            admin,
            template_author_min_level: 2,
            max_certification_level: 5,
            verdict_policy: VerdictPolicy::AggregateMustMatch,
        }
    }

    pub fn with_verdict_policy(mut self, verdict_policy: VerdictPolicy) -> Self {
        self.verdict_policy = verdict_policy;
        self
    }
}

impl Validate for QaConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.admin.validate()?;
        if self.max_certification_level == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "qa_config.max_certification_level",
                reason: "must be >= 1",
            });
        }
        if self.template_author_min_level == 0
            || self.template_author_min_level > self.max_certification_level
        {
            return Err(ContractViolation::InvalidValue {
                field: "qa_config.template_author_min_level",
                reason: "must be within 1..=max_certification_level",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QaError {
    #[error("caller is already a registered inspector")]
    AlreadyRegistered,
    #[error("inspector not found")]
    InspectorNotFound,
    #[error("certification level may only increase")]
    CertificationDowngrade,
    #[error("check template already exists")]
    TemplateExists,
    #[error("check template must declare at least one parameter")]
    EmptyParameterSet,
    #[error("parameter {0} is declared more than once")]
    DuplicateParameter(String),
    #[error("caller is not authorized for this operation")]
    NotAuthorized,
    #[error("quality check already exists")]
    CheckExists,
    #[error("check template not found")]
    TemplateNotFound,
    #[error("product is not registered")]
    ProductNotFound,
    #[error("certification level {held:?} is below required level {required}")]
    InsufficientCertification {
        required: u8,
        held: Option<u8>,
    },
    #[error("quality check not found")]
    CheckNotFound,
    #[error("quality check is already finalized")]
    CheckFinalized,
    #[error("caller is not the inspector assigned to this check")]
    NotAssignedInspector,
    #[error("parameter {0} is not declared by the check template")]
    UnknownParameter(String),
    #[error("results missing for {missing:?}")]
    IncompleteResults { missing: Vec<String> },
    #[error("status {declared} is not acceptable (aggregate {aggregate:?})")]
    InvalidStatus {
        declared: CheckStatus,
        aggregate: Option<CheckStatus>,
    },
    #[error("quality check is not finalized")]
    CheckNotFinalized,
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ContractViolation),
    #[error("publishing the verdict hash failed: {0}")]
    VerificationPublishFailed(#[source] VerificationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<FinalizeRejection> for QaError {
    fn from(r: FinalizeRejection) -> Self {
        match r {
            FinalizeRejection::NotTerminal(declared) => QaError::InvalidStatus {
                declared,
                aggregate: None,
            },
            FinalizeRejection::Incomplete { missing } => QaError::IncompleteResults {
                missing: missing.iter().map(|p| p.as_str().to_string()).collect(),
            },
            FinalizeRejection::AggregateMismatch {
                declared,
                aggregate,
            } => QaError::InvalidStatus {
                declared,
                aggregate: Some(aggregate),
            },
        }
    }
}

/// Executes quality-assurance calls against [`QaStore`] and the product/verification
/// collaborators.
///
/// Commands run inside [`QaStore::transaction`]; the verdict publish is the last effect, so a
/// failed publish leaves every table and the audit ledger untouched. Queries never write.
#[derive(Debug, Clone)]
pub struct QualityAssuranceRuntime {
    config: QaConfig,
}

impl QualityAssuranceRuntime {
    pub fn new(config: QaConfig) -> Result<Self, ContractViolation> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    pub fn run<P, V>(
        &self,
        store: &mut QaStore,
        products: &P,
        verification: &mut V,
        req: &QaRequest,
    ) -> Result<QaResponse, QaError>
    where
        P: ProductRegistry,
        V: ConsumerVerification,
    {
        req.validate()?;

        let cmd = match &req.operation {
            QaOperation::Query(q) => return self.query(store, q),
            QaOperation::Command(cmd) => cmd,
        };

        let out = store.transaction(|tx| self.execute(tx, products, verification, req, cmd));
        match &out {
            Ok(_) => debug!(
                operation = cmd.name(),
                caller = %req.caller,
                height = req.now.0,
                "qa command committed"
            ),
            Err(err) => warn!(
                operation = cmd.name(),
                caller = %req.caller,
                height = req.now.0,
                error = %err,
                "qa command rolled back"
            ),
        }
        out
    }

    fn execute<P, V>(
        &self,
        tx: &mut QaStore,
        products: &P,
        verification: &mut V,
        req: &QaRequest,
        cmd: &QaCommand,
    ) -> Result<QaResponse, QaError>
    where
        P: ProductRegistry,
        V: ConsumerVerification,
    {
        let role = CallerRole::resolve(
            &req.caller,
            &self.config.admin,
            tx.get_inspector(&req.caller),
        );

        match cmd {
            QaCommand::RegisterInspector(r) => self.register_inspector(tx, role, req, r)?,
            QaCommand::SetInspectorCertificationLevel(r) => {
                self.set_inspector_level(tx, role, req, r)?
            }
            QaCommand::SetInspectorActive(r) => self.set_inspector_active(tx, role, req, r)?,
            QaCommand::CreateCheckTemplate(r) => self.create_check_template(tx, role, req, r)?,
            QaCommand::PerformQualityCheck(r) => {
                self.perform_quality_check(tx, products, role, req, r)?
            }
            QaCommand::RecordCheckResult(r) => self.record_check_result(tx, req, r)?,
            QaCommand::FinalizeQualityCheck(r) => {
                self.finalize_quality_check(tx, verification, role, req, r)?
            }
        }
        Ok(QaResponse::Committed)
    }

    fn query(&self, store: &QaStore, q: &QaQuery) -> Result<QaResponse, QaError> {
        match q {
            QaQuery::GetInspector(p) => Ok(QaResponse::Inspector(store.get_inspector(p).cloned())),
            QaQuery::GetCheckTemplate(id) => {
                Ok(QaResponse::Template(store.get_check_template(id).cloned()))
            }
            QaQuery::GetCheck(id) => Ok(QaResponse::Check(store.get_quality_check(id).cloned())),
            QaQuery::GetCheckResult {
                check_id,
                parameter,
            } => {
                // A malformed name can never have been recorded.
                let row = ParameterName::new(parameter.as_str())
                    .ok()
                    .and_then(|p| store.get_check_result(check_id, &p).cloned());
                Ok(QaResponse::CheckResult(row))
            }
            QaQuery::GetCheckResults(id) => {
                let Some(check) = store.get_quality_check(id) else {
                    return Ok(QaResponse::CheckResults(Vec::new()));
                };
                let Some(template) = store.get_check_template(&check.template_id) else {
                    return Ok(QaResponse::CheckResults(Vec::new()));
                };
                let results: Vec<CheckResultRecord> =
                    store.check_results_for(id).into_iter().cloned().collect();
                let ordered = results_in_template_order(template, &results)
                    .into_iter()
                    .filter_map(|(_, r)| r.cloned())
                    .collect();
                Ok(QaResponse::CheckResults(ordered))
            }
            QaQuery::CheckPassed(id) => {
                let check = store.get_quality_check(id).ok_or(QaError::CheckNotFound)?;
                match check.status {
                    CheckStatus::Pending => Err(QaError::CheckNotFinalized),
                    status => Ok(QaResponse::CheckPassed(status == CheckStatus::Passed)),
                }
            }
        }
    }

    fn certification_level(&self, raw: u8) -> Result<CertificationLevel, QaError> {
        if raw == 0 || raw > self.config.max_certification_level {
            return Err(QaError::InvalidInput(ContractViolation::InvalidValue {
                field: "certification_level",
                reason: "must be within 1..=max_certification_level",
            }));
        }
        Ok(CertificationLevel(raw))
    }

    fn register_inspector(
        &self,
        tx: &mut QaStore,
        role: CallerRole,
        req: &QaRequest,
        r: &RegisterInspectorRequest,
    ) -> Result<(), QaError> {
        if role.is_admin() {
            return Err(QaError::NotAuthorized);
        }
        if tx.get_inspector(&req.caller).is_some() {
            return Err(QaError::AlreadyRegistered);
        }
        let level = self.certification_level(r.certification_level)?;
        let record = InspectorRecord::v1(
            req.caller.clone(),
            r.name.clone(),
            r.organization.clone(),
            level,
            req.now,
        )?;
        tx.insert_inspector(record)?;

        self.audit(
            tx,
            req,
            AuditEventType::InspectorRegistered,
            reason_codes::QA_OK_REGISTER_INSPECTOR,
            req.caller.as_str().to_string(),
            &[("certification_level", level.0.to_string())],
        )
    }

    fn set_inspector_level(
        &self,
        tx: &mut QaStore,
        role: CallerRole,
        req: &QaRequest,
        r: &SetInspectorLevelRequest,
    ) -> Result<(), QaError> {
        if !role.is_admin() {
            return Err(QaError::NotAuthorized);
        }
        let mut record = tx
            .get_inspector(&r.inspector)
            .cloned()
            .ok_or(QaError::InspectorNotFound)?;
        let level = self.certification_level(r.certification_level)?;
        if level <= record.certification_level {
            return Err(QaError::CertificationDowngrade);
        }
        let previous = record.certification_level;
        record.certification_level = level;
        tx.update_inspector(record)?;

        self.audit(
            tx,
            req,
            AuditEventType::InspectorLevelRaised,
            reason_codes::QA_OK_SET_INSPECTOR_LEVEL,
            r.inspector.as_str().to_string(),
            &[
                ("level_from", previous.0.to_string()),
                ("level_to", level.0.to_string()),
            ],
        )
    }

    fn set_inspector_active(
        &self,
        tx: &mut QaStore,
        role: CallerRole,
        req: &QaRequest,
        r: &SetInspectorActiveRequest,
    ) -> Result<(), QaError> {
        if !role.is_admin() {
            return Err(QaError::NotAuthorized);
        }
        let mut record = tx
            .get_inspector(&r.inspector)
            .cloned()
            .ok_or(QaError::InspectorNotFound)?;
        record.active = r.active;
        tx.update_inspector(record)?;

        self.audit(
            tx,
            req,
            AuditEventType::InspectorActiveChanged,
            reason_codes::QA_OK_SET_INSPECTOR_ACTIVE,
            r.inspector.as_str().to_string(),
            &[("active", r.active.to_string())],
        )
    }

    fn create_check_template(
        &self,
        tx: &mut QaStore,
        role: CallerRole,
        req: &QaRequest,
        r: &CreateCheckTemplateRequest,
    ) -> Result<(), QaError> {
        let min_author = CertificationLevel(self.config.template_author_min_level);
        if !role.can_author_templates(min_author) {
            return Err(QaError::NotAuthorized);
        }
        if r.parameters.is_empty() {
            return Err(QaError::EmptyParameterSet);
        }
        let mut seen = BTreeSet::new();
        for p in &r.parameters {
            if !seen.insert(p.as_str()) {
                return Err(QaError::DuplicateParameter(p.clone()));
            }
        }
        let parameters = r
            .parameters
            .iter()
            .map(|p| ParameterName::new(p.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let required = self.certification_level(r.required_certification_level)?;
        let record = CheckTemplateRecord::v1(
            r.template_id,
            r.name.clone(),
            r.description.clone(),
            required,
            parameters,
            req.caller.clone(),
            req.now,
        )?;
        if tx.get_check_template(&r.template_id).is_some() {
            return Err(QaError::TemplateExists);
        }
        tx.insert_check_template(record)?;

        self.audit(
            tx,
            req,
            AuditEventType::TemplateCreated,
            reason_codes::QA_OK_CREATE_CHECK_TEMPLATE,
            r.template_id.to_string(),
            &[
                ("required_level", required.0.to_string()),
                ("parameter_count", r.parameters.len().to_string()),
            ],
        )
    }

    fn perform_quality_check<P: ProductRegistry>(
        &self,
        tx: &mut QaStore,
        products: &P,
        role: CallerRole,
        req: &QaRequest,
        r: &PerformQualityCheckRequest,
    ) -> Result<(), QaError> {
        if tx.get_quality_check(&r.check_id).is_some() {
            return Err(QaError::CheckExists);
        }
        if !role.can_perform_checks() {
            return Err(QaError::NotAuthorized);
        }
        let required = tx
            .get_check_template(&r.template_id)
            .map(|t| t.required_certification_level)
            .ok_or(QaError::TemplateNotFound)?;
        if !products.product_exists(&r.product_id) {
            return Err(QaError::ProductNotFound);
        }
        if !role.meets_level(required) {
            return Err(QaError::InsufficientCertification {
                required: required.0,
                held: role.active_level().map(|l| l.0),
            });
        }

        let record = QualityCheckRecord::pending_v1(
            r.check_id,
            r.product_id,
            r.template_id,
            req.caller.clone(),
            r.location.clone(),
            r.notes.clone(),
            req.now,
        )?;
        tx.insert_quality_check(record)?;

        self.audit(
            tx,
            req,
            AuditEventType::CheckPerformed,
            reason_codes::QA_OK_PERFORM_QUALITY_CHECK,
            r.check_id.to_string(),
            &[
                ("product_id", r.product_id.to_string()),
                ("template_id", r.template_id.to_string()),
            ],
        )
    }

    fn record_check_result(
        &self,
        tx: &mut QaStore,
        req: &QaRequest,
        r: &RecordCheckResultRequest,
    ) -> Result<(), QaError> {
        let check = tx
            .get_quality_check(&r.check_id)
            .ok_or(QaError::CheckNotFound)?;
        if check.status.is_final() {
            return Err(QaError::CheckFinalized);
        }
        if check.inspector != req.caller {
            return Err(QaError::NotAssignedInspector);
        }
        let template_id = check.template_id;
        let parameter = ParameterName::new(r.parameter.as_str())
            .map_err(|_| QaError::UnknownParameter(r.parameter.clone()))?;
        let declared = tx
            .get_check_template(&template_id)
            .is_some_and(|t| t.declares(&parameter));
        if !declared {
            return Err(QaError::UnknownParameter(r.parameter.clone()));
        }

        let record = CheckResultRecord::v1(
            r.check_id,
            parameter,
            r.value.clone(),
            r.pass,
            req.caller.clone(),
            req.now,
        )?;
        tx.upsert_check_result(record)?;

        self.audit(
            tx,
            req,
            AuditEventType::CheckResultRecorded,
            reason_codes::QA_OK_RECORD_CHECK_RESULT,
            r.check_id.to_string(),
            &[
                ("parameter", r.parameter.clone()),
                ("pass", r.pass.to_string()),
            ],
        )
    }

    fn finalize_quality_check<V: ConsumerVerification>(
        &self,
        tx: &mut QaStore,
        verification: &mut V,
        role: CallerRole,
        req: &QaRequest,
        r: &FinalizeQualityCheckRequest,
    ) -> Result<(), QaError> {
        let check = tx
            .get_quality_check(&r.check_id)
            .cloned()
            .ok_or(QaError::CheckNotFound)?;
        if check.status.is_final() {
            return Err(QaError::CheckFinalized);
        }
        if !role.is_admin() && check.inspector != req.caller {
            return Err(QaError::NotAssignedInspector);
        }
        let template = tx
            .get_check_template(&check.template_id)
            .cloned()
            .ok_or_else(|| {
                QaError::Storage(StorageError::ForeignKeyViolation {
                    table: "quality_checks.template_id",
                    key: check.template_id.to_string(),
                })
            })?;
        let results: Vec<CheckResultRecord> = tx
            .check_results_for(&r.check_id)
            .into_iter()
            .cloned()
            .collect();

        let status = evaluate_finalize(self.config.verdict_policy, r.status, &template, &results)?;
        let hash = match status {
            CheckStatus::Passed => Some(verdict_hash(&check, status, &template, &results)?),
            _ => None,
        };
        tx.finalize_quality_check(&r.check_id, status, req.now, req.caller.clone(), hash)?;

        let reason_code = match status {
            CheckStatus::Passed => reason_codes::QA_OK_FINALIZE_PASSED,
            _ => reason_codes::QA_OK_FINALIZE_FAILED,
        };
        let mut details = vec![("status", status.as_str().to_string())];
        if role.is_admin() {
            details.push(("admin_override", "true".to_string()));
        }
        if let Some(h) = hash {
            details.push(("verification_hash", h.to_string()));
        }
        self.audit(
            tx,
            req,
            AuditEventType::CheckFinalized,
            reason_code,
            r.check_id.to_string(),
            &details,
        )?;

        if let Some(h) = hash {
            verification
                .record_hash(&check.product_id, h)
                .map_err(QaError::VerificationPublishFailed)?;
        }
        Ok(())
    }

    fn audit(
        &self,
        tx: &mut QaStore,
        req: &QaRequest,
        event_type: AuditEventType,
        reason_code: ReasonCodeId,
        subject: String,
        detail_entries: &[(&'static str, String)],
    ) -> Result<(), QaError> {
        let mut entries: BTreeMap<PayloadKey, PayloadValue> = BTreeMap::new();
        for (k, v) in detail_entries {
            entries.insert(PayloadKey::new(*k)?, PayloadValue::new(v.as_str())?);
        }
        let payload_min = AuditPayloadMin::v1(entries)?;
        let ev = AuditEventInput::v1(
            req.now,
            req.caller.clone(),
            event_type,
            reason_code,
            subject,
            payload_min,
        )?;
        tx.append_audit_event(ev)?;
        Ok(())
    }
}

/// Shorthand for building a request at `now`.
pub fn qa_request(
    caller: &Principal,
    now: u64,
    operation: QaOperation,
) -> Result<QaRequest, ContractViolation> {
    QaRequest::v1(caller.clone(), LedgerHeight(now), operation)
}

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use origin_kernel_contracts::audit::{AuditEvent, AuditEventId, AuditEventInput};
use origin_kernel_contracts::ledger::{CheckId, Principal, TemplateId, VerificationHash};
use origin_kernel_contracts::qa::{
    CheckResultRecord, CheckStatus, CheckTemplateRecord, InspectorRecord, ParameterName,
    QualityCheckRecord,
};
use origin_kernel_contracts::{ContractViolation, LedgerHeight, Validate};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("foreign key violation on {table}: {key}")]
    ForeignKeyViolation { table: &'static str, key: String },
    #[error("duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("{table} rows are immutable once written")]
    AppendOnlyViolation { table: &'static str },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

/// Prior state of one row touched inside an open transaction.
#[derive(Debug, Clone, PartialEq)]
enum UndoEntry {
    InspectorInserted(Principal),
    InspectorReplaced(InspectorRecord),
    CheckTemplateInserted(TemplateId),
    QualityCheckInserted(CheckId),
    QualityCheckReplaced(QualityCheckRecord),
    CheckResultWritten {
        check_id: CheckId,
        parameter: ParameterName,
        previous: Option<CheckResultRecord>,
    },
    AuditEventAppended,
}

/// Quality-assurance tables plus the append-only audit ledger.
///
/// All tables are plain keyed maps owned by the store. Callers that need all-or-nothing
/// semantics across several writes go through [`QaStore::transaction`], which journals
/// only the rows it touches.
#[derive(Debug, Clone, PartialEq)]
pub struct QaStore {
    inspectors: BTreeMap<Principal, InspectorRecord>,
    check_templates: BTreeMap<TemplateId, CheckTemplateRecord>,
    quality_checks: BTreeMap<CheckId, QualityCheckRecord>,
    // check_id -> parameter -> latest result while the check is pending.
    check_results: BTreeMap<CheckId, BTreeMap<ParameterName, CheckResultRecord>>,
    audit_events: Vec<AuditEvent>,
    next_audit_event_id: u64,
    undo_log: Vec<UndoEntry>,
    tx_depth: usize,
}

impl Default for QaStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl QaStore {
    pub fn new_in_memory() -> Self {
        Self {
            inspectors: BTreeMap::new(),
            check_templates: BTreeMap::new(),
            quality_checks: BTreeMap::new(),
            check_results: BTreeMap::new(),
            audit_events: Vec::new(),
            next_audit_event_id: 1,
            undo_log: Vec::new(),
            tx_depth: 0,
        }
    }

    /// Runs `f` as one unit of work. On `Err` every row written by `f` (audit rows included)
    /// is restored to its prior state. Cost is proportional to the rows `f` touches.
    pub fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut QaStore) -> Result<T, E>,
    {
        let mark = self.undo_log.len();
        self.tx_depth += 1;
        let out = f(self);
        self.tx_depth -= 1;
        if out.is_err() {
            self.rollback_to(mark);
        }
        if self.tx_depth == 0 {
            self.undo_log.clear();
        }
        out
    }

    /// Journal entries held by the open transaction(s); zero outside a transaction.
    pub fn pending_undo_len(&self) -> usize {
        self.undo_log.len()
    }

    fn journal(&mut self, entry: UndoEntry) {
        if self.tx_depth > 0 {
            self.undo_log.push(entry);
        }
    }

    fn rollback_to(&mut self, mark: usize) {
        while self.undo_log.len() > mark {
            let Some(entry) = self.undo_log.pop() else {
                break;
            };
            match entry {
                UndoEntry::InspectorInserted(principal) => {
                    self.inspectors.remove(&principal);
                }
                UndoEntry::InspectorReplaced(record) => {
                    self.inspectors.insert(record.principal.clone(), record);
                }
                UndoEntry::CheckTemplateInserted(template_id) => {
                    self.check_templates.remove(&template_id);
                }
                UndoEntry::QualityCheckInserted(check_id) => {
                    self.quality_checks.remove(&check_id);
                }
                UndoEntry::QualityCheckReplaced(record) => {
                    self.quality_checks.insert(record.check_id, record);
                }
                UndoEntry::CheckResultWritten {
                    check_id,
                    parameter,
                    previous,
                } => {
                    let Some(rows) = self.check_results.get_mut(&check_id) else {
                        continue;
                    };
                    match previous {
                        Some(row) => {
                            rows.insert(parameter, row);
                        }
                        None => {
                            rows.remove(&parameter);
                            if rows.is_empty() {
                                self.check_results.remove(&check_id);
                            }
                        }
                    }
                }
                UndoEntry::AuditEventAppended => {
                    if self.audit_events.pop().is_some() {
                        self.next_audit_event_id = self.next_audit_event_id.saturating_sub(1);
                    }
                }
            }
        }
    }

    // ------------------------
    // Inspectors.
    // ------------------------

    pub fn insert_inspector(&mut self, record: InspectorRecord) -> Result<(), StorageError> {
        record.validate()?;
        if self.inspectors.contains_key(&record.principal) {
            return Err(StorageError::DuplicateKey {
                table: "inspectors",
                key: record.principal.as_str().to_string(),
            });
        }
        self.journal(UndoEntry::InspectorInserted(record.principal.clone()));
        self.inspectors.insert(record.principal.clone(), record);
        Ok(())
    }

    /// Replaces an existing inspector row; identity and registration height are fixed.
    pub fn update_inspector(&mut self, record: InspectorRecord) -> Result<(), StorageError> {
        record.validate()?;
        let Some(existing) = self.inspectors.get_mut(&record.principal) else {
            return Err(StorageError::ForeignKeyViolation {
                table: "inspectors",
                key: record.principal.as_str().to_string(),
            });
        };
        if existing.registered_at != record.registered_at {
            return Err(StorageError::AppendOnlyViolation {
                table: "inspectors.registered_at",
            });
        }
        let previous = std::mem::replace(existing, record);
        self.journal(UndoEntry::InspectorReplaced(previous));
        Ok(())
    }

    pub fn get_inspector(&self, principal: &Principal) -> Option<&InspectorRecord> {
        self.inspectors.get(principal)
    }

    pub fn inspectors(&self) -> &BTreeMap<Principal, InspectorRecord> {
        &self.inspectors
    }

    // ------------------------
    // Check templates (immutable once created).
    // ------------------------

    pub fn insert_check_template(
        &mut self,
        record: CheckTemplateRecord,
    ) -> Result<(), StorageError> {
        record.validate()?;
        if self.check_templates.contains_key(&record.template_id) {
            return Err(StorageError::DuplicateKey {
                table: "check_templates",
                key: record.template_id.to_string(),
            });
        }
        self.journal(UndoEntry::CheckTemplateInserted(record.template_id));
        self.check_templates.insert(record.template_id, record);
        Ok(())
    }

    pub fn get_check_template(&self, template_id: &TemplateId) -> Option<&CheckTemplateRecord> {
        self.check_templates.get(template_id)
    }

    pub fn check_templates(&self) -> &BTreeMap<TemplateId, CheckTemplateRecord> {
        &self.check_templates
    }

    pub fn attempt_overwrite_check_template(
        &mut self,
        _template_id: &TemplateId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "check_templates",
        })
    }

    // ------------------------
    // Quality checks + results.
    // ------------------------

    pub fn insert_quality_check(&mut self, record: QualityCheckRecord) -> Result<(), StorageError> {
        record.validate()?;
        if record.status != CheckStatus::Pending {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "quality_checks.status",
                    reason: "new checks must be pending",
                },
            ));
        }
        if !self.check_templates.contains_key(&record.template_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "quality_checks.template_id",
                key: record.template_id.to_string(),
            });
        }
        if !self.inspectors.contains_key(&record.inspector) {
            return Err(StorageError::ForeignKeyViolation {
                table: "quality_checks.inspector",
                key: record.inspector.as_str().to_string(),
            });
        }
        if self.quality_checks.contains_key(&record.check_id) {
            return Err(StorageError::DuplicateKey {
                table: "quality_checks",
                key: record.check_id.to_string(),
            });
        }
        self.journal(UndoEntry::QualityCheckInserted(record.check_id));
        self.quality_checks.insert(record.check_id, record);
        Ok(())
    }

    pub fn get_quality_check(&self, check_id: &CheckId) -> Option<&QualityCheckRecord> {
        self.quality_checks.get(check_id)
    }

    pub fn quality_checks(&self) -> &BTreeMap<CheckId, QualityCheckRecord> {
        &self.quality_checks
    }

    /// The single terminal write for a check.
    pub fn finalize_quality_check(
        &mut self,
        check_id: &CheckId,
        status: CheckStatus,
        finalized_at: LedgerHeight,
        finalized_by: Principal,
        verification_hash: Option<VerificationHash>,
    ) -> Result<&QualityCheckRecord, StorageError> {
        let Some(existing) = self.quality_checks.get(check_id) else {
            return Err(StorageError::ForeignKeyViolation {
                table: "quality_checks",
                key: check_id.to_string(),
            });
        };
        if existing.status.is_final() {
            return Err(StorageError::AppendOnlyViolation {
                table: "quality_checks",
            });
        }
        let next = existing.finalized(status, finalized_at, finalized_by, verification_hash)?;
        if let Some(previous) = self.quality_checks.insert(*check_id, next) {
            self.journal(UndoEntry::QualityCheckReplaced(previous));
        }
        self.quality_checks
            .get(check_id)
            .ok_or_else(|| StorageError::ForeignKeyViolation {
                table: "quality_checks",
                key: check_id.to_string(),
            })
    }

    pub fn upsert_check_result(&mut self, record: CheckResultRecord) -> Result<(), StorageError> {
        record.validate()?;
        let Some(check) = self.quality_checks.get(&record.check_id) else {
            return Err(StorageError::ForeignKeyViolation {
                table: "check_results.check_id",
                key: record.check_id.to_string(),
            });
        };
        if check.status.is_final() {
            return Err(StorageError::AppendOnlyViolation {
                table: "check_results",
            });
        }
        let declared = self
            .check_templates
            .get(&check.template_id)
            .is_some_and(|t| t.declares(&record.parameter));
        if !declared {
            return Err(StorageError::ForeignKeyViolation {
                table: "check_results.parameter",
                key: record.parameter.as_str().to_string(),
            });
        }
        let check_id = record.check_id;
        let parameter = record.parameter.clone();
        let previous = self
            .check_results
            .entry(check_id)
            .or_default()
            .insert(parameter.clone(), record);
        self.journal(UndoEntry::CheckResultWritten {
            check_id,
            parameter,
            previous,
        });
        Ok(())
    }

    pub fn get_check_result(
        &self,
        check_id: &CheckId,
        parameter: &ParameterName,
    ) -> Option<&CheckResultRecord> {
        self.check_results.get(check_id)?.get(parameter)
    }

    /// Every recorded result for one check, ordered by parameter name.
    pub fn check_results_for(&self, check_id: &CheckId) -> Vec<&CheckResultRecord> {
        self.check_results
            .get(check_id)
            .map(|rows| rows.values().collect())
            .unwrap_or_default()
    }

    pub fn check_results(
        &self,
    ) -> &BTreeMap<CheckId, BTreeMap<ParameterName, CheckResultRecord>> {
        &self.check_results
    }

    // ------------------------
    // Audit ledger (append-only).
    // ------------------------

    pub fn append_audit_event(
        &mut self,
        input: AuditEventInput,
    ) -> Result<AuditEventId, StorageError> {
        input.validate()?;
        let event_id = AuditEventId(self.next_audit_event_id);
        let ev = AuditEvent::from_input_v1(event_id, input)?;
        self.next_audit_event_id = self.next_audit_event_id.saturating_add(1);
        self.audit_events.push(ev);
        self.journal(UndoEntry::AuditEventAppended);
        Ok(event_id)
    }

    pub fn audit_events(&self) -> &[AuditEvent] {
        &self.audit_events
    }

    pub fn audit_events_for_subject(&self, subject: &str) -> Vec<&AuditEvent> {
        self.audit_events
            .iter()
            .filter(|e| e.subject == subject)
            .collect()
    }

    pub fn attempt_overwrite_audit_event(
        &mut self,
        _event_id: AuditEventId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "audit_events",
        })
    }
}

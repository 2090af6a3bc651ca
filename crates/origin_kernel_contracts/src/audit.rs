#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ledger::Principal;
use crate::{ContractViolation, LedgerHeight, ReasonCodeId, SchemaVersion, Validate};

pub const AUDIT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

const AUDIT_PAYLOAD_MAX_ENTRIES: usize = 16;
const AUDIT_PAYLOAD_MAX_BYTES: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuditEventId(pub u64);

impl Validate for AuditEventId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    InspectorRegistered,
    InspectorLevelRaised,
    InspectorActiveChanged,
    TemplateCreated,
    CheckPerformed,
    CheckResultRecorded,
    CheckFinalized,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayloadKey(String);

fn is_ascii_lower_snake_key(s: &str) -> bool {
    let b = s.as_bytes();
    match b.first() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    b.iter()
        .skip(1)
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'_')
}

impl PayloadKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ContractViolation> {
        let k = Self(key.into());
        k.validate()?;
        Ok(k)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for PayloadKey {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must be <= 64 chars",
            });
        }
        if !is_ascii_lower_snake_key(&self.0) {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must be lower_snake_case (a-z0-9_)",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadValue(String);

impl PayloadValue {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(value.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for PayloadValue {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "payload_value",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 256 {
            return Err(ContractViolation::InvalidValue {
                field: "payload_value",
                reason: "must be <= 256 chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPayloadMin {
    pub schema_version: SchemaVersion,
    pub entries: BTreeMap<PayloadKey, PayloadValue>,
}

impl AuditPayloadMin {
    pub fn empty_v1() -> Self {
        Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            entries: BTreeMap::new(),
        }
    }

    pub fn v1(entries: BTreeMap<PayloadKey, PayloadValue>) -> Result<Self, ContractViolation> {
        let p = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            entries,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Validate for AuditPayloadMin {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_payload_min.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        if self.entries.len() > AUDIT_PAYLOAD_MAX_ENTRIES {
            return Err(ContractViolation::InvalidValue {
                field: "audit_payload_min.entries",
                reason: "must be <= 16 entries",
            });
        }
        let mut total_bytes: usize = 0;
        for (k, v) in &self.entries {
            k.validate()?;
            v.validate()?;
            total_bytes = total_bytes.saturating_add(k.as_str().len());
            total_bytes = total_bytes.saturating_add(v.as_str().len());
            if total_bytes > AUDIT_PAYLOAD_MAX_BYTES {
                return Err(ContractViolation::InvalidValue {
                    field: "audit_payload_min",
                    reason: "total payload size must be <= 2048 bytes",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEventInput {
    pub schema_version: SchemaVersion,
    pub created_at: LedgerHeight,
    pub actor: Principal,
    pub event_type: AuditEventType,
    pub reason_code: ReasonCodeId,
    /// Hex id or principal of the row the event is about.
    pub subject: String,
    pub payload_min: AuditPayloadMin,
}

impl AuditEventInput {
    pub fn v1(
        created_at: LedgerHeight,
        actor: Principal,
        event_type: AuditEventType,
        reason_code: ReasonCodeId,
        subject: String,
        payload_min: AuditPayloadMin,
    ) -> Result<Self, ContractViolation> {
        let ev = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            created_at,
            actor,
            event_type,
            reason_code,
            subject,
            payload_min,
        };
        ev.validate()?;
        Ok(ev)
    }
}

fn validate_event_common(
    created_at: LedgerHeight,
    actor: &Principal,
    reason_code: ReasonCodeId,
    subject: &str,
    payload_min: &AuditPayloadMin,
) -> Result<(), ContractViolation> {
    created_at.validate()?;
    actor.validate()?;
    if reason_code.0 == 0 {
        return Err(ContractViolation::InvalidValue {
            field: "audit_event.reason_code",
            reason: "must be > 0",
        });
    }
    if subject.trim().is_empty() || subject.len() > 128 {
        return Err(ContractViolation::InvalidValue {
            field: "audit_event.subject",
            reason: "must be 1..=128 chars",
        });
    }
    payload_min.validate()
}

impl Validate for AuditEventInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_input.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        validate_event_common(
            self.created_at,
            &self.actor,
            self.reason_code,
            &self.subject,
            &self.payload_min,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub schema_version: SchemaVersion,
    pub event_id: AuditEventId,
    pub created_at: LedgerHeight,
    pub actor: Principal,
    pub event_type: AuditEventType,
    pub reason_code: ReasonCodeId,
    pub subject: String,
    pub payload_min: AuditPayloadMin,
}

impl AuditEvent {
    pub fn from_input_v1(
        event_id: AuditEventId,
        input: AuditEventInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        let ev = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            event_id,
            created_at: input.created_at,
            actor: input.actor,
            event_type: input.event_type,
            reason_code: input.reason_code,
            subject: input.subject,
            payload_min: input.payload_min,
        };
        ev.validate()?;
        Ok(ev)
    }
}

impl Validate for AuditEvent {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        self.event_id.validate()?;
        validate_event_common(
            self.created_at,
            &self.actor,
            self.reason_code,
            &self.subject,
            &self.payload_min,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_audit_contract_01_payload_key_must_be_lower_snake() {
        assert!(PayloadKey::new("state_to").is_ok());
        assert!(PayloadKey::new("StateTo").is_err());
        assert!(PayloadKey::new("1state").is_err());
        assert!(PayloadKey::new("").is_err());
    }

    #[test]
    fn at_audit_contract_02_payload_entry_budget_enforced() {
        let mut entries = BTreeMap::new();
        for i in 0..17 {
            entries.insert(
                PayloadKey::new(format!("k{i}")).unwrap(),
                PayloadValue::new("v").unwrap(),
            );
        }
        assert!(AuditPayloadMin::v1(entries).is_err());
    }

    #[test]
    fn at_audit_contract_03_event_requires_reason_code() {
        let actor = Principal::new("ST1ADMIN").unwrap();
        let ev = AuditEventInput::v1(
            LedgerHeight(3),
            actor,
            AuditEventType::TemplateCreated,
            ReasonCodeId(0),
            "0xab".to_string(),
            AuditPayloadMin::empty_v1(),
        );
        assert!(ev.is_err());
    }
}

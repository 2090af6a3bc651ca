#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use origin_kernel_contracts::ledger::VerificationHash;
use origin_kernel_contracts::qa::{
    CheckResultRecord, CheckStatus, CheckTemplateRecord, ParameterName, QualityCheckRecord,
};
use origin_kernel_contracts::ContractViolation;
use sha2::{Digest, Sha256};

const VERDICT_HASH_DOMAIN: &[u8] = b"origin.qa.verdict.v1";

/// How a declared final status relates to the recorded per-parameter pass flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictPolicy {
    /// Declared status must equal the AND of all pass flags.
    AggregateMustMatch,
    /// Declared status is stored as given.
    DeclaredAuthoritative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeRejection {
    NotTerminal(CheckStatus),
    Incomplete { missing: Vec<ParameterName> },
    AggregateMismatch {
        declared: CheckStatus,
        aggregate: CheckStatus,
    },
}

/// `passed` iff every flag is true; an empty set is `failed`.
pub fn aggregate_verdict<I>(passes: I) -> CheckStatus
where
    I: IntoIterator<Item = bool>,
{
    let mut any = false;
    for pass in passes {
        if !pass {
            return CheckStatus::Failed;
        }
        any = true;
    }
    if any {
        CheckStatus::Passed
    } else {
        CheckStatus::Failed
    }
}

/// Results for the template's declared parameters, in declaration order.
/// `None` marks a parameter with nothing recorded.
pub fn results_in_template_order<'a>(
    template: &'a CheckTemplateRecord,
    results: &'a [CheckResultRecord],
) -> Vec<(&'a ParameterName, Option<&'a CheckResultRecord>)> {
    let by_param: BTreeMap<&ParameterName, &CheckResultRecord> =
        results.iter().map(|r| (&r.parameter, r)).collect();
    template
        .parameters
        .iter()
        .map(|p| (p, by_param.get(p).copied()))
        .collect()
}

/// Checks run in order: terminal status, completeness, then policy.
pub fn evaluate_finalize(
    policy: VerdictPolicy,
    declared: CheckStatus,
    template: &CheckTemplateRecord,
    results: &[CheckResultRecord],
) -> Result<CheckStatus, FinalizeRejection> {
    if !declared.is_final() {
        return Err(FinalizeRejection::NotTerminal(declared));
    }

    let ordered = results_in_template_order(template, results);
    let missing: Vec<ParameterName> = ordered
        .iter()
        .filter(|(_, r)| r.is_none())
        .map(|(p, _)| (*p).clone())
        .collect();
    if !missing.is_empty() {
        return Err(FinalizeRejection::Incomplete { missing });
    }

    match policy {
        VerdictPolicy::DeclaredAuthoritative => Ok(declared),
        VerdictPolicy::AggregateMustMatch => {
            let aggregate = aggregate_verdict(ordered.iter().filter_map(|(_, r)| r.map(|r| r.pass)));
            if aggregate == declared {
                Ok(declared)
            } else {
                Err(FinalizeRejection::AggregateMismatch {
                    declared,
                    aggregate,
                })
            }
        }
    }
}

fn put_len_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Content hash of a verdict: the check's identity, its terminal status and every
/// declared parameter's result in template order. Published to consumer verification.
pub fn verdict_hash(
    check: &QualityCheckRecord,
    status: CheckStatus,
    template: &CheckTemplateRecord,
    results: &[CheckResultRecord],
) -> Result<VerificationHash, ContractViolation> {
    let mut hasher = Sha256::new();
    hasher.update(VERDICT_HASH_DOMAIN);
    hasher.update(check.check_id.as_bytes());
    hasher.update(check.product_id.as_bytes());
    hasher.update(check.template_id.as_bytes());
    put_len_prefixed(&mut hasher, check.inspector.as_str().as_bytes());
    put_len_prefixed(&mut hasher, status.as_str().as_bytes());
    for (param, result) in results_in_template_order(template, results) {
        put_len_prefixed(&mut hasher, param.as_str().as_bytes());
        match result {
            Some(r) => {
                put_len_prefixed(&mut hasher, r.value.as_bytes());
                hasher.update([u8::from(r.pass)]);
            }
            None => hasher.update([0xff]),
        }
    }
    let digest: [u8; 32] = hasher.finalize().into();
    VerificationHash::from_bytes(digest)
}

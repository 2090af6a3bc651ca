#![forbid(unsafe_code)]

use origin_kernel_contracts::ledger::Principal;
use origin_kernel_contracts::qa::{CertificationLevel, InspectorRecord};

/// Caller identity, resolved once per call. Admin wins over any inspector row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    Admin,
    Inspector {
        level: CertificationLevel,
        active: bool,
    },
    Participant,
}

impl CallerRole {
    pub fn resolve(
        caller: &Principal,
        admin: &Principal,
        inspector: Option<&InspectorRecord>,
    ) -> Self {
        if caller == admin {
            return CallerRole::Admin;
        }
        match inspector {
            Some(r) => CallerRole::Inspector {
                level: r.certification_level,
                active: r.active,
            },
            None => CallerRole::Participant,
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, CallerRole::Admin)
    }

    /// Level usable for gating; `None` for admins, participants and deactivated inspectors.
    pub fn active_level(self) -> Option<CertificationLevel> {
        match self {
            CallerRole::Inspector {
                level,
                active: true,
            } => Some(level),
            _ => None,
        }
    }

    pub fn meets_level(self, required: CertificationLevel) -> bool {
        self.active_level().is_some_and(|held| held >= required)
    }

    pub fn can_author_templates(self, min_author_level: CertificationLevel) -> bool {
        self.is_admin() || self.meets_level(min_author_level)
    }

    pub fn can_perform_checks(self) -> bool {
        self.active_level().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use origin_kernel_contracts::LedgerHeight;

    fn p(v: &str) -> Principal {
        Principal::new(v).unwrap()
    }

    fn inspector(level: u8, active: bool) -> InspectorRecord {
        let mut r = InspectorRecord::v1(
            p("ST1INSPECTOR"),
            "J. Smith".to_string(),
            "Global Quality Assurance Inc.".to_string(),
            CertificationLevel(level),
            LedgerHeight(1),
        )
        .unwrap();
        r.active = active;
        r
    }

    #[test]
    fn at_authz_01_admin_resolves_before_inspector_row() {
        let admin = p("ST1INSPECTOR");
        let rec = inspector(5, true);
        let role = CallerRole::resolve(&admin, &admin, Some(&rec));
        assert_eq!(role, CallerRole::Admin);
        assert!(!role.can_perform_checks());
        assert!(role.can_author_templates(CertificationLevel(2)));
    }

    #[test]
    fn at_authz_02_level_gating_is_numeric_and_inclusive() {
        let role = CallerRole::resolve(&p("ST1INSPECTOR"), &p("ST1ADMIN"), Some(&inspector(2, true)));
        assert!(role.meets_level(CertificationLevel(1)));
        assert!(role.meets_level(CertificationLevel(2)));
        assert!(!role.meets_level(CertificationLevel(3)));
    }

    #[test]
    fn at_authz_03_inactive_inspector_has_no_usable_level() {
        let role =
            CallerRole::resolve(&p("ST1INSPECTOR"), &p("ST1ADMIN"), Some(&inspector(5, false)));
        assert_eq!(role.active_level(), None);
        assert!(!role.can_perform_checks());
        assert!(!role.can_author_templates(CertificationLevel(1)));
    }

    #[test]
    fn at_authz_04_unregistered_caller_is_participant() {
        let role = CallerRole::resolve(&p("ST2MANUFACTURER"), &p("ST1ADMIN"), None);
        assert_eq!(role, CallerRole::Participant);
        assert!(!role.can_author_templates(CertificationLevel(1)));
    }
}

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

const PRINCIPAL_MAX_LEN: usize = 128;

fn is_principal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_'
}

/// Account or contract identity as resolved by the host ledger (e.g. `ST1PQHQ...`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal(String);

impl Principal {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let p = Self(v.into());
        p.validate()?;
        Ok(p)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for Principal {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "principal",
                reason: "must not be empty",
            });
        }
        if self.0.len() > PRINCIPAL_MAX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "principal",
                reason: "must be <= 128 chars",
            });
        }
        if !self.0.chars().all(is_principal_char) {
            return Err(ContractViolation::InvalidValue {
                field: "principal",
                reason: "must be ASCII alphanumeric, '.', '-' or '_'",
            });
        }
        Ok(())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn parse_bytes32(field: &'static str, s: &str) -> Result<[u8; 32], ContractViolation> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if hex.len() != 64 {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be 32 bytes of hex (64 chars)",
        });
    }
    let mut out = [0u8; 32];
    for (i, pair) in hex.as_bytes().chunks_exact(2).enumerate() {
        match (hex_nibble(pair[0]), hex_nibble(pair[1])) {
            (Some(hi), Some(lo)) => out[i] = (hi << 4) | lo,
            _ => {
                return Err(ContractViolation::InvalidValue {
                    field,
                    reason: "must be hex",
                })
            }
        }
    }
    Ok(out)
}

fn bytes32_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

macro_rules! bytes32_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, ContractViolation> {
                let id = Self(bytes);
                id.validate()?;
                Ok(id)
            }

            /// Accepts 64 hex chars, with or without a `0x` prefix.
            pub fn from_hex(s: &str) -> Result<Self, ContractViolation> {
                Self::from_bytes(parse_bytes32($field, s)?)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                bytes32_hex(&self.0)
            }
        }

        impl Validate for $name {
            fn validate(&self) -> Result<(), ContractViolation> {
                if self.0.iter().all(|b| *b == 0) {
                    return Err(ContractViolation::InvalidValue {
                        field: $field,
                        reason: "must not be all zero",
                    });
                }
                Ok(())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }
    };
}

bytes32_id!(
    /// Product identity owned by the product registry.
    ProductId,
    "product_id"
);
bytes32_id!(
    /// Content-addressed inspection template id, supplied by the template author.
    TemplateId,
    "template_id"
);
bytes32_id!(
    /// Caller-supplied quality check id; the ledger only guards against reuse.
    CheckId,
    "check_id"
);
bytes32_id!(VerificationHash, "verification_hash");

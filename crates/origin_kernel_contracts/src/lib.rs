#![forbid(unsafe_code)]

pub mod audit;
pub mod common;
pub mod ledger;
pub mod product;
pub mod qa;

pub use common::{ContractViolation, LedgerHeight, ReasonCodeId, SchemaVersion, Validate};

#![forbid(unsafe_code)]

pub mod registry;
pub mod repo;
pub mod store;

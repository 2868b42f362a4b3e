//! storefront-types: domain model and port traits shared by the storefront crates.

pub mod domain;
pub mod ports;

//! storefront-hex: hexagonal storefront library (services, HTTP inbound, notifier outbound)

pub mod auth;
pub mod config;
pub mod errors;

pub mod application;

pub use storefront_types::{domain, ports};

pub mod inbound; // HTTP adapter (server + handlers + bearer extractor)
pub mod outbound; // notification sinks

//! Shared types for the quote service fleet
//!
//! This library provides the value objects exchanged between quote services,
//! the legacy quote server, and downstream consumers, together with their
//! comma-separated wire encoding. Every instance in the fleet speaks this
//! contract, so the field order and encodings here are stable.
//!
//! # Modules
//! - `quote`: resolved quote values and their wire encoding
//! - `request`: inbound quote-request values and their wire encoding
//! - `errors`: wire-format error taxonomy

// Public modules
pub mod errors;
pub mod quote;
pub mod request;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

pub use errors::WireError;
pub use quote::Quote;
pub use request::QuoteRequest;

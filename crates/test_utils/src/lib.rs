//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! connector test suite.
//!
//! # Modules
//!
//! - `fixtures`: Describe schemas and CRM rows shaped like real responses
//! - `builders`: Builder patterns for records and describe payloads
//! - `assertions`: Custom assertion helpers for normalized feeds
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;

//! Core module tests
//!
//! Contains test suites for core functionality:
//! - Layout set manager tests (mutation protocol, rollback, padding)
//! - Catalog tests (validity, defaults, display lookups)
//! - Registry listing parser tests

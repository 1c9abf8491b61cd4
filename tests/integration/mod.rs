//! Integration test suite for robustus
//!
//! End-to-end tests that drive the public API with the fakes from
//! `robustus::test_utils`, plus smoke tests of the `robustus` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **pipeline**: requirement files through expansion and deduplication
//! - **build_cache**: build-once guarantees of the installer
//! - **cli**: the `robustus` binary against a temporary environment

mod build_cache;
mod cli;
mod pipeline;

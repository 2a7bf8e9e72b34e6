//! Common test utilities and helpers
//!
//! Shared fixtures for the integration tests: local source repositories
//! built with git2 and in-memory replacements for the git commands.

#![allow(dead_code)]

pub mod mock_services;
pub mod test_helpers;

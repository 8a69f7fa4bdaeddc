//! Orbit updater library.
//!
//! Resolves trusted artifacts (agent binaries and their companions) from a
//! signed metadata repository, caches them on disk, and publishes new
//! versions through a staged download that is verified and smoke-tested
//! before a single atomic rename puts it in place.
//!
//! # Modules
//!
//! - [`cache`] - Freshness check of cached artifacts against metadata
//! - [`config`] - Updater options and their TOML loader
//! - [`digest`] - Hash algorithms and validated hex digests
//! - [`error`] - Error types and failure classes
//! - [`exec`] - Command execution and binary smoke tests
//! - [`installer`] - Download, verify, smoke-test and publish pipeline
//! - [`locator`] - Repository and local paths for targets
//! - [`lock`] - Per-target install lock
//! - [`platform`] - Platform conventions for executables
//! - [`remote`] - HTTP access to the metadata repository
//! - [`staging`] - Scoped staging files for in-flight downloads
//! - [`trust`] - Trust metadata client abstraction
//! - [`updater`] - The updater facade
//! - [`verify`] - Streaming length and hash verification

pub mod cache;
pub mod config;
pub mod digest;
pub mod error;
pub mod exec;
pub mod installer;
pub mod locator;
pub mod lock;
pub mod platform;
pub mod remote;
pub mod staging;
pub mod trust;
pub mod updater;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

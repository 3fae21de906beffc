//! DataMap - client library for the DataMap dataset platform
//!
//! This library provides the core functionality behind the `datamap` command:
//! authenticated access to the platform's REST API and a download subsystem
//! that transfers dataset files to disk with resume support, bounded
//! concurrency and progress reporting.
//!
//! # Modules
//!
//! - [`api`]: REST client, response models and the API error taxonomy
//! - [`config`]: settings resolution (defaults, INI file, environment, CLI)
//! - [`download`]: single-file transfers, the concurrency coordinator,
//!   progress aggregation and download summaries
//! - [`format`]: human-readable sizes and transfer rates
//! - [`logging`]: `tracing` subscriber setup

use std::future::Future;
use std::pin::Pin;

pub mod api;
pub mod config;
pub mod download;
pub mod format;
pub mod logging;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

//! DataMap REST API access.
//!
//! - `client`: [`DatasetApi`] trait and the reqwest-backed [`DataMapClient`]
//! - `error`: [`ApiError`], one variant per failure class
//! - `models`: serde models for datasets, versions and files

mod client;
mod error;
mod models;

pub use client::{backoff_delay, ClientConfig, DataMapClient, DatasetApi};
pub use error::{ApiError, ApiResult};
pub use models::{DataFile, Dataset, DownloadUrl, Version};

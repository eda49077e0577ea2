//! Core library for the `weather-snapshot` job.
//!
//! This crate defines:
//! - Configuration resolution (environment over an optional config file)
//! - The weather source abstraction and its OpenWeather implementation
//! - The blob store abstraction and its Azure Blob Storage implementation
//! - The fetch-and-store job that ties them together
//!
//! It is used by `snapshot-cli`, but can also be embedded by any scheduler host.

pub mod config;
pub mod error;
pub mod job;
pub mod model;
pub mod provider;
pub mod storage;

pub use config::{FileConfig, JobConfig};
pub use error::SnapshotError;
pub use job::{Backends, LiveBackends, SnapshotOutcome, WeatherSnapshotJob};
pub use model::{BlobLocation, SnapshotTimestamp, WeatherSnapshot};
pub use provider::{OpenWeatherProvider, WeatherProvider};
pub use storage::{AzureBlobStore, BlobStore, ConnectionString};

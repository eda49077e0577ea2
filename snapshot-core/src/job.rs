//! One fetch-and-store cycle.
//!
//! Every failure is logged and reported through [`SnapshotOutcome`]; nothing
//! propagates to the caller, which is a scheduler that cannot act on it.

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::{
    config::{API_KEY_VAR, JobConfig, STORAGE_CONNECTION_VAR},
    error::SnapshotError,
    model::{BlobLocation, SnapshotTimestamp, WeatherSnapshot},
    provider::{OpenWeatherProvider, WeatherProvider},
    storage::{AzureBlobStore, BlobStore},
};

const SNAPSHOT_CONTENT_TYPE: &str = "application/json";

/// Builds the job's collaborators from their secrets.
pub trait Backends: Send + Sync {
    fn weather(
        &self,
        api_key: &str,
        endpoint: Option<&str>,
    ) -> anyhow::Result<Box<dyn WeatherProvider>>;

    fn storage(&self, connection: &str) -> anyhow::Result<Box<dyn BlobStore>>;
}

/// OpenWeather over HTTPS and Azure Blob Storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveBackends;

impl Backends for LiveBackends {
    fn weather(
        &self,
        api_key: &str,
        endpoint: Option<&str>,
    ) -> anyhow::Result<Box<dyn WeatherProvider>> {
        let provider = match endpoint {
            Some(endpoint) => {
                OpenWeatherProvider::with_endpoint(api_key.to_owned(), endpoint.to_owned())?
            }
            None => OpenWeatherProvider::new(api_key.to_owned())?,
        };
        Ok(Box::new(provider))
    }

    fn storage(&self, connection: &str) -> anyhow::Result<Box<dyn BlobStore>> {
        Ok(Box::new(AzureBlobStore::from_connection_string(connection)?))
    }
}

#[derive(Debug)]
pub enum SnapshotOutcome {
    Stored(BlobLocation),
    Skipped(SnapshotError),
}

impl SnapshotOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, SnapshotOutcome::Stored(_))
    }

    pub fn location(&self) -> Option<&BlobLocation> {
        match self {
            SnapshotOutcome::Stored(location) => Some(location),
            SnapshotOutcome::Skipped(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SnapshotError> {
        match self {
            SnapshotOutcome::Stored(_) => None,
            SnapshotOutcome::Skipped(err) => Some(err),
        }
    }
}

pub struct WeatherSnapshotJob<B = LiveBackends> {
    config: JobConfig,
    backends: B,
}

impl WeatherSnapshotJob<LiveBackends> {
    pub fn new(config: JobConfig) -> Self {
        Self::with_backends(config, LiveBackends)
    }
}

impl<B: Backends> WeatherSnapshotJob<B> {
    pub fn with_backends(config: JobConfig, backends: B) -> Self {
        Self { config, backends }
    }

    /// Run one invocation stamped with the current UTC time.
    pub async fn run(&self) -> SnapshotOutcome {
        self.run_at(Utc::now()).await
    }

    /// Run one invocation. `now` is rendered once and reused for both the
    /// start log line and the blob name.
    pub async fn run_at(&self, now: DateTime<Utc>) -> SnapshotOutcome {
        let timestamp = SnapshotTimestamp::new(now);
        tracing::info!("Weather snapshot job started at {}", timestamp);

        match self.execute(&timestamp).await {
            Ok(location) => {
                tracing::info!("Snapshot saved to {}", location);
                SnapshotOutcome::Stored(location)
            }
            Err(err) => {
                tracing::error!(kind = err.kind(), "{}", err);
                SnapshotOutcome::Skipped(err)
            }
        }
    }

    async fn execute(&self, timestamp: &SnapshotTimestamp) -> Result<BlobLocation, SnapshotError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(SnapshotError::ConfigurationMissing { name: API_KEY_VAR })?;
        let connection = self
            .config
            .storage_connection
            .as_deref()
            .ok_or(SnapshotError::ConfigurationMissing { name: STORAGE_CONNECTION_VAR })?;

        let snapshot = self.fetch(api_key).await?;

        let location = BlobLocation::for_snapshot(&self.config.city, timestamp);
        self.store(connection, &location, &snapshot).await?;

        Ok(location)
    }

    /// Fetch the current weather document for the configured city.
    pub async fn fetch(&self, api_key: &str) -> Result<WeatherSnapshot, SnapshotError> {
        let provider = self
            .backends
            .weather(api_key, self.config.weather_endpoint.as_deref())
            .map_err(SnapshotError::UpstreamRequestFailed)?;

        provider
            .current(&self.config.city)
            .await
            .map_err(SnapshotError::UpstreamRequestFailed)
    }

    /// Write `snapshot` to `location`, replacing any existing blob there.
    pub async fn store(
        &self,
        connection: &str,
        location: &BlobLocation,
        snapshot: &WeatherSnapshot,
    ) -> Result<(), SnapshotError> {
        let write = async {
            let body = snapshot.to_json().context("Failed to serialize weather snapshot")?;
            let store = self.backends.storage(connection)?;
            store.put(location, body.into_bytes(), SNAPSHOT_CONTENT_TYPE).await?;
            anyhow::Ok(())
        };

        write.await.map_err(|source| SnapshotError::StorageWriteFailed {
            location: location.clone(),
            source,
        })
    }
}

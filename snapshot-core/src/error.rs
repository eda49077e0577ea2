use thiserror::Error;

use crate::model::BlobLocation;

/// Reasons an invocation stops before a snapshot is stored.
///
/// None of these escape the job: each is logged and returned as part of the
/// outcome.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("{name} is not configured")]
    ConfigurationMissing { name: &'static str },

    #[error("OpenWeather request failed: {0:#}")]
    UpstreamRequestFailed(#[source] anyhow::Error),

    #[error("failed to write snapshot to {location}: {source:#}")]
    StorageWriteFailed {
        location: BlobLocation,
        #[source]
        source: anyhow::Error,
    },
}

impl SnapshotError {
    pub fn kind(&self) -> &'static str {
        match self {
            SnapshotError::ConfigurationMissing { .. } => "configuration_missing",
            SnapshotError::UpstreamRequestFailed(_) => "upstream_request_failed",
            SnapshotError::StorageWriteFailed { .. } => "storage_write_failed",
        }
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Container every snapshot is written to.
pub const SNAPSHOT_CONTAINER: &str = "clima";

/// Raw weather document as returned by the upstream API.
///
/// The body is kept as an untyped JSON value: no field is read or validated.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub body: Value,
}

impl WeatherSnapshot {
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    /// JSON text stored in the blob. Formatting may differ from the upstream bytes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.body)
    }
}

/// UTC instant captured once per invocation.
///
/// Rendered as `YYYY-MM-DDTHH:MM:SS.ffffff`, without an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotTimestamp(DateTime<Utc>);

impl SnapshotTimestamp {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl fmt::Display for SnapshotTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.6f"))
    }
}

/// Where a snapshot lands in blob storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub container: String,
    pub name: String,
}

impl BlobLocation {
    /// `clima/<city prefix>/<timestamp>.json`
    pub fn for_snapshot(city: &str, at: &SnapshotTimestamp) -> Self {
        Self {
            container: SNAPSHOT_CONTAINER.to_string(),
            name: format!("{}/{}.json", city_prefix(city), at),
        }
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// Folder-like prefix derived from the city: commas and spaces become underscores.
pub fn city_prefix(city: &str) -> String {
    city.replace(',', "_").replace(' ', "_")
}

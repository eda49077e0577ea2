use async_trait::async_trait;
use std::fmt::Debug;

use crate::model::BlobLocation;

pub mod azure;

pub use azure::{AzureBlobStore, ConnectionString};

/// Write side of an object store. Writes overwrite any existing object.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    async fn put(
        &self,
        location: &BlobLocation,
        body: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<()>;
}

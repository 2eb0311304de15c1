pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::core::error::StoreError;

// ---------------------------------------------------------------------------
// ObjectStore trait
// ---------------------------------------------------------------------------

/// Streaming object body: chunks are pulled on demand, so a slow consumer
/// stalls the upstream read rather than accumulating bytes in memory.
/// Dropping the stream releases the underlying store read handle.
pub type ObjectBody = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

/// Trait-based abstraction over the remote object store.
///
/// The production implementation (`S3ObjectStore`) wraps `aws-sdk-s3`; tests
/// and local development use `InMemoryObjectStore` without external deps.
/// All operations are remote calls and may fail transiently. This layer does
/// no retries — retry policy belongs to the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object with its content type and string-keyed metadata
    /// sidecar. Overwrites an existing object under the same key.
    async fn put(
        &self,
        key: &str,
        payload: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Open an object for reading. Returns the streaming body alongside the
    /// metadata sidecar, total size, and content type.
    async fn get(&self, key: &str) -> Result<GetObjectOutput, StoreError>;

    /// Fetch an object's metadata without opening its body.
    async fn stat(&self, key: &str) -> Result<ObjectMeta, StoreError>;

    /// Delete a single object. Reports `NotFound` if the key is absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List (key, size) pairs under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StoreError>;
}

// ---------------------------------------------------------------------------
// Storage types
// ---------------------------------------------------------------------------

/// Output from a GET operation. `body` is a live read handle into the store;
/// it lives only for the duration of one response and is released on drop.
pub struct GetObjectOutput {
    pub body: ObjectBody,
    pub metadata: HashMap<String, String>,
    pub total_size: u64,
    pub content_type: String,
}

impl std::fmt::Debug for GetObjectOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetObjectOutput")
            .field("metadata", &self.metadata)
            .field("total_size", &self.total_size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Metadata returned by a stat (HEAD) operation.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub metadata: HashMap<String, String>,
    pub total_size: u64,
    pub content_type: String,
}

/// One entry from a LIST operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::RwLock;

use crate::core::error::StoreError;

use super::{GetObjectOutput, ObjectBody, ObjectEntry, ObjectMeta, ObjectStore};

/// Default chunk size for streamed bodies.
const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

// ---------------------------------------------------------------------------
// InMemoryObjectStore — for tests and local development
// ---------------------------------------------------------------------------

/// In-memory storage backend.
///
/// Stores all objects in a `HashMap<String, StoredObject>` behind a `RwLock`.
/// Bodies are streamed in fixed-size chunks rather than as one buffer, so
/// consumers exercise the same incremental read path as the S3 backend.
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    chunk_size: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    metadata: HashMap<String, String>,
    fail_stat: bool,
    fail_read_at: Option<u64>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the streamed chunk size (tests use small chunks to exercise
    /// slicing across chunk boundaries).
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            chunk_size: chunk_size.max(1),
        }
    }

    fn body_stream(&self, key: &str, obj: &StoredObject) -> ObjectBody {
        let chunks: Vec<Bytes> = obj
            .data
            .chunks(self.chunk_size)
            .map(Bytes::copy_from_slice)
            .collect();
        let key = key.to_string();
        let fail_read_at = obj.fail_read_at;

        Box::pin(stream::try_unfold(
            (chunks.into_iter(), key, 0u64),
            move |(mut iter, key, offset)| async move {
                if let Some(fail_at) = fail_read_at {
                    if offset >= fail_at {
                        return Err(StoreError::Read {
                            key,
                            offset,
                            reason: "injected read failure".to_string(),
                        });
                    }
                }
                match iter.next() {
                    Some(chunk) => {
                        let next_offset = offset + chunk.len() as u64;
                        Ok(Some((chunk, (iter, key, next_offset))))
                    }
                    None => Ok(None),
                }
            },
        ))
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        payload: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        objects.insert(
            key.to_string(),
            StoredObject {
                data: payload,
                content_type: content_type.to_string(),
                metadata,
                fail_stat: false,
                fail_read_at: None,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<GetObjectOutput, StoreError> {
        let objects = self.objects.read().await;
        let obj = objects.get(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;

        Ok(GetObjectOutput {
            body: self.body_stream(key, obj),
            metadata: obj.metadata.clone(),
            total_size: obj.data.len() as u64,
            content_type: obj.content_type.clone(),
        })
    }

    async fn stat(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let objects = self.objects.read().await;
        let obj = objects.get(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;

        if obj.fail_stat {
            return Err(StoreError::GetFailed {
                key: key.to_string(),
                reason: "injected stat failure".to_string(),
            });
        }

        Ok(ObjectMeta {
            metadata: obj.metadata.clone(),
            total_size: obj.data.len() as u64,
            content_type: obj.content_type.clone(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StoreError> {
        let objects = self.objects.read().await;
        let mut entries: Vec<ObjectEntry> = objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| ObjectEntry {
                key: k.clone(),
                size: v.data.len() as u64,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

#[cfg(test)]
impl InMemoryObjectStore {
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// Make `stat` fail for a key, simulating a lost metadata sidecar.
    pub async fn poison_stat(&self, key: &str) {
        if let Some(obj) = self.objects.write().await.get_mut(key) {
            obj.fail_stat = true;
        }
    }

    /// Make body reads fail once the stream reaches the given byte offset.
    pub async fn poison_read_at(&self, key: &str, offset: u64) {
        if let Some(obj) = self.objects.write().await.get_mut(key) {
            obj.fail_read_at = Some(offset);
        }
    }
}

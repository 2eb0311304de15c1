use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::config::UploadConfig;
use crate::core::error::{StoreError, UploadError};
use crate::storage::{GetObjectOutput, ObjectStore};

use super::codec::{self, MovieMetadata};

/// Collection prefix under which all movie objects live.
pub const MOVIES_PREFIX: &str = "movies";

// ---------------------------------------------------------------------------
// Repository types
// ---------------------------------------------------------------------------

/// Caller-supplied partial metadata, merged over derived defaults at upload.
#[derive(Debug, Clone, Default)]
pub struct MoviePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub year: Option<u32>,
    pub duration_mins: Option<u32>,
    pub genre: Option<Vec<String>>,
}

/// An open movie: live body stream plus decoded metadata.
pub struct FetchedMovie {
    pub output: GetObjectOutput,
    pub metadata: MovieMetadata,
}

impl std::fmt::Debug for FetchedMovie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedMovie")
            .field("output", &self.output)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// One listing entry, tagged with its storage key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ListedMovie {
    pub key: String,
    #[serde(flatten)]
    pub metadata: MovieMetadata,
}

/// Result of a listing pass. Listing is best-effort: entries whose metadata
/// fetch fails are excluded rather than failing the whole call, and
/// `excluded` surfaces how many were dropped.
#[derive(Debug, Clone)]
pub struct MovieListing {
    pub movies: Vec<ListedMovie>,
    pub excluded: u64,
}

// ---------------------------------------------------------------------------
// MediaRepository
// ---------------------------------------------------------------------------

/// Key derivation, upload orchestration, and listing over the object store.
///
/// Owns StorageKey resolution and the MovieMetadata lifecycle. Concurrent
/// overwrites to the same key race and the last write wins; no locking layer
/// exists or is wanted.
pub struct MediaRepository {
    store: Arc<dyn ObjectStore>,
    max_upload_bytes: u64,
    allowed_content_types: Vec<String>,
}

impl MediaRepository {
    pub fn new(store: Arc<dyn ObjectStore>, upload_config: &UploadConfig) -> Self {
        Self {
            store,
            max_upload_bytes: upload_config.max_size_bytes,
            allowed_content_types: upload_config.allowed_content_types.clone(),
        }
    }

    /// Derive the storage key for a filename.
    pub fn movie_key(filename: &str) -> String {
        format!("{}/{}", MOVIES_PREFIX, filename)
    }

    /// Reject filenames that would make the derived key ambiguous.
    fn validate_filename(filename: &str) -> Result<(), UploadError> {
        if filename.is_empty() {
            return Err(UploadError::InvalidFilename {
                reason: "filename is empty".to_string(),
            });
        }
        if filename.contains('/') || filename.contains('\\') {
            return Err(UploadError::InvalidFilename {
                reason: "filename must not contain path separators".to_string(),
            });
        }
        if filename.contains("..") {
            return Err(UploadError::InvalidFilename {
                reason: "filename must not contain '..'".to_string(),
            });
        }
        Ok(())
    }

    /// Upload a movie payload under `movies/<filename>`.
    ///
    /// Validation happens before any remote call: payload size against the
    /// configured maximum, and content type against the closed allow-list.
    /// `size` and `content_type` in the stored metadata come from the payload
    /// itself; the caller's patch cannot override them. Returns the assigned
    /// storage key.
    pub async fn upload(
        &self,
        filename: &str,
        payload: Bytes,
        content_type: &str,
        patch: MoviePatch,
    ) -> Result<String, UploadError> {
        Self::validate_filename(filename)?;

        let size = payload.len() as u64;
        if size > self.max_upload_bytes {
            return Err(UploadError::PayloadTooLarge {
                size_bytes: size,
                max_bytes: self.max_upload_bytes,
            });
        }

        if !self.allowed_content_types.iter().any(|t| t == content_type) {
            return Err(UploadError::UnsupportedContentType {
                content_type: content_type.to_string(),
            });
        }

        let metadata = MovieMetadata {
            title: patch
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| filename.to_string()),
            description: patch.description,
            year: patch.year,
            duration_mins: patch.duration_mins,
            genre: patch.genre.unwrap_or_default(),
            uploaded_at: Utc::now(),
            size,
            content_type: content_type.to_string(),
        };

        let key = Self::movie_key(filename);
        self.store
            .put(&key, payload, content_type, codec::encode(&metadata))
            .await?;

        info!(%key, size, content_type, "movie uploaded");
        Ok(key)
    }

    /// Open a movie for reading: live body stream plus decoded metadata.
    pub async fn fetch(&self, filename: &str) -> Result<FetchedMovie, StoreError> {
        let key = Self::movie_key(filename);
        let output = self.store.get(&key).await?;
        let mut metadata = codec::decode(&output.metadata, &key);
        // The store's byte count is ground truth for transfer framing.
        metadata.size = output.total_size;
        Ok(FetchedMovie { output, metadata })
    }

    /// Fetch metadata only, without opening the body.
    pub async fn stat(&self, filename: &str) -> Result<MovieMetadata, StoreError> {
        let key = Self::movie_key(filename);
        let meta = self.store.stat(&key).await?;
        let mut metadata = codec::decode(&meta.metadata, &key);
        metadata.size = meta.total_size;
        Ok(metadata)
    }

    /// Remove a movie. A repeat call reports `NotFound` rather than silently
    /// succeeding.
    pub async fn remove(&self, filename: &str) -> Result<(), StoreError> {
        let key = Self::movie_key(filename);
        self.store.delete(&key).await?;
        info!(%key, "movie deleted");
        Ok(())
    }

    /// List all stored movies.
    ///
    /// Always a live enumeration — no index or manifest exists. The bare
    /// prefix marker is excluded, and a per-object metadata fetch failure
    /// excludes that entry instead of failing the listing.
    pub async fn list(&self) -> Result<MovieListing, StoreError> {
        let prefix = format!("{}/", MOVIES_PREFIX);
        let entries = self.store.list(&prefix).await?;

        let mut movies = Vec::with_capacity(entries.len());
        let mut excluded = 0u64;

        for entry in entries {
            if entry.key == prefix {
                continue;
            }
            match self.store.stat(&entry.key).await {
                Ok(meta) => {
                    let mut metadata = codec::decode(&meta.metadata, &entry.key);
                    metadata.size = entry.size;
                    movies.push(ListedMovie {
                        key: entry.key,
                        metadata,
                    });
                }
                Err(e) => {
                    excluded += 1;
                    warn!(key = %entry.key, error = %e, "excluding movie from listing");
                }
            }
        }

        debug!(count = movies.len(), excluded, "movie listing complete");
        Ok(MovieListing { movies, excluded })
    }
}

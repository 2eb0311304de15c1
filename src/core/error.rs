use thiserror::Error;

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors originating from the object store client.
///
/// The client performs no retries; transient failures surface unchanged and
/// retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("store request timed out after {timeout_secs}s for key {key}")]
    Timeout { key: String, timeout_secs: u64 },

    #[error("PUT failed for key {key}: {reason}")]
    PutFailed { key: String, reason: String },

    #[error("GET failed for key {key}: {reason}")]
    GetFailed { key: String, reason: String },

    #[error("DELETE failed for key {key}: {reason}")]
    DeleteFailed { key: String, reason: String },

    #[error("LIST failed for prefix {prefix}: {reason}")]
    ListFailed { prefix: String, reason: String },

    #[error("read error at byte offset {offset} of {key}: {reason}")]
    Read {
        key: String,
        offset: u64,
        reason: String,
    },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Upload errors
// ---------------------------------------------------------------------------

/// Errors from upload validation and orchestration.
///
/// Validation variants are rejected synchronously, before any remote write —
/// no store side effect has occurred when one of them is returned.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("payload too large: {size_bytes} bytes exceeds limit {max_bytes} bytes")]
    PayloadTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    #[error("invalid filename: {reason}")]
    InvalidFilename { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UploadError {
    /// HTTP status code for an upload failure.
    pub fn status_code(&self) -> u16 {
        match self {
            UploadError::PayloadTooLarge { .. } => 413,
            UploadError::UnsupportedContentType { .. } => 415,
            UploadError::InvalidFilename { .. } => 400,
            UploadError::Store(_) => 502,
        }
    }

    /// Error code string for JSON responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            UploadError::PayloadTooLarge { .. } => "payload_too_large",
            UploadError::UnsupportedContentType { .. } => "unsupported_content_type",
            UploadError::InvalidFilename { .. } => "invalid_filename",
            UploadError::Store(_) => "storage_error",
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery errors
// ---------------------------------------------------------------------------

/// Errors surfaced while serving a download or stream request, before the
/// response headers have been committed. A failure after headers are sent
/// cannot become one of these; the connection is terminated instead.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("movie not found: {filename}")]
    MovieNotFound { filename: String },

    #[error("range not satisfiable: {reason}")]
    RangeNotSatisfiable { reason: String },

    #[error("storage backend error: {reason}")]
    StorageBackendError { reason: String },
}

impl DeliveryError {
    /// Map a DeliveryError to its HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            DeliveryError::MovieNotFound { .. } => 404,
            DeliveryError::RangeNotSatisfiable { .. } => 416,
            DeliveryError::StorageBackendError { .. } => 502,
        }
    }

    /// Return the error code string for JSON responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            DeliveryError::MovieNotFound { .. } => "movie_not_found",
            DeliveryError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            DeliveryError::StorageBackendError { .. } => "storage_error",
        }
    }
}

impl From<StoreError> for DeliveryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { key } => DeliveryError::MovieNotFound {
                filename: key.rsplit('/').next().unwrap_or_default().to_string(),
            },
            other => DeliveryError::StorageBackendError {
                reason: other.to_string(),
            },
        }
    }
}

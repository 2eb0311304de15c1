//! movievault — a media object gateway.
//!
//! Accepts large video uploads, stores them in a remote object store under
//! `movies/<filename>` with a string-keyed metadata sidecar, and serves them
//! back as whole-file downloads or HTTP byte-range streams with 206
//! partial-content semantics.

pub mod core;
pub mod delivery;
pub mod media;
pub mod observability;
pub mod storage;

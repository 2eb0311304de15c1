use bytes::Bytes;
use futures_util::{stream, TryStreamExt};
use tracing::error;

use crate::core::error::DeliveryError;
use crate::storage::ObjectBody;

// ---------------------------------------------------------------------------
// Range parsing and resolution
// ---------------------------------------------------------------------------

/// A client byte-range request, as parsed from a `Range` header.
/// Offsets are 0-indexed and inclusive; `end` may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u64,
    pub end: Option<u64>,
}

/// Parse a Range header value like `bytes=0-1048575` or `bytes=500-`.
///
/// Anything else — suffix ranges, multi-range, garbage — yields `None` and
/// the caller falls back to a full 200 transfer.
pub fn parse_range_header(value: &str) -> Option<RangeRequest> {
    let range_str = value.strip_prefix("bytes=")?;
    let (start_str, end_str) = range_str.split_once('-')?;
    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse().ok()?)
    };
    Some(RangeRequest { start, end })
}

/// A range request resolved against a concrete object size.
/// Invariant: `start <= end < total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ResolvedRange {
    /// Resolve a parsed range against the object's total size.
    ///
    /// An open-ended range defaults to `min(start + chunk_size - 1, total - 1)`.
    /// A start at or past the object size, or an inverted window, is
    /// unsatisfiable — the policy here is reject (416), not clamp.
    pub fn resolve(
        req: RangeRequest,
        total: u64,
        chunk_size: u64,
    ) -> Result<Self, DeliveryError> {
        if total == 0 || req.start >= total {
            return Err(DeliveryError::RangeNotSatisfiable {
                reason: format!("start {} is beyond object size {}", req.start, total),
            });
        }

        let end = match req.end {
            Some(end) => {
                if end < req.start {
                    return Err(DeliveryError::RangeNotSatisfiable {
                        reason: format!("inverted range {}-{}", req.start, end),
                    });
                }
                end.min(total - 1)
            }
            None => (req.start + chunk_size.saturating_sub(1)).min(total - 1),
        };

        Ok(Self {
            start: req.start,
            end,
            total,
        })
    }

    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a 206 response.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// `Content-Range` header value for a 416 response.
pub fn unsatisfiable_content_range(total: u64) -> String {
    format!("bytes */{}", total)
}

// ---------------------------------------------------------------------------
// Stream session
// ---------------------------------------------------------------------------

/// State for one in-flight transfer. Owns the live store read handle; it is
/// dropped — releasing the handle — when the window is drained, the source
/// ends, or the client disconnects and the response body is dropped.
struct StreamSession {
    body: ObjectBody,
    key: String,
    /// Bytes still to discard before the requested window begins.
    skip: u64,
    /// Bytes of the window still to deliver.
    remaining: u64,
    /// Bytes delivered to the consumer so far (for abort diagnostics).
    delivered: u64,
}

/// Slice a source stream down to exactly the resolved byte window.
///
/// Pull-based: each chunk is read from the source only when the consumer
/// polls, so downstream stalls pause the upstream read and memory stays
/// bounded regardless of object size. Chunks straddling the window edges are
/// trimmed; the consumer receives the requested bytes and nothing else.
pub fn slice_stream(key: String, body: ObjectBody, range: ResolvedRange) -> ObjectBody {
    let session = StreamSession {
        body,
        key,
        skip: range.start,
        remaining: range.content_length(),
        delivered: 0,
    };

    Box::pin(stream::try_unfold(session, |mut session| async move {
        if session.remaining == 0 {
            return Ok(None);
        }
        loop {
            match session.body.try_next().await {
                Ok(Some(chunk)) => {
                    let chunk_len = chunk.len() as u64;
                    if chunk_len <= session.skip {
                        session.skip -= chunk_len;
                        continue;
                    }
                    let begin = session.skip as usize;
                    session.skip = 0;
                    let available = (chunk_len - begin as u64).min(session.remaining);
                    let slice = chunk.slice(begin..begin + available as usize);
                    session.remaining -= available;
                    session.delivered += available;
                    return Ok(Some((slice, session)));
                }
                // Source ended inside the window: deliver what we have.
                Ok(None) => return Ok(None),
                Err(e) => {
                    error!(
                        key = %session.key,
                        delivered = session.delivered,
                        error = %e,
                        "partial transfer aborted mid-stream"
                    );
                    return Err(e);
                }
            }
        }
    }))
}

/// Wrap a full-object stream so that a mid-transfer read error is logged
/// with the key and the byte offset reached before the connection dies.
pub fn monitored_stream(key: String, body: ObjectBody) -> ObjectBody {
    Box::pin(stream::try_unfold(
        (body, key, 0u64),
        |(mut body, key, delivered)| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => {
                    let next = delivered + chunk.len() as u64;
                    Ok(Some((chunk, (body, key, next))))
                }
                Ok(None) => Ok(None),
                Err(e) => {
                    error!(key = %key, delivered, error = %e, "full transfer aborted mid-stream");
                    Err(e)
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StoreError;
    use futures_util::StreamExt;

    const CHUNK: u64 = 1_000_000;

    fn chunked_body(data: Vec<u8>, chunk_size: usize) -> ObjectBody {
        let chunks: Vec<Result<Bytes, StoreError>> = data
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    async fn collect(body: ObjectBody) -> Bytes {
        let chunks: Vec<Bytes> = body.try_collect().await.unwrap();
        chunks.into_iter().flatten().collect()
    }

    #[test]
    fn test_parse_bounded_range() {
        assert_eq!(
            parse_range_header("bytes=0-1048575"),
            Some(RangeRequest {
                start: 0,
                end: Some(1_048_575)
            })
        );
    }

    #[test]
    fn test_parse_open_ended_range() {
        assert_eq!(
            parse_range_header("bytes=500-"),
            Some(RangeRequest {
                start: 500,
                end: None
            })
        );
    }

    #[test]
    fn test_parse_rejects_malformed_and_suffix_ranges() {
        assert_eq!(parse_range_header("bytes=-500"), None);
        assert_eq!(parse_range_header("bytes=abc-def"), None);
        assert_eq!(parse_range_header("bytes=0"), None);
        assert_eq!(parse_range_header("items=0-5"), None);
        assert_eq!(parse_range_header(""), None);
    }

    #[test]
    fn test_resolve_bounded_range() {
        let r = ResolvedRange::resolve(
            RangeRequest {
                start: 2,
                end: Some(5),
            },
            10,
            CHUNK,
        )
        .unwrap();
        assert_eq!((r.start, r.end, r.total), (2, 5, 10));
        assert_eq!(r.content_length(), 4);
        assert_eq!(r.content_range(), "bytes 2-5/10");
    }

    #[test]
    fn test_resolve_open_end_defaults_to_chunk_window() {
        let r = ResolvedRange::resolve(
            RangeRequest {
                start: 0,
                end: None,
            },
            5_000_000,
            CHUNK,
        )
        .unwrap();
        assert_eq!(r.end, 999_999);
        assert_eq!(r.content_length(), 1_000_000);
    }

    #[test]
    fn test_resolve_open_end_clamps_to_object_size() {
        let r = ResolvedRange::resolve(
            RangeRequest {
                start: 3,
                end: None,
            },
            10,
            CHUNK,
        )
        .unwrap();
        assert_eq!(r.end, 9);
        assert_eq!(r.content_length(), 7);
    }

    #[test]
    fn test_resolve_end_past_size_clamps() {
        let r = ResolvedRange::resolve(
            RangeRequest {
                start: 5,
                end: Some(500),
            },
            10,
            CHUNK,
        )
        .unwrap();
        assert_eq!(r.end, 9);
    }

    #[test]
    fn test_resolve_start_beyond_size_is_rejected() {
        let err = ResolvedRange::resolve(
            RangeRequest {
                start: 10,
                end: Some(12),
            },
            10,
            CHUNK,
        )
        .unwrap_err();
        assert!(matches!(err, DeliveryError::RangeNotSatisfiable { .. }));
        assert_eq!(err.status_code(), 416);
    }

    #[test]
    fn test_resolve_inverted_range_is_rejected() {
        let err = ResolvedRange::resolve(
            RangeRequest {
                start: 5,
                end: Some(2),
            },
            10,
            CHUNK,
        )
        .unwrap_err();
        assert!(matches!(err, DeliveryError::RangeNotSatisfiable { .. }));
    }

    #[tokio::test]
    async fn test_slice_exact_window_within_one_chunk() {
        let body = chunked_body(b"abcdefghij".to_vec(), 100);
        let range = ResolvedRange {
            start: 2,
            end: 5,
            total: 10,
        };
        let out = collect(slice_stream("movies/t.mp4".into(), body, range)).await;
        assert_eq!(out.as_ref(), b"cdef");
    }

    #[tokio::test]
    async fn test_slice_across_chunk_boundaries() {
        let body = chunked_body(b"abcdefghij".to_vec(), 3);
        let range = ResolvedRange {
            start: 2,
            end: 7,
            total: 10,
        };
        let out = collect(slice_stream("movies/t.mp4".into(), body, range)).await;
        assert_eq!(out.as_ref(), b"cdefgh");
    }

    #[tokio::test]
    async fn test_slice_skips_whole_leading_chunks() {
        let body = chunked_body(b"abcdefghij".to_vec(), 2);
        let range = ResolvedRange {
            start: 6,
            end: 9,
            total: 10,
        };
        let out = collect(slice_stream("movies/t.mp4".into(), body, range)).await;
        assert_eq!(out.as_ref(), b"ghij");
    }

    #[tokio::test]
    async fn test_first_megabyte_of_five_is_exactly_one_megabyte() {
        let data: Vec<u8> = (0..5_000_000u64).map(|i| (i % 251) as u8).collect();
        let expected = data[..1_000_000].to_vec();
        let body = chunked_body(data, 64 * 1024);

        let range = ResolvedRange::resolve(
            RangeRequest {
                start: 0,
                end: Some(999_999),
            },
            5_000_000,
            CHUNK,
        )
        .unwrap();
        assert_eq!(range.content_length(), 1_000_000);

        let out = collect(slice_stream("movies/big.mp4".into(), body, range)).await;
        assert_eq!(out.len(), 1_000_000);
        assert_eq!(out.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_slice_stops_pulling_after_window() {
        // Source errors after the window; a correct slicer never reaches it.
        let chunks: Vec<Result<Bytes, StoreError>> = vec![
            Ok(Bytes::from_static(b"abcde")),
            Ok(Bytes::from_static(b"fghij")),
            Err(StoreError::Read {
                key: "movies/t.mp4".into(),
                offset: 10,
                reason: "must not be pulled".into(),
            }),
        ];
        let body: ObjectBody = Box::pin(stream::iter(chunks));
        let range = ResolvedRange {
            start: 0,
            end: 9,
            total: 20,
        };

        let mut sliced = slice_stream("movies/t.mp4".into(), body, range);
        let mut collected = Vec::new();
        while let Some(item) = sliced.next().await {
            collected.extend_from_slice(&item.unwrap());
        }
        assert_eq!(collected, b"abcdefghij");
    }

    #[tokio::test]
    async fn test_mid_stream_error_propagates() {
        let chunks: Vec<Result<Bytes, StoreError>> = vec![
            Ok(Bytes::from_static(b"abcde")),
            Err(StoreError::Read {
                key: "movies/t.mp4".into(),
                offset: 5,
                reason: "connection reset".into(),
            }),
        ];
        let body: ObjectBody = Box::pin(stream::iter(chunks));
        let range = ResolvedRange {
            start: 0,
            end: 9,
            total: 10,
        };

        let mut sliced = slice_stream("movies/t.mp4".into(), body, range);
        assert_eq!(
            sliced.next().await.unwrap().unwrap().as_ref(),
            b"abcde"
        );
        assert!(sliced.next().await.unwrap().is_err());
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MovieMetadata
// ---------------------------------------------------------------------------

/// Typed movie metadata record.
///
/// `size` and `content_type` are always populated after upload; they are
/// derived from the transferred payload, never from caller input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieMetadata {
    pub title: String,
    pub description: Option<String>,
    pub year: Option<u32>,
    pub duration_mins: Option<u32>,
    pub genre: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub size: u64,
    pub content_type: String,
}

// ---------------------------------------------------------------------------
// Metadata codec
// ---------------------------------------------------------------------------
//
// The object store only persists string-valued metadata, so the typed record
// crosses this boundary as a flat string map. Keys are lowercase with
// hyphens: S3 lowercases user metadata key names, and underscores can be
// dropped by intermediate proxies.

const KEY_TITLE: &str = "title";
const KEY_DESCRIPTION: &str = "description";
const KEY_YEAR: &str = "year";
const KEY_DURATION: &str = "duration";
const KEY_GENRE: &str = "genre";
const KEY_UPLOADED_AT: &str = "uploaded-at";
const KEY_SIZE: &str = "size";
const KEY_CONTENT_TYPE: &str = "content-type";

/// Default content type assumed when the sidecar carries none.
const FALLBACK_CONTENT_TYPE: &str = "video/mp4";

/// Encode a metadata record into the string map the store persists.
///
/// Every optional field becomes an empty string when absent (not omitted),
/// genre joins with `,`, and the timestamp serializes to RFC 3339.
pub fn encode(metadata: &MovieMetadata) -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert(KEY_TITLE.to_string(), metadata.title.clone());
    map.insert(
        KEY_DESCRIPTION.to_string(),
        metadata.description.clone().unwrap_or_default(),
    );
    map.insert(
        KEY_YEAR.to_string(),
        metadata.year.map(|y| y.to_string()).unwrap_or_default(),
    );
    map.insert(
        KEY_DURATION.to_string(),
        metadata
            .duration_mins
            .map(|d| d.to_string())
            .unwrap_or_default(),
    );
    map.insert(KEY_GENRE.to_string(), metadata.genre.join(","));
    map.insert(
        KEY_UPLOADED_AT.to_string(),
        metadata.uploaded_at.to_rfc3339(),
    );
    map.insert(KEY_SIZE.to_string(), metadata.size.to_string());
    map.insert(KEY_CONTENT_TYPE.to_string(), metadata.content_type.clone());
    map
}

/// Decode a string map back into a metadata record.
///
/// Absent or empty numeric fields decode to `None`, never zero. The title
/// falls back to the last path segment of `fallback_key` when missing, the
/// genre list splits on `,` with per-element trimming, and a missing or
/// unparsable timestamp defaults to the current time.
pub fn decode(map: &HashMap<String, String>, fallback_key: &str) -> MovieMetadata {
    let title = match map.get(KEY_TITLE).filter(|t| !t.is_empty()) {
        Some(t) => t.clone(),
        None => fallback_key
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
            .to_string(),
    };

    let description = map
        .get(KEY_DESCRIPTION)
        .filter(|d| !d.is_empty())
        .cloned();

    let year = map.get(KEY_YEAR).and_then(|v| v.parse().ok());
    let duration_mins = map.get(KEY_DURATION).and_then(|v| v.parse().ok());

    let genre = match map.get(KEY_GENRE).filter(|g| !g.is_empty()) {
        Some(g) => g.split(',').map(|s| s.trim().to_string()).collect(),
        None => Vec::new(),
    };

    let uploaded_at = map
        .get(KEY_UPLOADED_AT)
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let size = map.get(KEY_SIZE).and_then(|v| v.parse().ok()).unwrap_or(0);

    let content_type = map
        .get(KEY_CONTENT_TYPE)
        .filter(|c| !c.is_empty())
        .cloned()
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

    MovieMetadata {
        title,
        description,
        year,
        duration_mins,
        genre,
        uploaded_at,
        size,
        content_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn full_metadata() -> MovieMetadata {
        MovieMetadata {
            title: "The Matrix".to_string(),
            description: Some("A hacker learns the truth.".to_string()),
            year: Some(1999),
            duration_mins: Some(136),
            genre: vec!["sci-fi".to_string(), "action".to_string()],
            uploaded_at: Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap(),
            size: 734_003_200,
            content_type: "video/mp4".to_string(),
        }
    }

    #[test]
    fn test_round_trip_fully_populated() {
        let m = full_metadata();
        assert_eq!(decode(&encode(&m), "movies/matrix.mp4"), m);
    }

    #[test]
    fn test_round_trip_fully_absent_optionals() {
        let m = MovieMetadata {
            title: "clip.webm".to_string(),
            description: None,
            year: None,
            duration_mins: None,
            genre: Vec::new(),
            uploaded_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            size: 10,
            content_type: "video/webm".to_string(),
        };
        assert_eq!(decode(&encode(&m), "movies/clip.webm"), m);
    }

    #[test]
    fn test_encode_emits_empty_strings_not_omitted_keys() {
        let mut m = full_metadata();
        m.description = None;
        m.year = None;
        let map = encode(&m);
        assert_eq!(map.get("description").unwrap(), "");
        assert_eq!(map.get("year").unwrap(), "");
        assert_eq!(map.len(), 8);
    }

    #[test]
    fn test_decode_empty_numerics_are_unset_not_zero() {
        let mut map = encode(&full_metadata());
        map.insert("year".to_string(), "".to_string());
        map.insert("duration".to_string(), "not-a-number".to_string());
        let decoded = decode(&map, "movies/matrix.mp4");
        assert_eq!(decoded.year, None);
        assert_eq!(decoded.duration_mins, None);
    }

    #[test]
    fn test_decode_title_falls_back_to_key_segment() {
        let decoded = decode(&HashMap::new(), "movies/bladerunner.mkv");
        assert_eq!(decoded.title, "bladerunner.mkv");
    }

    #[test]
    fn test_decode_genre_trims_elements() {
        let mut map = HashMap::new();
        map.insert("genre".to_string(), " drama , noir ".to_string());
        let decoded = decode(&map, "movies/x.mp4");
        assert_eq!(decoded.genre, vec!["drama".to_string(), "noir".to_string()]);
    }

    #[test]
    fn test_decode_bad_timestamp_defaults_to_now() {
        let mut map = HashMap::new();
        map.insert("uploaded-at".to_string(), "yesterday-ish".to_string());
        let before = Utc::now();
        let decoded = decode(&map, "movies/x.mp4");
        assert!(decoded.uploaded_at >= before);
    }

    #[test]
    fn test_decode_missing_content_type_falls_back() {
        let decoded = decode(&HashMap::new(), "movies/x.mp4");
        assert_eq!(decoded.content_type, "video/mp4");
    }
}

//! # Snapshot Codec
//!
//! Line-oriented text form of a [`NamespaceMap`]: one leaf per line,
//! `<path> <json>\n`, no header. The list action produces it and copy can
//! use it as its source instead of a live server.
//!
//! Versioned payloads are written without their envelope, because the
//! `metadata` half describes the store they came from rather than the secret.
//! Decoding for a versioned target wraps each object back under `data`, so
//! the result looks like a live read.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::namespace::{NamespaceMap, SecretPayload};
use crate::store::Dialect;

/// Separates the path from the JSON payload on each line
const FIELD_SEPARATOR: char = ' ';

/// Characters a path may not contain: they would split the line or the fields
const FORBIDDEN_PATH_CHARS: [char; 3] = [FIELD_SEPARATOR, '\n', '\r'];

/// Serialise one leaf as a snapshot line, newline included.
pub fn encode_entry(path: &str, payload: &SecretPayload, dialect: Dialect) -> Result<String> {
    if path.is_empty() || path.contains(FORBIDDEN_PATH_CHARS) {
        return Err(Error::internal(format!(
            "Path {:?} cannot be represented in a snapshot",
            path
        )));
    }
    let json = serde_json::to_string(&dialect.secret_data(payload))?;
    Ok(format!("{}{}{}\n", path, FIELD_SEPARATOR, json))
}

/// Lines for every fetched leaf of `map`, in map order.
pub fn encode(map: &NamespaceMap, dialect: Dialect) -> impl Iterator<Item = Result<String>> + '_ {
    map.iter().filter_map(move |(path, payload)| match payload {
        Some(payload) => Some(encode_entry(path, payload, dialect)),
        None => {
            debug!(path, "Skipping unfetched leaf");
            None
        }
    })
}

/// Parse a snapshot. Any malformed line aborts the whole decode.
pub fn decode<R: BufRead>(reader: R, dialect: Dialect) -> Result<NamespaceMap> {
    let mut map = NamespaceMap::new();

    for (index, raw) in reader.split(b'\n').enumerate() {
        let number = index + 1;
        let line = String::from_utf8(raw?)
            .map_err(|e| Error::decode(number, format!("invalid UTF-8: {}", e)))?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        let (path, json) = line
            .split_once(FIELD_SEPARATOR)
            .ok_or_else(|| Error::decode(number, "missing space between path and payload"))?;
        if path.is_empty() {
            return Err(Error::decode(number, "empty path"));
        }

        let data = match serde_json::from_str(json) {
            Ok(serde_json::Value::Object(data)) => data,
            Ok(other) => {
                return Err(Error::decode(
                    number,
                    format!("payload must be a JSON object, found {}", json_kind(&other)),
                ))
            }
            Err(e) => return Err(Error::decode(number, format!("invalid JSON: {}", e))),
        };

        if map.contains(path) {
            warn!(path, line = number, "Duplicate snapshot entry; later line wins");
        }
        map.insert(path, dialect.envelope(data));
    }

    Ok(map)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Load and decode a snapshot file.
pub async fn read_snapshot(path: &Path, dialect: Dialect) -> Result<NamespaceMap> {
    let contents = tokio::fs::read(path).await.map_err(|e| {
        Error::config(format!("Cannot read snapshot file '{}': {}", path.display(), e))
    })?;
    let map = decode(contents.as_slice(), dialect)?;
    debug!(path = %path.display(), entries = map.len(), "Snapshot loaded");
    Ok(map)
}

/// Streaming snapshot file sink.
pub struct SnapshotWriter {
    path: PathBuf,
    dialect: Dialect,
    out: BufWriter<tokio::fs::File>,
    written: usize,
}

impl SnapshotWriter {
    /// Create (or truncate) the file at `path`.
    pub async fn create(path: impl Into<PathBuf>, dialect: Dialect) -> Result<Self> {
        let path = path.into();
        let file = tokio::fs::File::create(&path).await.map_err(|e| {
            Error::config(format!("Cannot create snapshot file '{}': {}", path.display(), e))
        })?;
        Ok(Self { path, dialect, out: BufWriter::new(file), written: 0 })
    }

    pub async fn write_entry(&mut self, path: &str, payload: &SecretPayload) -> Result<()> {
        let line = encode_entry(path, payload, self.dialect)?;
        self.out.write_all(line.as_bytes()).await?;
        self.written += 1;
        Ok(())
    }

    /// Flush and close; returns the number of lines written.
    pub async fn finish(mut self) -> Result<usize> {
        self.out.flush().await?;
        debug!(path = %self.path.display(), lines = self.written, "Snapshot written");
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::payload;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample() -> NamespaceMap {
        [
            ("secret/a/x".to_string(), payload(json!({"k": 1}))),
            ("secret/a/y".to_string(), payload(json!({"k": "two words", "n": [1, 2]}))),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_encode_flat_lines() {
        let lines: Vec<String> = encode(&sample(), Dialect::Flat).collect::<Result<_>>().unwrap();
        assert_eq!(
            lines,
            vec![
                "secret/a/x {\"k\":1}\n".to_string(),
                "secret/a/y {\"k\":\"two words\",\"n\":[1,2]}\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_encode_versioned_strips_envelope() {
        let read = payload(json!({"data": {"user": "app"}, "metadata": {"version": 4}}));
        let line = encode_entry("kv/data/app", &read, Dialect::Versioned).unwrap();
        assert_eq!(line, "kv/data/app {\"user\":\"app\"}\n");
    }

    #[test]
    fn test_encode_skips_placeholders() {
        let mut map = sample();
        map.insert_placeholder("secret/unfetched");
        assert_eq!(encode(&map, Dialect::Flat).count(), 2);
    }

    #[test]
    fn test_encode_rejects_unrepresentable_paths() {
        for path in ["secret/my key", "secret/a\nb", "secret/a\rb", ""] {
            let err = encode_entry(path, &payload(json!({})), Dialect::Flat).unwrap_err();
            assert!(matches!(err, Error::Internal(_)), "{path:?} should be rejected");
        }
    }

    #[test]
    fn test_decode_invalid_utf8_reports_line() {
        let mut bytes = b"secret/a {\"k\":1}\nsecret/b {\"k\":\"".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b"\"}\n");

        let err = decode(bytes.as_slice(), Dialect::Flat).unwrap_err();
        assert!(matches!(err, Error::Decode { line: 2, .. }), "{err:?}");
    }

    #[test]
    fn test_round_trip_flat() {
        let text: String = encode(&sample(), Dialect::Flat).collect::<Result<_>>().unwrap();
        let decoded = decode(text.as_bytes(), Dialect::Flat).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_decode_versioned_wraps_data() {
        let decoded = decode("kv/data/app {\"user\":\"app\"}\n".as_bytes(), Dialect::Versioned).unwrap();
        assert_eq!(
            decoded.get("kv/data/app").flatten(),
            Some(&payload(json!({"data": {"user": "app"}})))
        );
    }

    #[test]
    fn test_decode_tolerates_crlf_and_blank_lines() {
        let text = "secret/a {\"k\":1}\r\n\r\n\nsecret/b {\"k\":2}";
        let decoded = decode(text.as_bytes(), Dialect::Flat).unwrap();
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn test_decode_fails_fast_with_line_number() {
        let text = "secret/a {\"k\":1}\nsecret/b\nsecret/c {\"k\":3}\n";
        let err = decode(text.as_bytes(), Dialect::Flat).unwrap_err();
        assert!(matches!(err, Error::Decode { line: 2, .. }));

        let text = "secret/a {\"k\":1}\nsecret/b {not json}\n";
        let err = decode(text.as_bytes(), Dialect::Flat).unwrap_err();
        assert!(matches!(err, Error::Decode { line: 2, .. }));

        let err = decode("secret/a [1,2]\n".as_bytes(), Dialect::Flat).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[tokio::test]
    async fn test_writer_and_reader_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("snapshot.out");

        let mut writer = SnapshotWriter::create(&file, Dialect::Versioned).await.unwrap();
        writer
            .write_entry("kv/data/a", &payload(json!({"data": {"k": 1}, "metadata": {}})))
            .await
            .unwrap();
        writer.write_entry("kv/data/b", &payload(json!({"data": {"k": 2}}))).await.unwrap();
        assert_eq!(writer.finish().await.unwrap(), 2);

        let raw = std::fs::read_to_string(&file).unwrap();
        assert_eq!(raw, "kv/data/a {\"k\":1}\nkv/data/b {\"k\":2}\n");

        let map = read_snapshot(&file, Dialect::Versioned).await.unwrap();
        assert_eq!(map.get("kv/data/b").flatten(), Some(&payload(json!({"data": {"k": 2}}))));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_snapshot(&dir.path().join("absent"), Dialect::Flat).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-zA-Z0-9_#?%.-]{1,6}", 1..4).prop_map(|segments| segments.join("/"))
    }

    fn data_strategy() -> impl Strategy<Value = SecretPayload> {
        let value = prop_oneof![
            "[a-z \n\"\\\\]{0,8}".prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
        ];
        prop::collection::btree_map("[a-z ]{1,6}", value, 0..4)
            .prop_map(|entries| entries.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            entries in prop::collection::btree_map(path_strategy(), data_strategy(), 0..12),
            versioned in any::<bool>(),
        ) {
            let dialect = if versioned { Dialect::Versioned } else { Dialect::Flat };
            let map: NamespaceMap = entries
                .into_iter()
                .map(|(path, data)| (path, dialect.envelope(data)))
                .collect();

            let text: String = encode(&map, dialect).collect::<Result<_>>().unwrap();
            let decoded = decode(text.as_bytes(), dialect).unwrap();

            prop_assert_eq!(text.lines().count(), map.len());
            prop_assert_eq!(decoded, map);
        }
    }
}

//! The JSON application payload carried inside the wire envelope.
//!
//! Grounded in the original `mycpproto` package: [`CopyMessage`] mirrors
//! `MyCPPackage`, [`Direction`] mirrors `DirectionT`, [`CopyStatus`] mirrors
//! `MyCPPackageStatus`, and [`FileEntry`] mirrors `MyFileInfo`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base64-encode `data` as a JSON string rather than the default
/// array-of-numbers `Vec<u8>` encoding, matching the way Go's `encoding/json`
/// automatically base64-encodes a `[]byte` field.
mod data_as_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| {
                base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}

/// Which side of a request holds the authoritative source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// The peer answering this request holds the source; the caller is the destination.
    RemoteIsSrc,
    /// The caller holds the source; the peer answering this request is the destination.
    RemoteIsDst,
}

/// Outcome of a single copy operation as seen by the side that executed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyStatus {
    Fail,
    Ok,
    NotModified,
}

/// One entry in a directory listing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
}

/// A single copy operation, request or response. The same struct serves
/// both directions: a request carries `src_path`/`dst_path`/`direction` and
/// the response fields are filled in by whichever side executes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyMessage {
    pub src_path: String,
    pub dst_path: String,
    #[serde(default, with = "data_as_base64")]
    pub data: Option<Vec<u8>>,
    #[serde(default = "default_status")]
    pub status: CopyStatus,
    #[serde(default)]
    pub src_is_dir: bool,
    #[serde(default)]
    pub entries: Vec<FileEntry>,
    #[serde(default)]
    pub last_copy_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub only_modified: bool,
    pub direction: Direction,
}

fn default_status() -> CopyStatus {
    CopyStatus::Fail
}

impl CopyMessage {
    /// A bare request with no response fields filled in yet.
    pub fn request(
        src_path: impl Into<String>,
        dst_path: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            src_path: src_path.into(),
            dst_path: dst_path.into(),
            data: None,
            status: CopyStatus::Fail,
            src_is_dir: false,
            entries: Vec::new(),
            last_copy_time: None,
            only_modified: false,
            direction,
        }
    }
}

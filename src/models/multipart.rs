//! S3-facing shapes of multipart uploads and their parts.
//!
//! Part numbers in this module are always 1-based, as S3 clients see them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Custom metadata key under which the aggregate ETag is stored on the
/// completed object.
pub const ETAG_METADATA_KEY: &str = "s3:etag";

/// Custom metadata key carrying the object's content type.
pub const CONTENT_TYPE_METADATA_KEY: &str = "content-type";

pub type Metadata = HashMap<String, String>;

/// Result of uploading a single part.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PartInfo {
    /// Part number (1-based).
    pub part_number: u32,

    pub last_modified: Option<DateTime<Utc>>,

    /// Hex MD5 of the part payload. Empty when listing, since part ETags
    /// are not persisted by the network.
    pub etag: String,

    /// Size in bytes.
    pub size: u64,
}

/// A part reference sent by the client when completing an upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletePart {
    pub part_number: u32,
    pub etag: String,
}

/// Identifiers of an upload, echoed back without a network round-trip.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MultipartInfo {
    pub bucket: String,
    pub object: String,
    pub upload_id: String,
    pub initiated: Option<DateTime<Utc>>,
    pub user_defined: Metadata,
}

/// One page of parts for a single upload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ListPartsInfo {
    pub bucket: String,
    pub object: String,
    pub upload_id: String,
    pub part_number_marker: u32,
    pub next_part_number_marker: u32,
    pub max_parts: usize,
    pub is_truncated: bool,
    pub parts: Vec<PartInfo>,
}

/// One page of in-progress uploads in a bucket.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ListMultipartsInfo {
    pub key_marker: String,
    pub upload_id_marker: String,
    /// Only set when `is_truncated`.
    pub next_key_marker: Option<String>,
    /// Never populated: resuming at an exact (key, upload id) pair is not
    /// supported, only the key marker is.
    pub next_upload_id_marker: Option<String>,
    pub max_uploads: usize,
    pub is_truncated: bool,
    pub uploads: Vec<MultipartInfo>,
    pub prefix: String,
    pub delimiter: String,
    pub common_prefixes: Vec<String>,
}

/// Metadata of a completed object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub bucket: String,
    pub name: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub etag: String,
    pub content_type: Option<String>,
    /// User metadata, without the entries surfaced as dedicated fields.
    pub user_defined: Metadata,
}

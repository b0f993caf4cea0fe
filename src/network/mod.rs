//! The storage network's stream API, as consumed by the multipart adapter.
//!
//! An upload on the network is a single pending stream addressed by an
//! opaque stream id, with 0-based part indices. Nothing here knows about
//! S3 part numbers or ETags.

pub mod memory;

use crate::models::{access::AccessGrant, multipart::Metadata};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("stream id is invalid or no longer pending")]
    StreamIdInvalid,
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("project is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Other(String),
}

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Part payload handed to [`Project::upload_part`].
pub type PartData = BoxStream<'static, io::Result<Bytes>>;

/// Options applied to every upload begun through a project.
#[derive(Clone, Copy, Debug)]
pub struct ProjectOptions {
    /// Delete a partially written upload when the call writing it is
    /// cancelled. Off for uploads begun by the gateway.
    pub delete_on_cancel: bool,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            delete_on_cancel: true,
        }
    }
}

/// Stored size of a freshly uploaded part.
#[derive(Clone, Debug)]
pub struct UploadedPart {
    pub part_index: u32,
    pub size: u64,
}

/// A part as reported by [`Project::list_parts`].
#[derive(Clone, Debug)]
pub struct PartItem {
    /// 0-based index.
    pub part_index: u32,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct PartList {
    pub items: Vec<PartItem>,
    /// More parts exist after this page.
    pub more: bool,
}

/// Committed object, as returned when an upload is completed.
#[derive(Clone, Debug)]
pub struct ObjectStat {
    pub key: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub custom: Metadata,
}

/// Item yielded by an upload listing: either a grouping prefix or a pending
/// upload.
#[derive(Clone, Debug)]
pub struct UploadItem {
    pub key: String,
    pub is_prefix: bool,
    pub stream_id: String,
    pub created: Option<DateTime<Utc>>,
    pub custom: Metadata,
}

#[derive(Clone, Debug, Default)]
pub struct ListUploadsOptions {
    pub prefix: String,
    /// Only keys strictly after the cursor are returned.
    pub cursor: String,
    pub recursive: bool,
    /// Include system metadata (creation time).
    pub system: bool,
    /// Include custom metadata.
    pub custom: bool,
}

pub type UploadStream<'a> = BoxStream<'a, NetworkResult<UploadItem>>;

/// Opens scoped connections to the network.
#[async_trait]
pub trait StreamNetwork: Send + Sync {
    async fn open_project(
        &self,
        access: &AccessGrant,
        options: ProjectOptions,
    ) -> NetworkResult<Box<dyn Project>>;
}

/// A connection to one project. Callers must [`Project::close`] it; a
/// project dropped without closing (for example when the request future is
/// cancelled) releases its resources in `Drop`.
#[async_trait]
pub trait Project: Send + Sync {
    /// Start a pending upload carrying `custom` metadata and return its
    /// stream id.
    async fn begin_upload(
        &self,
        bucket: &str,
        key: &str,
        custom: Metadata,
    ) -> NetworkResult<String>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        stream_id: &str,
        part_index: u32,
        data: PartData,
    ) -> NetworkResult<UploadedPart>;

    async fn abort_upload(&self, bucket: &str, key: &str, stream_id: &str) -> NetworkResult<()>;

    async fn commit_upload(
        &self,
        bucket: &str,
        key: &str,
        stream_id: &str,
        custom: Metadata,
    ) -> NetworkResult<ObjectStat>;

    /// Parts with an index strictly greater than `cursor`, at most `limit`
    /// of them (`0` means no limit).
    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        stream_id: &str,
        cursor: Option<u32>,
        limit: usize,
    ) -> NetworkResult<PartList>;

    /// Pending uploads in a bucket, paged internally.
    fn list_uploads<'a>(
        &'a self,
        bucket: &'a str,
        options: ListUploadsOptions,
    ) -> UploadStream<'a>;

    /// Pending uploads for exactly one object key.
    fn list_pending_streams<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        options: ListUploadsOptions,
    ) -> UploadStream<'a>;

    async fn close(self: Box<Self>) -> NetworkResult<()>;
}

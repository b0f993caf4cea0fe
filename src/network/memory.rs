//! In-memory stream network used by tests and local runs.

use super::{
    ListUploadsOptions, NetworkError, NetworkResult, ObjectStat, PartData, PartItem, PartList,
    Project, ProjectOptions, StreamNetwork, UploadItem, UploadStream, UploadedPart,
};
use crate::models::{access::AccessGrant, multipart::Metadata};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tracing::debug;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Default)]
struct State {
    buckets: BTreeSet<String>,
    uploads: BTreeMap<String, PendingUpload>,
    objects: BTreeMap<(String, String), StoredObject>,
}

struct PendingUpload {
    bucket: String,
    key: String,
    created: DateTime<Utc>,
    custom: Metadata,
    delete_on_cancel: bool,
    parts: BTreeMap<u32, StoredPart>,
}

struct StoredPart {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

struct StoredObject {
    data: Bytes,
    custom: Metadata,
}

/// A single-satellite network holding everything in process memory.
///
/// Besides serving projects it exposes a few inspection helpers so tests can
/// observe what the adapter did on the network side.
#[derive(Clone)]
pub struct MemoryNetwork {
    satellite_address: String,
    state: Arc<Mutex<State>>,
    open_projects: Arc<AtomicUsize>,
    fail_close: Arc<AtomicBool>,
    page_size: usize,
}

impl MemoryNetwork {
    pub fn new(satellite_address: impl Into<String>) -> Self {
        Self {
            satellite_address: satellite_address.into(),
            state: Arc::new(Mutex::new(State::default())),
            open_projects: Arc::new(AtomicUsize::new(0)),
            fail_close: Arc::new(AtomicBool::new(false)),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Number of items fetched per internal listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn create_bucket(&self, name: &str) {
        self.state.lock().buckets.insert(name.to_string());
    }

    /// Projects opened and not yet released.
    pub fn open_projects(&self) -> usize {
        self.open_projects.load(Ordering::SeqCst)
    }

    /// Make every subsequent `close` report an error (after releasing).
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn is_pending(&self, stream_id: &str) -> bool {
        self.state.lock().uploads.contains_key(stream_id)
    }

    pub fn deletes_on_cancel(&self, stream_id: &str) -> Option<bool> {
        self.state
            .lock()
            .uploads
            .get(stream_id)
            .map(|upload| upload.delete_on_cancel)
    }

    /// Payload and custom metadata of a committed object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<(Bytes, Metadata)> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|obj| (obj.data.clone(), obj.custom.clone()))
    }
}

#[async_trait]
impl StreamNetwork for MemoryNetwork {
    async fn open_project(
        &self,
        access: &AccessGrant,
        options: ProjectOptions,
    ) -> NetworkResult<Box<dyn Project>> {
        if access.satellite_address != self.satellite_address {
            return Err(NetworkError::PermissionDenied(format!(
                "access grant is for satellite `{}`",
                access.satellite_address
            )));
        }
        self.open_projects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryProject {
            state: self.state.clone(),
            open_projects: self.open_projects.clone(),
            fail_close: self.fail_close.load(Ordering::SeqCst),
            released: AtomicBool::new(false),
            options,
            page_size: self.page_size,
        }))
    }
}

struct MemoryProject {
    state: Arc<Mutex<State>>,
    open_projects: Arc<AtomicUsize>,
    fail_close: bool,
    released: AtomicBool,
    options: ProjectOptions,
    page_size: usize,
}

impl MemoryProject {
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.open_projects.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Ordered listing entries strictly after `after`, grouped into prefixes
    /// when not recursive.
    fn upload_page(
        &self,
        bucket: &str,
        exact_key: Option<&str>,
        options: &ListUploadsOptions,
        after: Option<&(String, String)>,
    ) -> NetworkResult<Vec<UploadItem>> {
        let state = self.state.lock();
        if !state.buckets.contains(bucket) {
            return Err(NetworkError::BucketNotFound(bucket.to_string()));
        }

        let mut entries: BTreeMap<(String, String), UploadItem> = BTreeMap::new();
        for (stream_id, upload) in &state.uploads {
            if upload.bucket != bucket {
                continue;
            }
            match exact_key {
                Some(key) if upload.key != key => continue,
                Some(_) => {}
                None => {
                    if !upload.key.starts_with(&options.prefix)
                        || upload.key.as_str() <= options.cursor.as_str()
                    {
                        continue;
                    }
                    if !options.recursive {
                        if let Some(prefix) = common_prefix(&upload.key, &options.prefix) {
                            entries
                                .entry((prefix.clone(), String::new()))
                                .or_insert_with(|| UploadItem {
                                    key: prefix,
                                    is_prefix: true,
                                    stream_id: String::new(),
                                    created: None,
                                    custom: Metadata::new(),
                                });
                            continue;
                        }
                    }
                }
            }
            entries.insert(
                (upload.key.clone(), stream_id.clone()),
                UploadItem {
                    key: upload.key.clone(),
                    is_prefix: false,
                    stream_id: stream_id.clone(),
                    created: options.system.then_some(upload.created),
                    custom: if options.custom {
                        upload.custom.clone()
                    } else {
                        Metadata::new()
                    },
                },
            );
        }

        Ok(entries
            .into_iter()
            .filter(|(pos, _)| after.is_none_or(|after| pos > after))
            .take(self.page_size)
            .map(|(_, item)| item)
            .collect())
    }

    fn paged<'a>(
        &'a self,
        bucket: &'a str,
        exact_key: Option<&'a str>,
        options: ListUploadsOptions,
    ) -> UploadStream<'a> {
        let pages = stream::unfold(
            (Some(None::<(String, String)>), options),
            move |(after, options)| async move {
                let after = after?;
                match self.upload_page(bucket, exact_key, &options, after.as_ref()) {
                    Ok(page) if page.is_empty() => None,
                    Ok(page) => {
                        let next = page
                            .last()
                            .map(|item| (item.key.clone(), item.stream_id.clone()));
                        let items: Vec<NetworkResult<UploadItem>> =
                            page.into_iter().map(Ok).collect();
                        Some((stream::iter(items), (Some(next), options)))
                    }
                    Err(err) => Some((stream::iter(vec![Err(err)]), (None, options))),
                }
            },
        );
        pages.flatten().fuse().boxed()
    }
}

impl Drop for MemoryProject {
    fn drop(&mut self) {
        self.release();
    }
}

/// Removes a pending upload if a part write is abandoned midway, when the
/// upload was begun with delete-on-cancel.
struct CancelGuard<'a> {
    state: &'a Mutex<State>,
    stream_id: &'a str,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        if state
            .uploads
            .get(self.stream_id)
            .is_some_and(|upload| upload.delete_on_cancel)
        {
            debug!(stream_id = self.stream_id, "deleting upload after cancelled write");
            state.uploads.remove(self.stream_id);
        }
    }
}

#[async_trait]
impl Project for MemoryProject {
    async fn begin_upload(
        &self,
        bucket: &str,
        key: &str,
        custom: Metadata,
    ) -> NetworkResult<String> {
        let mut state = self.state.lock();
        if !state.buckets.contains(bucket) {
            return Err(NetworkError::BucketNotFound(bucket.to_string()));
        }
        let stream_id = Uuid::new_v4().simple().to_string();
        state.uploads.insert(
            stream_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                created: Utc::now(),
                custom,
                delete_on_cancel: self.options.delete_on_cancel,
                parts: BTreeMap::new(),
            },
        );
        Ok(stream_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        stream_id: &str,
        part_index: u32,
        mut data: PartData,
    ) -> NetworkResult<UploadedPart> {
        ensure_pending(&self.state.lock(), bucket, key, stream_id)?;

        let mut guard = CancelGuard {
            state: &self.state,
            stream_id,
            armed: true,
        };
        let mut buf = BytesMut::new();
        while let Some(chunk) = data.next().await {
            buf.extend_from_slice(&chunk?);
        }
        guard.armed = false;

        let mut state = self.state.lock();
        let upload = ensure_pending_mut(&mut state, bucket, key, stream_id)?;
        let size = buf.len() as u64;
        upload.parts.insert(
            part_index,
            StoredPart {
                data: buf.freeze(),
                last_modified: Utc::now(),
            },
        );
        Ok(UploadedPart { part_index, size })
    }

    async fn abort_upload(&self, bucket: &str, key: &str, stream_id: &str) -> NetworkResult<()> {
        let mut state = self.state.lock();
        ensure_pending(&state, bucket, key, stream_id)?;
        state.uploads.remove(stream_id);
        Ok(())
    }

    async fn commit_upload(
        &self,
        bucket: &str,
        key: &str,
        stream_id: &str,
        custom: Metadata,
    ) -> NetworkResult<ObjectStat> {
        let mut state = self.state.lock();
        ensure_pending(&state, bucket, key, stream_id)?;
        let Some(upload) = state.uploads.remove(stream_id) else {
            return Err(NetworkError::StreamIdInvalid);
        };

        let mut data = BytesMut::new();
        for part in upload.parts.values() {
            data.extend_from_slice(&part.data);
        }
        let stat = ObjectStat {
            key: upload.key.clone(),
            size: data.len() as u64,
            created: Utc::now(),
            custom: custom.clone(),
        };
        state.objects.insert(
            (upload.bucket, upload.key),
            StoredObject {
                data: data.freeze(),
                custom,
            },
        );
        Ok(stat)
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        stream_id: &str,
        cursor: Option<u32>,
        limit: usize,
    ) -> NetworkResult<PartList> {
        let state = self.state.lock();
        let upload = ensure_pending(&state, bucket, key, stream_id)?;
        let mut remaining = upload
            .parts
            .iter()
            .filter(|(index, _)| cursor.is_none_or(|cursor| **index > cursor))
            .map(|(index, part)| PartItem {
                part_index: *index,
                size: part.data.len() as u64,
                last_modified: part.last_modified,
            });

        let take = if limit == 0 { usize::MAX } else { limit };
        let items: Vec<PartItem> = remaining.by_ref().take(take).collect();
        let more = remaining.next().is_some();
        Ok(PartList { items, more })
    }

    fn list_uploads<'a>(
        &'a self,
        bucket: &'a str,
        options: ListUploadsOptions,
    ) -> UploadStream<'a> {
        self.paged(bucket, None, options)
    }

    fn list_pending_streams<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        options: ListUploadsOptions,
    ) -> UploadStream<'a> {
        self.paged(bucket, Some(key), options)
    }

    async fn close(self: Box<Self>) -> NetworkResult<()> {
        self.release();
        if self.fail_close {
            return Err(NetworkError::Other("connection reset while closing".into()));
        }
        Ok(())
    }
}

fn ensure_pending<'s>(
    state: &'s State,
    bucket: &str,
    key: &str,
    stream_id: &str,
) -> NetworkResult<&'s PendingUpload> {
    if !state.buckets.contains(bucket) {
        return Err(NetworkError::BucketNotFound(bucket.to_string()));
    }
    match state.uploads.get(stream_id) {
        Some(upload) if upload.bucket == bucket && upload.key == key => Ok(upload),
        _ => Err(NetworkError::StreamIdInvalid),
    }
}

fn ensure_pending_mut<'s>(
    state: &'s mut State,
    bucket: &str,
    key: &str,
    stream_id: &str,
) -> NetworkResult<&'s mut PendingUpload> {
    ensure_pending(state, bucket, key, stream_id)?;
    state
        .uploads
        .get_mut(stream_id)
        .ok_or(NetworkError::StreamIdInvalid)
}

/// Grouping prefix of `key` below `prefix`, if `key` has a further `/`.
fn common_prefix(key: &str, prefix: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    rest.find('/')
        .map(|pos| format!("{}{}", prefix, &rest[..=pos]))
}

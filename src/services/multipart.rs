//! MultipartGateway: S3 multipart uploads on top of the storage network's
//! pending streams.
//!
//! The S3 upload id is the network's stream id, passed through verbatim.
//! Part numbers are 1-based here and 0-based on the network. Every call
//! opens its own project and closes it before returning; no upload state is
//! kept between requests.

use crate::models::{
    multipart::{
        CONTENT_TYPE_METADATA_KEY, CompletePart, ETAG_METADATA_KEY, ListMultipartsInfo,
        ListPartsInfo, Metadata, MultipartInfo, ObjectInfo, PartInfo,
    },
    record::EncryptionKey,
};
use crate::network::{ListUploadsOptions, ObjectStat, Project, ProjectOptions, StreamNetwork};
use crate::services::{
    auth_db::Database,
    etag::compute_aggregate_etag,
    gateway_errors::{GatewayError, GatewayResult, convert_error, convert_multipart_error},
    listing::{collect_upload_page, part_cursor, part_infos},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use md5::Context;
use parking_lot::Mutex;
use std::{io, sync::Arc};
use tracing::{debug, info, warn};

/// Parameters of ListMultipartUploads.
#[derive(Clone, Debug, Default)]
pub struct ListUploadsParams {
    pub prefix: String,
    pub key_marker: String,
    pub upload_id_marker: String,
    pub delimiter: String,
    /// `0` lists everything.
    pub max_uploads: usize,
}

#[derive(Clone)]
pub struct MultipartGateway {
    network: Arc<dyn StreamNetwork>,
    credentials: Database,
}

impl MultipartGateway {
    pub fn new(network: Arc<dyn StreamNetwork>, credentials: Database) -> Self {
        Self {
            network,
            credentials,
        }
    }

    /// Resolve the caller's access grant and open a project with it.
    async fn open_project(
        &self,
        key: &EncryptionKey,
        options: ProjectOptions,
    ) -> GatewayResult<Box<dyn Project>> {
        let (access, _secret) = self.credentials.get(key).await?;
        self.network
            .open_project(&access, options)
            .await
            .map_err(|err| convert_error(err, "", ""))
    }

    /// Start an upload and return its upload id.
    ///
    /// The project is opened with delete-on-cancel off for the lifetime of
    /// the upload.
    pub async fn new_multipart_upload(
        &self,
        key: &EncryptionKey,
        bucket: &str,
        object: &str,
        metadata: Metadata,
    ) -> GatewayResult<String> {
        let project = self
            .open_project(
                key,
                ProjectOptions {
                    delete_on_cancel: false,
                },
            )
            .await?;

        let result = project
            .begin_upload(bucket, object, metadata)
            .await
            .map_err(|err| convert_multipart_error(err, bucket, object, ""));
        let upload_id = finish(project, result).await?;

        info!(bucket, object, upload_id = %upload_id, "multipart upload started");
        Ok(upload_id)
    }

    /// Identifiers of an upload. The network has no call for this, so
    /// nothing beyond the identifiers is filled in.
    pub fn get_multipart_info(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> MultipartInfo {
        MultipartInfo {
            bucket: bucket.to_string(),
            object: object.to_string(),
            upload_id: upload_id.to_string(),
            initiated: None,
            user_defined: Metadata::new(),
        }
    }

    /// Upload part `part_number` (1-based) from `data`.
    ///
    /// The returned ETag is the MD5 of the bytes received. It is not stored
    /// on the network, so later listings report an empty ETag for the part.
    pub async fn put_object_part<S>(
        &self,
        key: &EncryptionKey,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u32,
        data: S,
    ) -> GatewayResult<PartInfo>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let part_index = part_number
            .checked_sub(1)
            .ok_or(GatewayError::InvalidPartNumber { part_number })?;
        let project = self.open_project(key, ProjectOptions::default()).await?;

        let digest = Arc::new(Mutex::new(Context::new()));
        let tap = digest.clone();
        let data = data
            .inspect(move |chunk| {
                if let Ok(chunk) = chunk {
                    tap.lock().consume(chunk);
                }
            })
            .boxed();

        let result = project
            .upload_part(bucket, object, upload_id, part_index, data)
            .await
            .map_err(|err| convert_multipart_error(err, bucket, object, upload_id));
        let uploaded = finish(project, result).await?;

        let etag = std::mem::replace(&mut *digest.lock(), Context::new()).compute();
        debug!(bucket, object, upload_id, part_number, size = uploaded.size, "stored part");
        Ok(PartInfo {
            part_number,
            last_modified: None,
            etag: format!("{:x}", etag),
            size: uploaded.size,
        })
    }

    /// Abort an upload. Aborting an upload that no longer exists fails with
    /// [`GatewayError::InvalidUploadId`].
    pub async fn abort_multipart_upload(
        &self,
        key: &EncryptionKey,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> GatewayResult<()> {
        let project = self.open_project(key, ProjectOptions::default()).await?;
        let result = project
            .abort_upload(bucket, object, upload_id)
            .await
            .map_err(|err| convert_multipart_error(err, bucket, object, upload_id));
        finish(project, result).await?;

        info!(bucket, object, upload_id, "multipart upload aborted");
        Ok(())
    }

    /// Commit an upload with the aggregate ETag of `parts` stored under
    /// `s3:etag`.
    ///
    /// `parts` must already be sorted by part number; their ETags are not
    /// checked against the uploaded parts since those are not persisted.
    pub async fn complete_multipart_upload(
        &self,
        key: &EncryptionKey,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[CompletePart],
        user_defined: &Metadata,
    ) -> GatewayResult<ObjectInfo> {
        let project = self.open_project(key, ProjectOptions::default()).await?;

        let etag = compute_aggregate_etag(parts);
        let mut metadata = user_defined.clone();
        metadata.insert(ETAG_METADATA_KEY.to_string(), etag.clone());

        let result = project
            .commit_upload(bucket, object, upload_id, metadata)
            .await
            .map_err(|err| convert_multipart_error(err, bucket, object, upload_id));
        let stat = finish(project, result).await?;

        info!(bucket, object, upload_id, etag = %etag, "multipart upload completed");
        Ok(object_info(bucket, etag, stat))
    }

    /// List parts after `part_number_marker`, at most `max_parts` of them,
    /// sorted by part number.
    pub async fn list_object_parts(
        &self,
        key: &EncryptionKey,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: u32,
        max_parts: usize,
    ) -> GatewayResult<ListPartsInfo> {
        let project = self.open_project(key, ProjectOptions::default()).await?;
        let result = project
            .list_parts(
                bucket,
                object,
                upload_id,
                part_cursor(part_number_marker),
                max_parts,
            )
            .await
            .map_err(|err| convert_multipart_error(err, bucket, object, upload_id));
        let list = finish(project, result).await?;

        let is_truncated = list.more;
        let parts = part_infos(list);
        let next_part_number_marker = parts
            .last()
            .map(|part| part.part_number)
            .unwrap_or(part_number_marker);

        Ok(ListPartsInfo {
            bucket: bucket.to_string(),
            object: object.to_string(),
            upload_id: upload_id.to_string(),
            part_number_marker,
            next_part_number_marker,
            max_parts,
            is_truncated,
            parts,
        })
    }

    /// List in-progress uploads in `bucket`.
    ///
    /// A non-empty prefix that does not end in `/` is treated as an exact
    /// object key; otherwise uploads are listed below the prefix, recursively
    /// only when no delimiter is given.
    pub async fn list_multipart_uploads(
        &self,
        key: &EncryptionKey,
        bucket: &str,
        params: ListUploadsParams,
    ) -> GatewayResult<ListMultipartsInfo> {
        if bucket.is_empty() {
            return Err(GatewayError::BucketNameInvalid);
        }
        if !params.delimiter.is_empty() && params.delimiter != "/" {
            return Err(GatewayError::UnsupportedDelimiter {
                delimiter: params.delimiter,
            });
        }

        let project = self.open_project(key, ProjectOptions::default()).await?;
        let object_level = !params.prefix.is_empty() && !params.prefix.ends_with('/');
        debug!(bucket, prefix = %params.prefix, object_level, "listing multipart uploads");

        let list = if object_level {
            project.list_pending_streams(
                bucket,
                &params.prefix,
                ListUploadsOptions {
                    system: true,
                    custom: true,
                    ..Default::default()
                },
            )
        } else {
            project.list_uploads(
                bucket,
                ListUploadsOptions {
                    prefix: params.prefix.clone(),
                    cursor: params.key_marker.clone(),
                    recursive: params.delimiter.is_empty(),
                    system: true,
                    custom: true,
                },
            )
        };
        let result = collect_upload_page(list, bucket, &params.key_marker, params.max_uploads)
            .await
            .map_err(|err| convert_multipart_error(err, bucket, "", ""));
        let page = finish(project, result).await?;

        Ok(ListMultipartsInfo {
            key_marker: params.key_marker,
            upload_id_marker: params.upload_id_marker,
            next_key_marker: page.next_key_marker,
            next_upload_id_marker: None,
            max_uploads: params.max_uploads,
            is_truncated: page.is_truncated,
            uploads: page.uploads,
            prefix: params.prefix,
            delimiter: params.delimiter,
            common_prefixes: page.common_prefixes,
        })
    }
}

/// Close `project` and merge the close result into `result`.
///
/// A close failure after a successful operation is returned on its own;
/// after a failed operation it is attached to the primary error.
async fn finish<T>(project: Box<dyn Project>, result: GatewayResult<T>) -> GatewayResult<T> {
    match (result, project.close().await) {
        (result, Ok(())) => result,
        (Ok(_), Err(close)) => Err(GatewayError::Storage(close)),
        (Err(primary), Err(close)) => {
            warn!(error = %primary, close_error = %close, "closing project failed after error");
            Err(GatewayError::Cleanup {
                primary: Box::new(primary),
                close,
            })
        }
    }
}

fn object_info(bucket: &str, etag: String, stat: ObjectStat) -> ObjectInfo {
    let mut user_defined = stat.custom;
    user_defined.remove(ETAG_METADATA_KEY);
    let content_type = user_defined.remove(CONTENT_TYPE_METADATA_KEY);
    ObjectInfo {
        bucket: bucket.to_string(),
        name: stat.key,
        size: stat.size,
        mod_time: stat.created,
        etag,
        content_type,
        user_defined,
    }
}

//! Turns the network's cursor-based listings into S3 pages with markers and
//! a truncation flag.

use crate::models::multipart::{MultipartInfo, PartInfo};
use crate::network::{NetworkResult, PartList, UploadItem, UploadStream};
use futures::StreamExt;

/// One page of an upload listing, before S3 bookkeeping fields are added.
#[derive(Debug, Default)]
pub struct UploadPage {
    pub uploads: Vec<MultipartInfo>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// Key of the last upload in the page; only set when truncated.
    pub next_key_marker: Option<String>,
}

/// Drain up to `max_uploads` items (all of them when `0`) from `list`.
///
/// Prefixes and uploads each take one slot of the page. One further item is
/// probed, and discarded, to decide whether the listing is truncated.
pub async fn collect_upload_page(
    mut list: UploadStream<'_>,
    bucket: &str,
    key_marker: &str,
    max_uploads: usize,
) -> NetworkResult<UploadPage> {
    let unlimited = max_uploads == 0;
    let mut remaining = max_uploads;
    let mut page = UploadPage::default();
    let mut start_after = key_marker.to_string();
    let mut exhausted = false;

    while unlimited || remaining > 0 {
        let Some(item) = list.next().await else {
            exhausted = true;
            break;
        };
        let item = item?;
        remaining = remaining.saturating_sub(1);

        if item.is_prefix {
            page.common_prefixes.push(item.key);
            continue;
        }
        start_after.clone_from(&item.key);
        page.uploads.push(multipart_info(bucket, item));
    }

    // A finished stream must not be polled again.
    page.is_truncated = if exhausted {
        false
    } else {
        match list.next().await {
            Some(item) => {
                item?;
                true
            }
            None => false,
        }
    };
    if page.is_truncated {
        page.next_key_marker = Some(start_after);
    }
    Ok(page)
}

fn multipart_info(bucket: &str, item: UploadItem) -> MultipartInfo {
    MultipartInfo {
        bucket: bucket.to_string(),
        object: item.key,
        upload_id: item.stream_id,
        initiated: item.created,
        user_defined: item.custom,
    }
}

/// Convert a page of network parts into S3 parts: 1-based numbers, sorted
/// ascending. ETags are left empty since the network does not keep them.
pub fn part_infos(list: PartList) -> Vec<PartInfo> {
    let mut parts: Vec<PartInfo> = list
        .items
        .into_iter()
        .map(|item| PartInfo {
            part_number: item.part_index + 1,
            last_modified: Some(item.last_modified),
            etag: String::new(),
            size: item.size,
        })
        .collect();
    parts.sort_by_key(|part| part.part_number);
    parts
}

/// S3 part-number marker to network cursor: parts after number `n` are parts
/// after index `n - 1`; marker `0` means from the start.
pub fn part_cursor(part_number_marker: u32) -> Option<u32> {
    part_number_marker.checked_sub(1)
}

//! Aggregate ETag for completed multipart uploads.
//!
//! Matches the S3 convention: MD5 over the concatenated binary MD5s of the
//! parts, suffixed with `-<part count>`.

use crate::models::multipart::CompletePart;
use md5::Context;

/// Compute the aggregate ETag of `parts`, in the order given.
///
/// Part ETags that are not hex MD5s (after stripping quotes and any
/// `-<n>` suffix) contribute their raw bytes instead.
pub fn compute_aggregate_etag(parts: &[CompletePart]) -> String {
    let mut digest = Context::new();
    for part in parts {
        match hex::decode(canonical_etag(&part.etag)) {
            Ok(md5) => digest.consume(&md5),
            Err(_) => digest.consume(part.etag.as_bytes()),
        }
    }
    format!("{:x}-{}", digest.compute(), parts.len())
}

/// Strip surrounding quotes and anything from the first `-` on.
fn canonical_etag(etag: &str) -> &str {
    let etag = etag.trim_matches('"');
    match etag.find('-') {
        Some(pos) => &etag[..pos],
        None => etag,
    }
}

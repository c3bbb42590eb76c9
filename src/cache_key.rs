//! Cache-key prediction for the auth-only response mode.
//!
//! Mirrors the two-level hash-sharded directory layout of the disk
//! cache sitting in front of this gateway.  The gateway only predicts
//! where a response would land; it never writes to that cache.

use md5::{Digest, Md5};

/// Root of the external cache tree.
const CACHE_ROOT: &str = "/data/nginx/";

/// Sub-root for thumbnail objects.
const THUMB_SUBROOT: &str = "thumb_cache/";

/// Sub-root for everything else.
const LONGTAIL_SUBROOT: &str = "longtail_cache/";

/// Compute the sharded cache key for a fully-qualified upstream URL.
///
/// The key is the hex MD5 of the URL, sharded by its last character and
/// the two characters before it:
/// `<root><sub-root><digest[-1]>/<digest[-3:-1]>/<digest>`.
pub fn compute_cache_key(url: &str) -> String {
    let digest = hex::encode(Md5::digest(url.as_bytes()));
    let sub_root = if url.contains("_thumb") {
        THUMB_SUBROOT
    } else {
        LONGTAIL_SUBROOT
    };
    let n = digest.len();
    format!(
        "{CACHE_ROOT}{sub_root}{}/{}/{}",
        &digest[n - 1..],
        &digest[n - 3..n - 1],
        digest
    )
}

//! Recognizing storage object references.

use url::Url;

const PUBLIC_MARKER: &str = "/object/public/";
const SIGN_SEGMENT: &str = "sign";
const TOKEN_PARAM: &str = "token";

/// Bucket and object path inside the storage service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub path: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into().trim_start_matches('/').to_string(),
        }
    }
}

/// True when the reference already carries a signature.
pub fn is_signed_url(reference: &str) -> bool {
    match Url::parse(reference) {
        Ok(url) => {
            url.query_pairs().any(|(key, _)| key == TOKEN_PARAM)
                || url
                    .path_segments()
                    .map_or(false, |mut segments| segments.any(|s| s == SIGN_SEGMENT))
        }
        Err(_) => reference.contains("/sign/") || reference.contains("token="),
    }
}

/// Extracts bucket and path from `.../object/public/<bucket>/<path>`.
pub fn parse_public_url(reference: &str) -> Option<ObjectLocation> {
    let url = Url::parse(reference).ok()?;
    let (_, rest) = url.path().split_once(PUBLIC_MARKER)?;
    let (bucket, path) = rest.split_once('/')?;
    if bucket.is_empty() || path.is_empty() {
        return None;
    }
    Some(ObjectLocation::new(bucket, path))
}

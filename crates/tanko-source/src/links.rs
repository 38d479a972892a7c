//! URL resolution against a source's base URL.

use url::Url;

use crate::error::{HttpError, HttpResult};

/// Resolve `reference` against `base`.
///
/// Absolute references are returned as-is; relative ones follow RFC 3986
/// resolution, so `p/2` against `https://x.test/c/1/` yields
/// `https://x.test/c/1/p/2` and `/p/2` yields `https://x.test/p/2`.
pub fn resolve(base: &Url, reference: &str) -> HttpResult<Url> {
    Ok(base.join(reference.trim())?)
}

/// Parse a user-supplied base URL, adding the trailing slash that makes
/// relative chapter paths land under it instead of replacing its last segment.
pub fn parse_base(base: &str) -> HttpResult<Url> {
    let mut url = Url::parse(base.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// `scheme://host[:port]/` of an absolute URL.
pub fn origin_of(raw: &str) -> HttpResult<String> {
    let url = Url::parse(raw.trim())?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(HttpError::invalid(format!("{url} has no host to resolve against")));
    }
    Ok(format!("{}/", origin.ascii_serialization()))
}

//! Proxy path rewriting.

use thiserror::Error;

/// Request paths that cannot be reduced to one unambiguous canonical form.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("request path must start with '/': {0}")]
    Relative(String),
    #[error("request path contains an encoded separator: {0}")]
    EncodedSeparator(String),
    #[error("request path is not valid percent-encoded utf-8: {0}")]
    InvalidEncoding(String),
}

/// Canonical form of a raw request path, as the upstream will see it.
///
/// Percent-escapes are decoded once, empty and `.` segments are dropped and
/// `..` removes the previous segment (never climbing above the root). A
/// trailing slash survives. Encoded `/`, any backslash and undecodable input are
/// rejected rather than guessed at.
pub fn normalize_path(raw: &str) -> Result<String, PathError> {
    if !raw.starts_with('/') {
        return Err(PathError::Relative(raw.to_string()));
    }
    if raw.to_ascii_lowercase().contains("%2f") {
        return Err(PathError::EncodedSeparator(raw.to_string()));
    }
    let decoded =
        urlencoding::decode(raw).map_err(|_| PathError::InvalidEncoding(raw.to_string()))?;
    if decoded.contains('\\') {
        return Err(PathError::EncodedSeparator(raw.to_string()));
    }
    if decoded.chars().any(char::is_control) {
        return Err(PathError::InvalidEncoding(raw.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let mut normalized = String::with_capacity(decoded.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    let trailing = decoded.ends_with('/') || decoded.ends_with("/.") || decoded.ends_with("/..");
    if normalized.is_empty() || trailing {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Whether `prefix` covers `path` on a segment boundary.
///
/// `/v1` covers `/v1` and `/v1/users` but not `/v1beta`. A prefix of `/`
/// (or the empty string) covers every path.
pub fn is_path_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Rewrites `request_path` from the proxy's source prefix onto its target prefix.
///
/// When `source_prefix` does not cover `request_path` the input is returned
/// unchanged; callers needing strict matching check [`is_path_prefix`] first.
pub fn compute_target_path(source_prefix: &str, target_prefix: &str, request_path: &str) -> String {
    if !is_path_prefix(source_prefix, request_path) {
        return request_path.to_string();
    }

    let remainder = &request_path[source_prefix.trim_end_matches('/').len()..];
    let target = target_prefix.trim_end_matches('/');

    let mut rewritten = String::with_capacity(target.len() + remainder.len() + 1);
    if !target.is_empty() && !target.starts_with('/') {
        rewritten.push('/');
    }
    rewritten.push_str(target);
    rewritten.push_str(remainder);

    if rewritten.is_empty() {
        rewritten.push('/');
    } else if !rewritten.starts_with('/') {
        rewritten.insert(0, '/');
    }
    rewritten
}

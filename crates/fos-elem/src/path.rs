//! Path Utilities
//!
//! `/`-separated path arithmetic shared by the tree and the resolver.
//! Paths here are logical manifest paths, never file-system paths.

/// Collapse `.` and `..` segments and drop empty ones.
///
/// The result never carries a leading or trailing slash. A `..` that
/// would climb above the root is ignored.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for token in path.split('/') {
        match token {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(token),
        }
    }

    parts.join("/")
}

/// Resolve `reference` against the file path `base`.
///
/// Relative references are joined onto the directory that contains `base`.
/// A reference starting with `/` is already rooted and ignores `base`.
pub fn resolve(base: &str, reference: &str) -> String {
    if reference.starts_with('/') {
        return normalize(reference);
    }

    let dir = match base.rfind('/') {
        Some(idx) => &base[..idx],
        None => "",
    };

    normalize(&format!("{}/{}", dir, reference))
}

/// Case-insensitive lookup key for a path.
pub fn canonical(path: &str) -> String {
    normalize(path).to_lowercase()
}

/// Directory portion of `path`, including the trailing slash.
pub fn basedir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    }
}

/// Last non-empty segment of `path`.
pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("")
}

/// Lower-cased extension of the final segment, if any.
pub fn extension(path: &str) -> Option<String> {
    let name = last_segment(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Ensure a base path starts and ends with `/`.
pub fn rooted_dir(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

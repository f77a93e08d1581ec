//! Helpers for rendering deterministic `/`-separated relative paths.

/// Join relative path fragments with `/`, dropping empty and `.` components.
///
/// Backslashes are treated as separators so Windows-style fragments normalize
/// the same way.
pub fn join_relative(parts: &[&str]) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in parts {
        for component in part.split(['/', '\\']) {
            if component.is_empty() || component == "." {
                continue;
            }
            out.push(component);
        }
    }
    out.join("/")
}

/// True if `path` is relative and never climbs out of its base with `..`.
pub fn is_contained(path: &str) -> bool {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return false;
    }
    if trimmed.contains("://") || has_drive_prefix(trimmed) {
        return false;
    }
    !trimmed.split(['/', '\\']).any(|component| component == "..")
}

/// Last non-empty path segment of a URL (`https://host/repo/trunk/` -> `trunk`).
pub fn last_path_component(url: &str) -> String {
    let path = match url.find("://") {
        Some(idx) => {
            let rest = &url[idx + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        None => url,
    };
    path.split('/')
        .rev()
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

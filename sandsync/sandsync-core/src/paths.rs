//! Sandbox path normalization and classification.
//!
//! Sandbox paths are always forward-slash strings relative to the sandbox
//! root. They never start with `/` or `./` and never contain `.` or `..`
//! segments, so two spellings of the same file always map to the same cache key.

use crate::types::RouterType;

/// Normalize a path to its canonical sandbox form.
///
/// Leading slashes and `./` are dropped, empty and `.` segments removed and
/// `..` resolved against the preceding segment (never escaping the root).
/// The root itself normalizes to the empty string.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.trim().split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// Join a directory and an entry name, normalizing the result.
pub fn join_path(dir: &str, name: &str) -> String {
    normalize_path(&format!("{}/{}", dir, name))
}

/// Last segment of a path.
pub fn file_name(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Parent directory of a path; the root's children have `""` as parent.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Extension of the last segment, without the dot.
///
/// Dotfiles such as `.env` have no extension.
pub fn extension_of(path: &str) -> Option<&str> {
    let name = file_name(path)?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// File name without its extension.
pub fn file_stem(path: &str) -> Option<&str> {
    let name = file_name(path)?;
    match extension_of(path) {
        Some(ext) => Some(&name[..name.len() - ext.len() - 1]),
        None => Some(name),
    }
}

/// Whether the path's extension is one of `extensions` (leading dots ignored).
pub fn has_extension(path: &str, extensions: &[String]) -> bool {
    extension_of(path)
        .map(|ext| {
            extensions
                .iter()
                .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Whether the path is classified as binary (bytes are not mirrored eagerly).
pub fn is_binary_path(path: &str, binary_extensions: &[String]) -> bool {
    has_extension(path, binary_extensions)
}

/// Whether the path is a source type eligible for identifier injection.
pub fn is_instrumented_path(path: &str, instrumented_extensions: &[String]) -> bool {
    has_extension(path, instrumented_extensions)
}

/// Whether any segment of the path is an excluded directory name.
pub fn is_under_excluded(path: &str, excluded: &[String]) -> bool {
    normalize_path(path)
        .split('/')
        .any(|segment| excluded.iter().any(|name| name == segment))
}

/// Directories that may hold the root layout for a routing convention.
pub fn root_layout_dirs(router_type: RouterType) -> [&'static str; 2] {
    match router_type {
        RouterType::App => ["app", "src/app"],
        RouterType::Pages => ["pages", "src/pages"],
    }
}

/// Whether the path is the root layout file of the given routing convention.
///
/// Without a detected convention the app router layout is assumed. Only
/// source types in `instrumented_extensions` qualify.
pub fn is_root_layout_file(
    path: &str,
    router_type: Option<RouterType>,
    instrumented_extensions: &[String],
) -> bool {
    let router_type = router_type.unwrap_or(RouterType::App);
    let path = normalize_path(path);

    if !is_instrumented_path(&path, instrumented_extensions) {
        return false;
    }
    if file_stem(&path) != Some(router_type.layout_file_name()) {
        return false;
    }

    root_layout_dirs(router_type).contains(&parent_dir(&path))
}

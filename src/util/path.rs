//! Path-related
// (c) 2024 Ross Younger

use std::{
    borrow::Cow,
    path::{Component, Path, PathBuf},
};

use percent_encoding::percent_decode_str;

/// Reasons a URL path cannot be mapped onto the filesystem
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// `..` segments would leave the root
    #[error("path {0:?} escapes the root directory")]
    Traversal(String),
    /// A segment is not a plain file name on this platform
    #[error("path {0:?} contains an unusable segment")]
    InvalidSegment(String),
}

/// Maps a `/`-separated URL path onto a directory.
///
/// Each segment is percent-decoded on its own, so an encoded `/` cannot introduce a
/// separator while an encoded `..` still counts as one. The path is then normalised
/// lexically, without consulting the filesystem: empty and `.` segments are skipped and
/// `..` removes the previous segment. Any `..` that would climb above `root` is rejected,
/// as is any segment that is not UTF-8 once decoded or that the platform would not treat
/// as a single plain file name.
pub fn resolve_under(root: &Path, url_path: &str) -> Result<PathBuf, PathError> {
    let mut segments: Vec<Cow<'_, str>> = Vec::new();
    for raw in url_path.split('/') {
        let segment = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| PathError::InvalidSegment(url_path.to_string()))?;
        match segment.as_ref() {
            "" | "." => (),
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::Traversal(url_path.to_string()));
                }
            }
            name => {
                if !is_plain_name(name) {
                    return Err(PathError::InvalidSegment(url_path.to_string()));
                }
                segments.push(segment);
            }
        }
    }
    let mut resolved = root.to_path_buf();
    resolved.extend(segments.iter().map(AsRef::<str>::as_ref));
    Ok(resolved)
}

fn is_plain_name(segment: &str) -> bool {
    if segment.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

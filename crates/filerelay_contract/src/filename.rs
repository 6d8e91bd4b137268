use std::path::Path;

use url::Url;

pub const FALLBACK_FILENAME: &str = "file";

/// Derives a display name from a source URL. Never returns an empty string.
pub fn resolve_url_filename(raw: &str) -> String {
    let from_url = Url::parse(raw).ok().and_then(|url| {
        url.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_owned))
            .filter(|segment| !segment.is_empty())
    });

    from_url
        .or_else(|| last_raw_segment(raw))
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

/// Derives a display name for a direct upload: the declared name when the
/// caller sent one, otherwise the staged file's own name.
pub fn resolve_upload_filename(declared: Option<&str>, staged_path: &Path) -> String {
    declared
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .or_else(|| {
            staged_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .filter(|name| !name.is_empty())
        })
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

fn last_raw_segment(raw: &str) -> Option<String> {
    raw.rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
}

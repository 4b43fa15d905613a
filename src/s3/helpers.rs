use std::path::{Component, Path};

/// Detect Content-Type based on file extension
///
/// Returns the MIME type for common file formats. Falls back to
/// "application/octet-stream" for unknown types.
pub fn detect_content_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        // Web assets
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "text/javascript",
        Some("json") | Some("map") => "application/json",
        Some("wasm") => "application/wasm",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",

        // Image formats
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Video and audio
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",

        // Text formats
        Some("txt") | Some("log") => "text/plain",
        Some("csv") => "text/csv",
        Some("md") => "text/markdown",
        Some("yaml") | Some("yml") => "application/yaml",

        // Build artifacts and archives
        Some("pdf") => "application/pdf",
        Some("jar") | Some("war") => "application/java-archive",
        Some("zip") => "application/zip",
        Some("tar") => "application/x-tar",
        Some("gz") | Some("tgz") => "application/gzip",
        Some("pom") => "application/xml",

        _ => "application/octet-stream",
    }
    .to_string()
}

/// Join a key prefix and a relative local path into an S3 key
///
/// An empty prefix means the bucket root. Path components are joined with
/// `/` whatever the local separator is.
pub fn join_key(prefix: &str, relative: &Path) -> String {
    let rel = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    let prefix = prefix.trim_matches('/');
    match (prefix.is_empty(), rel.is_empty()) {
        (true, _) => rel,
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, rel),
    }
}

//! Extension to content-type lookup.

use std::path::Path;

/// Fallback for extensions the table does not know.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Maps a file extension (without the dot) to a content type.
pub trait MimeLookup: Send + Sync {
    /// Returns `None` for unknown extensions.
    fn lookup(&self, extension: &str) -> Option<&'static str>;

    /// Content type for a URL or filesystem path.
    ///
    /// A path without an extension is treated as `.html`, matching how
    /// extensionless routes are served in a single page app.
    fn content_type_for(&self, path: &str) -> &'static str {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("html");

        self.lookup(&extension.to_ascii_lowercase())
            .unwrap_or(OCTET_STREAM)
    }
}

/// Default lookup table for web assets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionTable;

impl MimeLookup for ExtensionTable {
    fn lookup(&self, extension: &str) -> Option<&'static str> {
        let content_type = match extension {
            "html" | "htm" => "text/html; charset=utf-8",
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => "application/javascript",
            "css" => "text/css",
            "json" | "map" => "application/json",
            "wasm" => "application/wasm",
            "txt" => "text/plain; charset=utf-8",
            "xml" => "application/xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "avif" => "image/avif",
            "ico" => "image/x-icon",
            "svg" => "image/svg+xml",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "otf" => "font/otf",
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            _ => return None,
        };
        Some(content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        let table = ExtensionTable;
        assert_eq!(table.content_type_for("/app.js"), "application/javascript");
        assert_eq!(table.content_type_for("/styles/main.css"), "text/css");
        assert_eq!(table.content_type_for("/logo.SVG"), "image/svg+xml");
    }

    #[test]
    fn test_unknown_extension_falls_back_to_octet_stream() {
        assert_eq!(ExtensionTable.content_type_for("/data.xyz"), OCTET_STREAM);
    }

    #[test]
    fn test_missing_extension_is_html() {
        assert_eq!(
            ExtensionTable.content_type_for("/dashboard/settings"),
            "text/html; charset=utf-8"
        );
        assert_eq!(ExtensionTable.content_type_for("/"), "text/html; charset=utf-8");
    }

    #[test]
    fn test_query_string_is_ignored() {
        assert_eq!(
            ExtensionTable.content_type_for("/bundle.js?v=3"),
            "application/javascript"
        );
    }
}

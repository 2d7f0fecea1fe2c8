//! URL to asset resolution.
//!
//! Unlike the proxy path, resolution buffers the whole asset so callers can
//! inspect its contents and the imports it references.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, uri::InvalidUri, Request, StatusCode, Uri},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::dev::mime::{ExtensionTable, MimeLookup};
use crate::dev::proxy::{error_chain, RequestProxy};
use crate::error::{ProxyError, ResolutionError};

/// `import x from "a"`, `export * from "a"`, `import "a"` and `import("a")`.
static JS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:import\s*\(\s*|import\s*|from\s*)["']([^"'\n]+)["']"#)
        .expect("valid JS import pattern")
});

/// `@import "a.css";` and `@import url(a.css);`
static CSS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"')\s;]+)"#).expect("valid CSS import pattern")
});

/// One resolved asset.
#[derive(Debug, Clone)]
pub struct UrlResolution {
    pub contents: Bytes,
    pub content_type: String,
    /// Specifiers referenced by the asset, in source order, without duplicates
    pub imports: Vec<String>,
    pub original_file_loc: PathBuf,
    generation: u64,
    changes: Arc<AtomicU64>,
}

impl UrlResolution {
    /// Build a resolution for `contents`, scanning its imports.
    ///
    /// Staleness is measured from the current value of `changes`.
    pub fn new(
        contents: Bytes,
        content_type: impl Into<String>,
        original_file_loc: PathBuf,
        changes: Arc<AtomicU64>,
    ) -> Self {
        let content_type = content_type.into();
        Self {
            imports: scan_imports(&contents, &content_type),
            generation: changes.load(Ordering::Acquire),
            contents,
            content_type,
            original_file_loc,
            changes,
        }
    }

    /// True once a change has been announced after this resolution was made.
    pub fn check_stale(&self) -> bool {
        self.changes.load(Ordering::Acquire) != self.generation
    }
}

/// Loads assets by URL.
#[async_trait]
pub trait UrlLoader: Send + Sync {
    async fn load_url(&self, url: &str) -> Result<UrlResolution, ResolutionError>;
}

/// Resolves URLs against the build server.
#[derive(Clone)]
pub struct UrlResolver {
    proxy: RequestProxy,
    root: PathBuf,
    changes: Arc<AtomicU64>,
    mime: Arc<dyn MimeLookup>,
}

impl UrlResolver {
    /// `changes` is the change generation shared with whoever announces
    /// file changes.
    pub fn new(proxy: RequestProxy, root: PathBuf, changes: Arc<AtomicU64>) -> Self {
        Self {
            proxy,
            root,
            changes,
            mime: Arc::new(ExtensionTable),
        }
    }

    pub fn with_mime(mut self, mime: Arc<dyn MimeLookup>) -> Self {
        self.mime = mime;
        self
    }

    async fn fetch(&self, url: &str) -> Result<UrlResolution, ResolutionError> {
        // Read the generation first so a change racing the fetch marks it stale.
        let generation = self.changes.load(Ordering::Acquire);

        let uri: Uri = url.parse().map_err(|e: InvalidUri| ProxyError::InvalidUri {
            uri: url.to_string(),
            message: e.to_string(),
        })?;
        let upstream_url = self.proxy.upstream_url(&uri);
        let request = Request::get(upstream_url.as_str())
            .body(Body::empty())
            .map_err(|e| ProxyError::Request(e.to_string()))?;

        let response = self
            .proxy
            .client()
            .request(request)
            .await
            .map_err(|e| ProxyError::Upstream {
                url: upstream_url.clone(),
                message: error_chain(&e),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ResolutionError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ResolutionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let path = url_path(url);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| self.mime.content_type_for(path).to_string());

        let contents = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ResolutionError::Body {
                url: url.to_string(),
                message: e.to_string(),
            })?
            .to_bytes();

        let imports = scan_imports(&contents, &content_type);
        debug!(url, imports = imports.len(), "resolved");

        Ok(UrlResolution {
            contents,
            content_type,
            imports,
            original_file_loc: self.root.join(path.trim_start_matches('/')),
            generation,
            changes: self.changes.clone(),
        })
    }
}

#[async_trait]
impl UrlLoader for UrlResolver {
    async fn load_url(&self, url: &str) -> Result<UrlResolution, ResolutionError> {
        if url.is_empty() {
            return Err(ResolutionError::InvalidSpecifier(url.to_string()));
        }
        self.fetch(url).await
    }
}

/// Path component of a root-relative or absolute URL.
fn url_path(url: &str) -> &str {
    let without_origin = match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
        }
        None => url,
    };
    without_origin
        .split(['?', '#'])
        .next()
        .unwrap_or(without_origin)
}

/// Import specifiers referenced by a JS or CSS asset.
pub fn scan_imports(contents: &[u8], content_type: &str) -> Vec<String> {
    let pattern = if content_type.contains("javascript") {
        &*JS_IMPORT
    } else if content_type.contains("css") {
        &*CSS_IMPORT
    } else {
        return Vec::new();
    };

    let source = String::from_utf8_lossy(contents);
    let mut seen = HashSet::new();
    pattern
        .captures_iter(&source)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|spec| seen.insert(spec.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_js_imports_in_source_order() {
        let source = br#"
import React from "react";
import { render } from 'react-dom';
import "./styles.css";
export { helper } from "./helper.js";
const lazy = () => import("./lazy.js");
import React2 from "react";
"#;
        let imports = scan_imports(source, "application/javascript");
        assert_eq!(
            imports,
            vec!["react", "react-dom", "./styles.css", "./helper.js", "./lazy.js"]
        );
    }

    #[test]
    fn test_scan_css_imports() {
        let source = br#"
@import "reset.css";
@import url(theme.css);
@import url("fonts.css") screen;
body { color: red; }
"#;
        assert_eq!(
            scan_imports(source, "text/css"),
            vec!["reset.css", "theme.css", "fonts.css"]
        );
    }

    #[test]
    fn test_other_content_types_have_no_imports() {
        assert!(scan_imports(b"import x from 'y'", "text/html").is_empty());
    }

    #[test]
    fn test_url_path_strips_origin_and_query() {
        assert_eq!(url_path("/src/app.js?v=1"), "/src/app.js");
        assert_eq!(url_path("http://localhost:8080/index.html#top"), "/index.html");
        assert_eq!(url_path("http://localhost:8080"), "/");
    }

    #[test]
    fn test_check_stale_tracks_generation() {
        let changes = Arc::new(AtomicU64::new(3));
        let resolution = UrlResolution::new(
            Bytes::from_static(b"@import 'reset.css';"),
            "text/css",
            PathBuf::from("/srv/app/main.css"),
            changes.clone(),
        );

        assert_eq!(resolution.imports, vec!["reset.css"]);
        assert!(!resolution.check_stale());
        changes.fetch_add(1, Ordering::AcqRel);
        assert!(resolution.check_stale());
    }
}

//! Runtime module loader with invalidation.
//!
//! Modules are fetched from the build server through a [`UrlLoader`] and
//! cached per URL. Invalidation always records a stale flag; whether a stale
//! module is refetched automatically depends on
//! [`RuntimeOptions::invalidate_on_change`].

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::dev::notifier::{ChangeNotifier, Subscription};
use crate::dev::resolve::UrlLoader;
use crate::error::ResolutionError;

/// Options for [`ServerRuntime`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Refetch stale modules on the next import and mark every cached
    /// module stale whenever a file change is announced
    pub invalidate_on_change: bool,
}

/// A built module and its style artifacts.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub url: String,
    /// Built module output
    pub exports: Bytes,
    pub content_type: String,
    /// URLs of stylesheets emitted alongside the module
    pub css: Vec<String>,
}

struct CacheEntry {
    module: Arc<LoadedModule>,
    stale: bool,
}

type ModuleCache = RwLock<HashMap<String, CacheEntry>>;

/// Loads built modules on demand.
///
/// Clones share the same cache.
#[derive(Clone)]
pub struct ServerRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    loader: Arc<dyn UrlLoader>,
    options: RuntimeOptions,
    modules: Arc<ModuleCache>,
    subscription: Option<Subscription>,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        if let Some(subscription) = &self.subscription {
            subscription.unsubscribe();
        }
    }
}

impl ServerRuntime {
    pub fn new(
        loader: Arc<dyn UrlLoader>,
        options: RuntimeOptions,
        notifier: &ChangeNotifier,
    ) -> Self {
        let modules: Arc<ModuleCache> = Arc::default();

        let subscription = options.invalidate_on_change.then(|| {
            let modules: Weak<ModuleCache> = Arc::downgrade(&modules);
            // Bundled output can include any file, so every change stales everything.
            notifier.subscribe(move |event| {
                if let Some(modules) = modules.upgrade() {
                    let mut modules = modules.write();
                    for entry in modules.values_mut() {
                        entry.stale = true;
                    }
                    debug!(
                        "{} changed, {} module(s) marked stale",
                        event.file_path.display(),
                        modules.len()
                    );
                }
                Ok(())
            })
        });

        Self {
            inner: Arc::new(RuntimeInner {
                loader,
                options,
                modules,
                subscription,
            }),
        }
    }

    pub fn options(&self) -> RuntimeOptions {
        self.inner.options
    }

    /// Load a module, reusing the cached copy unless it is stale and the
    /// runtime reloads on change.
    pub async fn import_module(&self, url: &str) -> Result<Arc<LoadedModule>, ResolutionError> {
        let cached = self.inner.modules.read().get(url).and_then(|entry| {
            let refetch = entry.stale && self.inner.options.invalidate_on_change;
            (!refetch).then(|| entry.module.clone())
        });

        match cached {
            Some(module) => Ok(module),
            None => self.load(url).await,
        }
    }

    /// Fetch a fresh copy regardless of the invalidation policy.
    pub async fn reload_module(&self, url: &str) -> Result<Arc<LoadedModule>, ResolutionError> {
        self.load(url).await
    }

    /// Record that `url` is stale.
    ///
    /// Returns `false` if the module was never loaded.
    pub fn invalidate_module(&self, url: &str) -> bool {
        match self.inner.modules.write().get_mut(url) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    pub fn is_stale(&self, url: &str) -> bool {
        self.inner
            .modules
            .read()
            .get(url)
            .is_some_and(|entry| entry.stale)
    }

    pub fn loaded_count(&self) -> usize {
        self.inner.modules.read().len()
    }

    async fn load(&self, url: &str) -> Result<Arc<LoadedModule>, ResolutionError> {
        let resolution = self.inner.loader.load_url(url).await?;
        // A change announced while the fetch was in flight never saw this entry.
        let stale = resolution.check_stale();

        let mut css = Vec::new();
        if let Some(sheet) = sibling_stylesheet(url) {
            match self.inner.loader.load_url(&sheet).await {
                Ok(_) => css.push(sheet),
                Err(ResolutionError::NotFound { .. }) => {}
                Err(err) => debug!("skipping stylesheet for {}: {}", url, err),
            }
        }

        let module = Arc::new(LoadedModule {
            url: url.to_string(),
            exports: resolution.contents,
            content_type: resolution.content_type,
            css,
        });

        self.inner.modules.write().insert(
            url.to_string(),
            CacheEntry {
                module: module.clone(),
                stale,
            },
        );
        Ok(module)
    }
}

/// `.css` output the bundler emits next to a JS entry.
fn sibling_stylesheet(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let stem = path
        .strip_suffix(".js")
        .or_else(|| path.strip_suffix(".mjs"))?;
    Some(format!("{}.css", stem))
}

//! Asynchronous icon loading with bounded admission.
//!
//! Icons referenced by layer styles are fetched through an [`ImageSource`],
//! decoded to RGBA and cached by URL. At most `max_in_flight` fetches run at
//! once; waiters are admitted in arrival order.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::RgbaImage;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;

use crate::error::LoadError;

// ── Sources ───────────────────────────────────────────────────────────────────

/// Where icon bytes come from.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<RgbaImage, LoadError>> + Send;
}

/// Reads icons from disk, resolving URLs against `root`.
#[derive(Debug, Clone)]
pub struct FileImageSource {
    root: PathBuf,
}

impl FileImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageSource for FileImageSource {
    async fn fetch(&self, url: &str) -> Result<RgbaImage, LoadError> {
        let path = self.root.join(url);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| LoadError::Io { url: url.to_owned(), source })?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|source| LoadError::Decode { url: url.to_owned(), source })?;
        Ok(decoded.to_rgba8())
    }
}

// ── Loader ────────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Fetches allowed to run concurrently. Zero is treated as one.
    pub max_in_flight: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { max_in_flight: 1 }
    }
}

/// URL-keyed icon cache in front of an [`ImageSource`].
pub struct ImageLoader<S> {
    source: S,
    admission: Semaphore,
    cache: RwLock<HashMap<String, Arc<RgbaImage>>>,
    in_flight: AtomicUsize,
}

impl<S: ImageSource> ImageLoader<S> {
    pub fn new(source: S, config: LoaderConfig) -> Self {
        Self {
            source,
            admission: Semaphore::new(config.max_in_flight.max(1)),
            cache: RwLock::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Cached image for `url`, if it was loaded before.
    pub async fn cached(&self, url: &str) -> Option<Arc<RgbaImage>> {
        self.cache.read().await.get(url).cloned()
    }

    /// Fetches currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stops admitting fetches. Pending and later loads of uncached URLs
    /// fail with [`LoadError::Closed`].
    pub fn close(&self) {
        self.admission.close();
    }

    /// Loads `url`, waiting for a free slot when the loader is saturated.
    pub async fn load(&self, url: &str) -> Result<Arc<RgbaImage>, LoadError> {
        if let Some(image) = self.cached(url).await {
            return Ok(image);
        }

        let _permit = self.admission.acquire().await.map_err(|_| LoadError::Closed)?;
        // Another waiter may have fetched it while this one queued.
        if let Some(image) = self.cached(url).await {
            return Ok(image);
        }

        let fetched = {
            let _running = InFlight::enter(&self.in_flight);
            self.source.fetch(url).await
        };

        let image = Arc::new(fetched?);
        log::debug!("icon loaded: {url} ({}x{})", image.width(), image.height());
        self.cache.write().await.insert(url.to_owned(), Arc::clone(&image));
        Ok(image)
    }
}

/// Counts one running fetch until dropped, including when the `load`
/// future is cancelled mid-fetch.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<S: ImageSource + 'static> ImageLoader<S> {
    /// Loads every URL concurrently, subject to admission.
    ///
    /// The result is in `urls` order; failed loads are logged and yield
    /// `None`.
    pub async fn load_all<I>(self: &Arc<Self>, urls: I) -> Vec<Option<Arc<RgbaImage>>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut tasks = JoinSet::new();
        let mut count = 0;
        for (index, url) in urls.into_iter().enumerate() {
            let url: String = url.into();
            let loader = Arc::clone(self);
            tasks.spawn(async move {
                let result = loader.load(&url).await;
                (index, url, result)
            });
            count += 1;
        }

        let mut images = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(image))) => images[index] = Some(image),
                Ok((_, url, Err(err))) => log::warn!("icon '{url}' skipped: {err}"),
                Err(err) => log::error!("icon load task failed: {err}"),
            }
        }
        images
    }
}

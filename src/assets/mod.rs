//! Background loading of scene models and exhibit images.
//!
//! Every request runs on its own worker thread and reports back over a
//! channel drained by the frame loop. A newer request supersedes the one in
//! flight: the old job's cancel flag is raised and its result, should it
//! still arrive, is dropped unseen.

mod model;

pub use model::{load_model, model_from_slice, screen_slot_order};

use crate::config::is_remote;
use crate::scene::{ImageData, LoadedModel};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Upper bound on a single fetched asset.
const MAX_FETCH_BYTES: u64 = 512 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest silence tolerated between two reads of a response body.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("{url} is larger than the {limit} byte fetch limit")]
    TooLarge { url: String, limit: u64 },
    #[error("failed to parse glTF {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: gltf::Error,
    },
    #[error("failed to decode image {url}: {source}")]
    Image {
        url: String,
        #[source]
        source: image::ImageError,
    },
    #[error("{url} has no scene")]
    NoScene { url: String },
    #[error("missing position data for mesh '{mesh}' in {url}")]
    MissingPositions { url: String, mesh: String },
    #[error("load cancelled")]
    Cancelled,
    #[error("failed to spawn loader thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// Raised when a job has been superseded or its loader cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancelled; for `?` between job stages.
    pub fn check(&self) -> Result<(), AssetError> {
        if self.is_cancelled() {
            Err(AssetError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Where models and images come from.
pub trait AssetSource: Send + Sync {
    fn load_model(&self, url: &str, cancel: &CancelToken) -> Result<LoadedModel, AssetError>;

    fn load_image(&self, url: &str) -> Result<ImageData, AssetError>;
}

/// Local files and http(s) URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAssetSource;

impl AssetSource for DefaultAssetSource {
    fn load_model(&self, url: &str, cancel: &CancelToken) -> Result<LoadedModel, AssetError> {
        load_model(url, cancel)
    }

    fn load_image(&self, url: &str) -> Result<ImageData, AssetError> {
        let bytes = fetch_bytes(url)?;
        ImageData::decode(&bytes).map_err(|source| AssetError::Image {
            url: url.to_string(),
            source,
        })
    }
}

pub fn fetch_bytes(url: &str) -> Result<Vec<u8>, AssetError> {
    if !is_remote(url) {
        return std::fs::read(url).map_err(|source| AssetError::Read {
            path: url.to_string(),
            source,
        });
    }
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(READ_TIMEOUT)
        .build();
    let response = agent.get(url).call().map_err(|source| AssetError::Fetch {
        url: url.to_string(),
        source: Box::new(source),
    })?;
    let declared = response
        .header("Content-Length")
        .and_then(|len| len.trim().parse::<u64>().ok());
    if declared.is_some_and(|len| len > MAX_FETCH_BYTES) {
        return Err(AssetError::TooLarge {
            url: url.to_string(),
            limit: MAX_FETCH_BYTES,
        });
    }
    read_capped(response.into_reader(), MAX_FETCH_BYTES, url)
}

/// Reads the whole body, failing instead of truncating past `limit` bytes.
fn read_capped(reader: impl Read, limit: u64, url: &str) -> Result<Vec<u8>, AssetError> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|source| AssetError::Read {
            path: url.to_string(),
            source,
        })?;
    if bytes.len() as u64 > limit {
        return Err(AssetError::TooLarge {
            url: url.to_string(),
            limit,
        });
    }
    Ok(bytes)
}

/// Loads each image in order. A failing entry is logged and left `None` so
/// the list stays index-aligned with the screens.
pub fn load_images(
    source: &dyn AssetSource,
    urls: &[String],
    cancel: &CancelToken,
) -> Result<Vec<Option<ImageData>>, AssetError> {
    let mut images = Vec::with_capacity(urls.len());
    for url in urls {
        cancel.check()?;
        match source.load_image(url) {
            Ok(image) => images.push(Some(image)),
            Err(err) => {
                log::warn!("exhibit image {} skipped: {}", url, err);
                images.push(None);
            }
        }
    }
    Ok(images)
}

/// A finished job for the most recent request.
#[derive(Debug)]
pub struct LoadResult<T> {
    pub generation: u64,
    pub url: String,
    pub result: Result<T, AssetError>,
}

struct Finished<T> {
    generation: u64,
    url: String,
    result: Result<T, AssetError>,
}

/// Runs one background job at a time per kind of asset; only the latest
/// request's result is ever handed out.
pub struct AssetLoader<T> {
    label: &'static str,
    generation: u64,
    state: LoadState,
    in_flight: Option<CancelToken>,
    sender: Sender<Finished<T>>,
    receiver: Receiver<Finished<T>>,
}

impl<T: Send + 'static> AssetLoader<T> {
    pub fn new(label: &'static str) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            label,
            generation: 0,
            state: LoadState::Idle,
            in_flight: None,
            sender,
            receiver,
        }
    }

    /// Starts `job` for `url`, superseding any request still in flight.
    /// Returns the request's generation.
    pub fn load<F>(&mut self, url: impl Into<String>, job: F) -> u64
    where
        F: FnOnce(&str, &CancelToken) -> Result<T, AssetError> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let url = url.into();
        let token = CancelToken::new();
        let sender = self.sender.clone();

        let worker_url = url.clone();
        let worker_token = token.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-loader-{}", self.label, generation))
            .spawn(move || {
                let result = job(&worker_url, &worker_token);
                // The loader may be gone already.
                let _ = sender.send(Finished {
                    generation,
                    url: worker_url,
                    result,
                });
            });

        self.state = LoadState::Loading;
        self.in_flight = Some(token);
        if let Err(err) = spawned {
            let _ = self.sender.send(Finished {
                generation,
                url: url.clone(),
                result: Err(AssetError::Spawn(err)),
            });
        }
        log::debug!("{} load #{} started: {}", self.label, generation, url);
        generation
    }

    /// Returns the result of the current request once it has finished.
    /// Results of superseded or cancelled requests are dropped here.
    pub fn poll(&mut self) -> Option<LoadResult<T>> {
        loop {
            let finished = match self.receiver.try_recv() {
                Ok(finished) => finished,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            };
            if finished.generation != self.generation || self.in_flight.is_none() {
                log::debug!(
                    "{} load #{} superseded, dropping result for {}",
                    self.label,
                    finished.generation,
                    finished.url
                );
                continue;
            }
            self.in_flight = None;
            self.state = if finished.result.is_ok() {
                LoadState::Loaded
            } else {
                LoadState::Failed
            };
            return Some(LoadResult {
                generation: finished.generation,
                url: finished.url,
                result: finished.result,
            });
        }
    }

    /// Abandons the request in flight, if any.
    pub fn cancel(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
            log::debug!("{} load #{} cancelled", self.label, self.generation);
        }
        if self.state == LoadState::Loading {
            self.state = LoadState::Idle;
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }
}

impl<T> Drop for AssetLoader<T> {
    fn drop(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }
}

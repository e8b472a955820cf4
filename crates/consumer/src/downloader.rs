//! Offline consumer: on top of the resolved URLs a streaming consumer
//! would produce, downloads every resource to disk under a deterministic
//! filename so a batch project writer (e.g. the script-writer consumer)
//! can reference local paths instead of remote URLs.

use crate::label::emotion_label;
use crate::resolver::{audio_tag_for_event, resolve_event, Resolved};
use np_domain::error::{Error, Result};
use np_domain::models::{NarrativeEvent, ResourceResult};
use np_domain::stream::BoxStream;
use np_tracker::ResourceTracker;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::warn;

const CHANNEL_CAPACITY: usize = 1000;

/// `<project>/audio/*` and `<project>/images/*`.
pub struct ProjectLayout {
    pub audio_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref();
        Self {
            audio_dir: root.join("audio"),
            images_dir: root.join("images"),
        }
    }
}

pub struct OfflineConsumer {
    tracker: Arc<ResourceTracker>,
    wait_timeout: Duration,
    layout: ProjectLayout,
    http: reqwest::Client,
    semaphore: Arc<Semaphore>,
    /// Emotions a dialogue event has actually used, per portrait key —
    /// only labels referenced by at least one already-seen dialogue are
    /// downloaded.
    used_emotions: Mutex<HashMap<String, HashSet<String>>>,
    /// Entry key (or `"<key>#<label>"` for a portrait emotion) -> local
    /// path. Doubles as the dedup guard against re-downloading.
    downloaded: Mutex<HashMap<String, PathBuf>>,
    downloads: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl OfflineConsumer {
    pub fn new(
        tracker: Arc<ResourceTracker>,
        wait_timeout: Duration,
        layout: ProjectLayout,
        download_concurrency: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            tracker,
            wait_timeout,
            layout,
            http: reqwest::Client::new(),
            semaphore: Arc::new(Semaphore::new(download_concurrency.max(1))),
            used_emotions: Mutex::new(HashMap::new()),
            downloaded: Mutex::new(HashMap::new()),
            downloads: Mutex::new(Vec::new()),
        })
    }

    /// As `StreamingConsumer::run`, but also schedules a background
    /// download per resolved resource. Returns events with URL fields
    /// filled exactly as the streaming consumer does; call
    /// `wait_all_downloads` after the stream ends for the local paths.
    pub fn run(self: Arc<Self>, events: BoxStream<'static, Result<NarrativeEvent>>) -> BoxStream<'static, Result<NarrativeEvent>> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut events = events;
            while let Some(item) = events.next().await {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                match item {
                    Ok(event) => {
                        let (resolved_event, resources) = resolve_event(&self.tracker, self.wait_timeout, event).await;
                        self.clone().schedule_downloads(&resolved_event, resources).await;
                        yield Ok(resolved_event);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };
        Box::pin(stream)
    }

    async fn schedule_downloads(self: Arc<Self>, event: &NarrativeEvent, resources: Vec<(String, Resolved)>) {
        if let NarrativeEvent::Dialogue { emotion, image_key: Some(key), .. } = event {
            self.used_emotions
                .lock()
                .await
                .entry(key.clone())
                .or_default()
                .insert(emotion_label(emotion));
        }

        for (key, resolved) in resources {
            let Some(result) = resolved.result else { continue };
            match result {
                ResourceResult::Audio { .. } => {
                    let Some(url) = resolved.url else { continue };
                    let tag = audio_tag_for_event(event, &key).unwrap_or('a');
                    let filename = format!("{tag}{}.{}", short_hash(&url), ext_of(&url, "mp3"));
                    self.clone().spawn_download(key, url, self.layout.audio_dir.join(filename)).await;
                }
                ResourceResult::Image { .. } => {
                    let Some(url) = resolved.url else { continue };
                    let filename = image_filename(&key, None, &url);
                    self.clone().spawn_download(key, url, self.layout.images_dir.join(filename)).await;
                }
                ResourceResult::Portrait { url_map, .. } => {
                    let used = self.used_emotions.lock().await.get(&key).cloned().unwrap_or_default();
                    for (label, url) in url_map {
                        if !used.is_empty() && !used.contains(&label) {
                            continue;
                        }
                        let entry_key = format!("{key}#{label}");
                        let filename = image_filename(&key, Some(&label), &url);
                        self.clone().spawn_download(entry_key, url, self.layout.images_dir.join(filename)).await;
                    }
                }
            }
        }
    }

    async fn spawn_download(self: Arc<Self>, key: String, url: String, dest: PathBuf) {
        if self.downloaded.lock().await.contains_key(&key) {
            return;
        }
        let worker = self.clone();
        let handle = tokio::spawn(async move {
            if tokio::fs::metadata(&dest).await.is_ok() {
                worker.downloaded.lock().await.insert(key, dest);
                return;
            }

            let _permit = worker.semaphore.acquire().await;
            if let Some(dir) = dest.parent() {
                if let Err(e) = tokio::fs::create_dir_all(dir).await {
                    warn!(%key, error = %e, "failed to create download directory");
                    return;
                }
            }

            let result = if let Some(data) = url.strip_prefix("data:") {
                write_data_uri(data, &dest).await
            } else {
                fetch_to_file(&worker.http, &url, &dest).await
            };

            match result {
                Ok(()) => {
                    worker.downloaded.lock().await.insert(key, dest);
                }
                Err(e) => warn!(%key, %url, error = %e, "download failed, continuing"),
            }
        });
        self.downloads.lock().await.push(handle);
    }

    /// Block until every scheduled download settles and return the final
    /// `key -> local path` map (portrait entries keyed `"<key>#<label>"`).
    pub async fn wait_all_downloads(&self) -> HashMap<String, PathBuf> {
        let handles: Vec<_> = self.downloads.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.downloaded.lock().await.clone()
    }
}

async fn fetch_to_file(http: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let response = http.get(url).send().await.map_err(|e| Error::Http(e.to_string()))?;
    let bytes = response.bytes().await.map_err(|e| Error::Http(e.to_string()))?;
    tokio::fs::write(dest, &bytes).await?;
    Ok(())
}

async fn write_data_uri(data: &str, dest: &Path) -> Result<()> {
    use base64::Engine;
    let (_meta, payload) = data.split_once(',').ok_or_else(|| Error::Other("malformed data: URI".into()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::Other(format!("invalid base64 data: URI: {e}")))?;
    tokio::fs::write(dest, &bytes).await?;
    Ok(())
}

fn image_filename(key: &str, attribute: Option<&str>, url: &str) -> String {
    let ext = ext_of(url, "bin");
    match attribute {
        Some(attr) => format!("{key} {attr}.{ext}"),
        None => format!("{key}.{ext}"),
    }
}

fn ext_of(url: &str, default: &str) -> String {
    let candidate = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .rsplit('.')
        .next();
    match candidate {
        Some(ext) if ext.len() <= 5 && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext.to_lowercase()
        }
        _ => default.to_string(),
    }
}

/// Base-36 encoding of an md5 digest's first 6 hex characters. Pure
/// function of the URL, so the same URL always produces the same
/// filename stem.
pub fn short_hash(url: &str) -> String {
    use md5::{Digest, Md5};
    let digest = Md5::digest(url.as_bytes());
    let hex = hex::encode(digest);
    let n = u32::from_str_radix(&hex[..6], 16).unwrap_or(0);
    to_base36(n)
}

fn to_base36(mut n: u32) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 alphabet is ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_is_deterministic() {
        assert_eq!(short_hash("https://x/a.mp3"), short_hash("https://x/a.mp3"));
    }

    #[test]
    fn short_hash_differs_for_different_urls() {
        assert_ne!(short_hash("https://x/a.mp3"), short_hash("https://x/b.mp3"));
    }

    #[test]
    fn base36_round_trips_small_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn image_filename_with_and_without_attribute() {
        assert_eq!(image_filename("bg_bgab", None, "https://x/y.png"), "bg_bgab.png");
        assert_eq!(image_filename("portrait_alice01", Some("happy"), "https://x/y.jpeg"), "portrait_alice01 happy.jpeg");
    }

    #[test]
    fn ext_of_falls_back_to_default_for_unrecognizable_suffix() {
        assert_eq!(ext_of("https://x/y", "bin"), "bin");
        assert_eq!(ext_of("https://x/y.png?foo=bar", "bin"), "png");
    }
}

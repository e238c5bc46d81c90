use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::downloader::query::{build_search_query, safe_download_filename};
use crate::downloader::tools::{Retriever, Tagger};
use crate::downloader::{DownloadOptions, DownloadResult};
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::spotify::models::Track;

/// Attempts per track before a download is recorded as failed.
const DOWNLOAD_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Worker-pool download engine. Tracks run concurrently up to `max_workers`;
/// each worker retrieves, verifies the file landed on disk, then tags it.
pub struct DownloadEngine<R: Retriever, T: Tagger> {
    retriever: Arc<R>,
    tagger: Arc<T>,
    options: DownloadOptions,
}

impl<R, T> DownloadEngine<R, T>
where
    R: Retriever + Send + Sync + 'static,
    T: Tagger + Send + Sync + 'static,
{
    pub fn new(retriever: R, tagger: T, options: DownloadOptions) -> Self {
        Self {
            retriever: Arc::new(retriever),
            tagger: Arc::new(tagger),
            options,
        }
    }

    /// Download every track into `downloads_dir`. Failures are collected,
    /// never fatal. A results JSON is written next to the audio files.
    pub async fn download_all(
        &self,
        tracks: &[Track],
        downloads_dir: &Path,
    ) -> Result<Vec<DownloadResult>> {
        tokio::fs::create_dir_all(downloads_dir).await?;

        let semaphore = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let progress = ProgressBar::new(tracks.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut handles = Vec::with_capacity(tracks.len());
        for track in tracks.iter().cloned() {
            let permit = Arc::clone(&semaphore).acquire_owned().await.map_err(|e| {
                crate::error::AppError::Api(format!("worker pool closed: {}", e))
            })?;
            let retriever = Arc::clone(&self.retriever);
            let tagger = Arc::clone(&self.tagger);
            let options = self.options.clone();
            let dir = downloads_dir.to_path_buf();
            let progress = progress.clone();

            handles.push(tokio::spawn(async move {
                let result =
                    download_one(retriever.as_ref(), tagger.as_ref(), &options, &track, &dir)
                        .await;
                progress.set_message(track.name.clone());
                progress.inc(1);
                drop(permit);
                result
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "download worker panicked"),
            }
        }
        progress.finish_and_clear();

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            succeeded = succeeded,
            total = results.len(),
            "download run finished"
        );

        let report = serde_json::to_string_pretty(&results)?;
        tokio::fs::write(downloads_dir.join("download_results.json"), report).await?;

        Ok(results)
    }
}

async fn download_one<R: Retriever, T: Tagger>(
    retriever: &R,
    tagger: &T,
    options: &DownloadOptions,
    track: &Track,
    downloads_dir: &Path,
) -> DownloadResult {
    let query = build_search_query(track);
    let stem = safe_download_filename(&query);
    let target = downloads_dir.join(format!("{}.{}", stem, options.format.extension()));

    if options.skip_existing && target.exists() {
        info!(file = %target.display(), "already downloaded, skipping");
        return DownloadResult::success(track, target, query);
    }

    let template = downloads_dir.join(format!("{}.%(ext)s", stem));
    let policy = RetryPolicy::new(DOWNLOAD_ATTEMPTS, RETRY_DELAY);
    let attempt = policy
        .run(|_| async {
            retriever
                .retrieve(&query, &template, options.format)
                .await?;
            // A clean exit without a file on disk still counts as a failure:
            // yt-dlp skips results over the size cap with status 0.
            match find_downloaded_file(downloads_dir, &stem, options).await {
                Some(path) => Ok(path),
                None => Err(crate::error::AppError::Api(format!(
                    "no file produced for query: {}",
                    query
                ))),
            }
        })
        .await;

    match attempt {
        Ok(path) => {
            if let Err(e) = tagger.tag(&path, track).await {
                warn!(file = %path.display(), error = %e, "tagging failed, keeping untagged file");
            }
            DownloadResult::success(track, path, query)
        }
        Err(e) => DownloadResult::failure(track, e.to_string(), query),
    }
}

/// Locate the file the retriever produced. The expected extension is checked
/// first, then any file with exactly this stem in case the tool picked
/// another container. A bare prefix match is not enough: `Song.mp3` must not
/// satisfy a lookup for `Song` when only `Song (Live).mp3` exists, and vice
/// versa, so the stem has to end right at the extension dot.
async fn find_downloaded_file(
    dir: &Path,
    stem: &str,
    options: &DownloadOptions,
) -> Option<PathBuf> {
    let expected = dir.join(format!("{}.{}", stem, options.format.extension()));
    if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
        return Some(expected);
    }

    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(rest) = name.strip_prefix(stem) else {
            continue;
        };
        if rest.starts_with('.') && !rest.ends_with(".json") && !rest.ends_with(".part") {
            return Some(entry.path());
        }
    }
    None
}

use std::path::PathBuf;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::cache::{CacheEntry, PlaylistRef, RefFiles, ResultCache};
use crate::error::Result;
use crate::extractor::output::{
    check_directory_writable, normalize_output_dir, safe_filename, save_track_analytics,
    save_track_links, save_track_list, PlaylistPaths,
};
use crate::extractor::summary::BatchResult;
use crate::gems::report::{write_combined_analysis, write_gems_report};
use crate::gems::GemParams;
use crate::retry::RetryPolicy;
use crate::spotify::models::{PlaylistMetadata, Track};
use crate::spotify::Catalog;
use crate::validator::parse_reference;

/// Per-playlist output behavior.
#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    pub output_dir: PathBuf,
    /// Append the owner name to folder and file stems.
    pub include_artist: bool,
    pub create_subfolders: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("spotify_playlists"),
            include_artist: false,
            create_subfolders: true,
        }
    }
}

/// Everything a batch run needs, passed explicitly so two runs with
/// different settings never share state.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub skip_existing: bool,
    pub retry_failed: bool,
    pub retry_limit: u32,
    pub combined_analysis: bool,
    pub hidden_gems: bool,
    pub gems: GemParams,
    pub processing: ProcessingOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            skip_existing: true,
            retry_failed: true,
            retry_limit: 2,
            combined_analysis: false,
            hidden_gems: true,
            gems: GemParams::default(),
            processing: ProcessingOptions::default(),
        }
    }
}

/// Drives a whole batch: validation, fetch, persistence, reports. One
/// failing playlist never aborts the rest of the batch.
pub struct BatchExtractor<C: Catalog> {
    catalog: C,
    cache: ResultCache,
    options: BatchOptions,
}

impl<C: Catalog> BatchExtractor<C> {
    pub fn new(catalog: C, options: BatchOptions) -> Self {
        let cache = ResultCache::new(options.processing.output_dir.clone());
        Self {
            catalog,
            cache,
            options,
        }
    }

    pub async fn process_batch(&self, references: &[String]) -> Result<BatchResult> {
        let output_dir = normalize_output_dir(&self.options.processing.output_dir)?;
        check_directory_writable(&output_dir)?;

        let mut result = BatchResult {
            total: references.len(),
            ..BatchResult::default()
        };

        let progress = ProgressBar::new(references.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut combined: Vec<(PlaylistMetadata, Vec<Track>)> = Vec::new();

        for reference in references {
            progress.set_message(reference.clone());
            match self.process_one(reference, &output_dir).await {
                Ok(Outcome::Processed { entry, urls_file }) => {
                    result.processed += 1;
                    if let Some(file) = urls_file {
                        result.urls_files.push(file);
                    }
                    if self.options.combined_analysis {
                        combined.push((entry.metadata, entry.tracks));
                    }
                }
                Ok(Outcome::Skipped { entry }) => {
                    result.skipped += 1;
                    if self.options.combined_analysis {
                        combined.push((entry.metadata, entry.tracks));
                    }
                }
                Err(e) => {
                    warn!(reference = %reference, error = %e, "playlist failed");
                    result.failed.push((reference.clone(), e.to_string()));
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        if self.options.retry_failed && !result.failed.is_empty() {
            self.retry_failures(&mut result, &mut combined, &output_dir)
                .await;
        }

        if self.options.combined_analysis && !combined.is_empty() {
            let path = self.write_combined(&output_dir, &combined)?;
            info!(path = %path.display(), "combined analysis written");
        }

        Ok(result)
    }

    async fn retry_failures(
        &self,
        result: &mut BatchResult,
        combined: &mut Vec<(PlaylistMetadata, Vec<Track>)>,
        output_dir: &std::path::Path,
    ) {
        let failures = std::mem::take(&mut result.failed);
        info!(count = failures.len(), "retrying failed playlists");
        let policy = RetryPolicy::immediate(self.options.retry_limit.max(1));

        for (reference, _) in failures {
            let attempt = policy
                .run(|_| self.process_one(&reference, output_dir))
                .await;
            match attempt {
                Ok(Outcome::Processed { entry, urls_file }) => {
                    result.processed += 1;
                    if let Some(file) = urls_file {
                        result.urls_files.push(file);
                    }
                    if self.options.combined_analysis {
                        combined.push((entry.metadata, entry.tracks));
                    }
                }
                Ok(Outcome::Skipped { entry }) => {
                    result.skipped += 1;
                    if self.options.combined_analysis {
                        combined.push((entry.metadata, entry.tracks));
                    }
                }
                Err(e) => result.failed.push((reference, e.to_string())),
            }
        }
    }

    async fn process_one(
        &self,
        reference: &str,
        output_dir: &std::path::Path,
    ) -> Result<Outcome> {
        let playlist_id = parse_reference(reference)?;

        if self.options.skip_existing {
            if let Some(entry) = self.cache.get(&playlist_id) {
                info!(playlist = %playlist_id, "already cached, skipping");
                return Ok(Outcome::Skipped { entry });
            }
        }

        let metadata = self.catalog.fetch_metadata(&playlist_id).await?;
        let tracks = self.catalog.fetch_tracks(&playlist_id).await?;
        info!(
            playlist = %metadata.name,
            tracks = tracks.len(),
            "fetched playlist"
        );

        let owner = self
            .options
            .processing
            .include_artist
            .then_some(metadata.owner.as_str());
        let safe_name = safe_filename(&metadata.name, owner);
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let paths = PlaylistPaths::prepare(
            output_dir,
            &safe_name,
            &timestamp,
            self.options.processing.create_subfolders,
        )?;

        save_track_list(&paths.tracks_txt, &metadata, &tracks)?;
        save_track_links(&paths.links_txt, &tracks)?;
        save_track_analytics(&paths.analytics_txt, &metadata, &tracks)?;

        // Combined mode supersedes the per-playlist gems report and renders
        // one analysis over the union instead.
        let urls_file = if self.options.hidden_gems && !self.options.combined_analysis {
            write_gems_report(
                &paths.gems_txt,
                &paths.gem_urls_txt,
                &tracks,
                &self.options.gems,
                Some(&metadata.name),
            )?;
            Some(paths.gem_urls_txt.clone())
        } else {
            None
        };

        let entry = CacheEntry {
            playlist_id: playlist_id.as_str().to_string(),
            metadata,
            tracks,
            processed_at: timestamp.clone(),
        };
        let reference_doc = PlaylistRef {
            id: entry.playlist_id.clone(),
            name: entry.metadata.name.clone(),
            owner: entry.metadata.owner.clone(),
            folder: paths.folder_name,
            processed_at: timestamp,
            files: RefFiles {
                json: paths.entry_json.clone(),
                tracks: paths.tracks_txt.clone(),
                links: paths.links_txt.clone(),
                analytics: paths.analytics_txt.clone(),
                downloads_dir: paths.downloads_dir.clone(),
            },
        };
        self.cache.put(&entry, &reference_doc)?;

        Ok(Outcome::Processed { entry, urls_file })
    }

    fn write_combined(
        &self,
        output_dir: &std::path::Path,
        combined: &[(PlaylistMetadata, Vec<Track>)],
    ) -> Result<PathBuf> {
        let playlists: Vec<PlaylistMetadata> =
            combined.iter().map(|(m, _)| m.clone()).collect();
        let all_tracks: Vec<Track> = combined
            .iter()
            .flat_map(|(_, tracks)| tracks.iter().cloned())
            .collect();

        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let path = output_dir.join(format!("combined_analysis_{}.txt", timestamp));
        write_combined_analysis(&path, &playlists, &all_tracks)?;
        Ok(path)
    }
}

enum Outcome {
    Processed {
        entry: CacheEntry,
        urls_file: Option<PathBuf>,
    },
    Skipped {
        entry: CacheEntry,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::validator::PlaylistId;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockCatalog {
        playlists: HashMap<String, (PlaylistMetadata, Vec<Track>)>,
        fetches: AtomicUsize,
    }

    impl MockCatalog {
        fn new(playlists: Vec<(&str, PlaylistMetadata, Vec<Track>)>) -> Self {
            Self {
                playlists: playlists
                    .into_iter()
                    .map(|(id, m, t)| (id.to_string(), (m, t)))
                    .collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl Catalog for MockCatalog {
        async fn fetch_metadata(&self, playlist_id: &PlaylistId) -> Result<PlaylistMetadata> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.playlists
                .get(playlist_id.as_str())
                .map(|(m, _)| m.clone())
                .ok_or_else(|| AppError::NotFound(playlist_id.as_str().to_string()))
        }

        async fn fetch_tracks(&self, playlist_id: &PlaylistId) -> Result<Vec<Track>> {
            self.playlists
                .get(playlist_id.as_str())
                .map(|(_, t)| t.clone())
                .ok_or_else(|| AppError::NotFound(playlist_id.as_str().to_string()))
        }
    }

    fn options_for(dir: &std::path::Path) -> BatchOptions {
        BatchOptions {
            retry_failed: false,
            processing: ProcessingOptions {
                output_dir: dir.to_path_buf(),
                ..ProcessingOptions::default()
            },
            ..BatchOptions::default()
        }
    }

    fn reference(id: &str) -> String {
        format!("https://open.spotify.com/playlist/{}", id)
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MockCatalog::new(vec![
            (
                "goodplaylist1",
                PlaylistMetadata::mock("First"),
                vec![Track::mock("One", "A", 10)],
            ),
            (
                "goodplaylist2",
                PlaylistMetadata::mock("Second"),
                vec![Track::mock("Two", "B", 20)],
            ),
        ]);
        let extractor = BatchExtractor::new(catalog, options_for(dir.path()));

        let refs = vec![
            reference("goodplaylist1"),
            "https://example.com/not-spotify".to_string(),
            reference("goodplaylist2"),
        ];
        let result = extractor.process_batch(&refs).await.unwrap();

        assert_eq!(result.processed, 2);
        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].0.contains("example.com"));
        assert!(dir.path().join("First").is_dir());
        assert!(dir.path().join("Second").is_dir());
    }

    #[tokio::test]
    async fn test_skip_existing_on_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = (
            "goodplaylist1",
            PlaylistMetadata::mock("First"),
            vec![Track::mock("One", "A", 10)],
        );

        let refs = vec![reference("goodplaylist1")];

        let extractor = BatchExtractor::new(
            MockCatalog::new(vec![playlist.clone()]),
            options_for(dir.path()),
        );
        let first = extractor.process_batch(&refs).await.unwrap();
        assert_eq!(first.processed, 1);
        assert_eq!(first.skipped, 0);

        let catalog = MockCatalog::new(vec![playlist]);
        let extractor = BatchExtractor::new(catalog, options_for(dir.path()));
        let second = extractor.process_batch(&refs).await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(extractor.catalog.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_pass_recovers_transient_failure() {
        struct FlakyCatalog {
            inner: MockCatalog,
            failures_left: AtomicUsize,
        }

        impl Catalog for FlakyCatalog {
            async fn fetch_metadata(
                &self,
                playlist_id: &PlaylistId,
            ) -> Result<PlaylistMetadata> {
                if self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(AppError::Api("transient".to_string()));
                }
                self.inner.fetch_metadata(playlist_id).await
            }

            async fn fetch_tracks(&self, playlist_id: &PlaylistId) -> Result<Vec<Track>> {
                self.inner.fetch_tracks(playlist_id).await
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let catalog = FlakyCatalog {
            inner: MockCatalog::new(vec![(
                "goodplaylist1",
                PlaylistMetadata::mock("First"),
                vec![Track::mock("One", "A", 10)],
            )]),
            failures_left: AtomicUsize::new(1),
        };
        let mut options = options_for(dir.path());
        options.retry_failed = true;
        options.retry_limit = 2;
        let extractor = BatchExtractor::new(catalog, options);

        let result = extractor
            .process_batch(&[reference("goodplaylist1")])
            .await
            .unwrap();
        assert_eq!(result.processed, 1);
        assert!(result.failed.is_empty());
    }

    #[tokio::test]
    async fn test_combined_analysis_written_over_union() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MockCatalog::new(vec![
            (
                "goodplaylist1",
                PlaylistMetadata::mock("First"),
                vec![Track::mock("One", "A", 10)],
            ),
            (
                "goodplaylist2",
                PlaylistMetadata::mock("Second"),
                vec![Track::mock("Two", "B", 20)],
            ),
        ]);
        let mut options = options_for(dir.path());
        options.combined_analysis = true;
        let extractor = BatchExtractor::new(catalog, options);

        let result = extractor
            .process_batch(&[reference("goodplaylist1"), reference("goodplaylist2")])
            .await
            .unwrap();
        assert_eq!(result.processed, 2);
        // Combined mode suppresses per-playlist gem URL files.
        assert!(result.urls_files.is_empty());

        let combined: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("combined_analysis_")
            })
            .collect();
        assert_eq!(combined.len(), 1);
        let body = std::fs::read_to_string(combined[0].path()).unwrap();
        assert!(body.contains("Total Playlists Analyzed: 2"));
        assert!(body.contains("Total Tracks: 2"));
    }
}

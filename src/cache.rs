use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::spotify::models::{PlaylistMetadata, Track};
use crate::validator::PlaylistId;

/// Depth bound for the fallback scan when no reference document matches.
const FALLBACK_SCAN_DEPTH: usize = 2;

/// Cache of record for one processed playlist. Never mutated in place;
/// reprocessing replaces the whole entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub playlist_id: String,
    pub metadata: PlaylistMetadata,
    pub tracks: Vec<Track>,
    pub processed_at: String,
}

/// Small reference document written beside the output root, mapping a
/// playlist id to its file locations so lookups avoid rescanning the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub folder: String,
    pub processed_at: String,
    pub files: RefFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefFiles {
    pub json: PathBuf,
    pub tracks: PathBuf,
    pub links: PathBuf,
    pub analytics: PathBuf,
    pub downloads_dir: PathBuf,
}

/// Per-playlist fetch results persisted under one output root. Single-writer:
/// one batch run at a time against a given root.
pub struct ResultCache {
    root: PathBuf,
}

impl ResultCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn has(&self, playlist_id: &PlaylistId) -> bool {
        self.find_entry_path(playlist_id).is_some()
    }

    pub fn get(&self, playlist_id: &PlaylistId) -> Option<CacheEntry> {
        let path = self.find_entry_path(playlist_id)?;
        match read_entry(&path) {
            Some(entry) => Some(entry),
            None => {
                warn!("Unreadable cache entry at {}", path.display());
                None
            }
        }
    }

    /// Last-write-wins: the entry document and its reference are replaced
    /// wholesale, never merged with a stale entry.
    pub fn put(&self, entry: &CacheEntry, reference: &PlaylistRef) -> Result<()> {
        let json = serde_json::to_string_pretty(entry)?;
        fs::write(&reference.files.json, json)?;

        let ref_path = self.ref_path(&reference.folder);
        let ref_json = serde_json::to_string_pretty(reference)?;
        fs::write(&ref_path, ref_json)?;

        debug!(
            "Cached playlist {} at {}",
            entry.playlist_id,
            reference.files.json.display()
        );
        Ok(())
    }

    pub fn ref_path(&self, folder: &str) -> PathBuf {
        self.root.join(format!("{}_ref.json", folder))
    }

    /// Look up the reference document for a playlist, if one was written.
    pub fn get_ref(&self, playlist_id: &PlaylistId) -> Option<PlaylistRef> {
        let entries = fs::read_dir(&self.root).ok()?;
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| is_ref_file(p))
            .filter_map(|p| read_ref(&p))
            .find(|r| r.id == playlist_id.as_str())
    }

    /// Reference-index lookup first; on a miss, a bounded walk of the output
    /// tree that matches by the playlist id embedded in each entry.
    fn find_entry_path(&self, playlist_id: &PlaylistId) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.root).ok()?;

        for dir_entry in entries.flatten() {
            let path = dir_entry.path();
            if !is_ref_file(&path) {
                continue;
            }
            let Some(reference) = read_ref(&path) else {
                continue;
            };
            if reference.id == playlist_id.as_str() && reference.files.json.exists() {
                return Some(reference.files.json);
            }
        }

        self.scan_for_entry(playlist_id)
    }

    fn scan_for_entry(&self, playlist_id: &PlaylistId) -> Option<PathBuf> {
        debug!(
            "Reference index miss for {}, scanning output tree",
            playlist_id
        );

        for dir_entry in WalkDir::new(&self.root)
            .max_depth(FALLBACK_SCAN_DEPTH)
            .into_iter()
            .flatten()
        {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") || is_ref_file(path) {
                continue;
            }
            if let Some(entry) = read_entry(path) {
                if entry.playlist_id == playlist_id.as_str() {
                    return Some(path.to_path_buf());
                }
            }
        }

        None
    }
}

fn is_ref_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with("_ref.json"))
}

fn read_ref(path: &Path) -> Option<PlaylistRef> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::parse_reference;

    fn sample_entry(playlist_id: &str) -> CacheEntry {
        CacheEntry {
            playlist_id: playlist_id.to_string(),
            metadata: PlaylistMetadata::mock("Test Playlist"),
            tracks: vec![
                Track::mock("First Song", "Artist A", 15),
                Track::mock("Second Song", "Artist B", 55),
            ],
            processed_at: "20240101_120000".to_string(),
        }
    }

    fn sample_ref(root: &Path, playlist_id: &str) -> PlaylistRef {
        let folder = root.join("Test_Playlist");
        fs::create_dir_all(&folder).unwrap();
        PlaylistRef {
            id: playlist_id.to_string(),
            name: "Test Playlist".to_string(),
            owner: "Mock Owner".to_string(),
            folder: "Test_Playlist".to_string(),
            processed_at: "20240101_120000".to_string(),
            files: RefFiles {
                json: folder.join("Test_Playlist_20240101_120000.json"),
                tracks: folder.join("Test_Playlist_tracks.txt"),
                links: folder.join("Test_Playlist_links.txt"),
                analytics: folder.join("Test_Playlist_analytics.txt"),
                downloads_dir: folder.join("Downloads"),
            },
        }
    }

    #[test]
    fn test_round_trip_preserves_tracks_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let playlist_id = parse_reference("spotify:playlist:4nqA2nDxvZhg2fY9svrL9R").unwrap();

        let entry = sample_entry(playlist_id.as_str());
        let reference = sample_ref(dir.path(), playlist_id.as_str());
        cache.put(&entry, &reference).unwrap();

        assert!(cache.has(&playlist_id));
        let loaded = cache.get(&playlist_id).unwrap();
        assert_eq!(loaded.tracks.len(), entry.tracks.len());
        let loaded_ids: Vec<&str> = loaded.tracks.iter().map(|t| t.id.as_str()).collect();
        let stored_ids: Vec<&str> = entry.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(loaded_ids, stored_ids);
    }

    #[test]
    fn test_miss_for_unknown_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let playlist_id = parse_reference("spotify:playlist:4nqA2nDxvZhg2fY9svrL9R").unwrap();

        assert!(!cache.has(&playlist_id));
        assert!(cache.get(&playlist_id).is_none());
    }

    #[test]
    fn test_fallback_scan_when_reference_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let playlist_id = parse_reference("spotify:playlist:4nqA2nDxvZhg2fY9svrL9R").unwrap();

        let entry = sample_entry(playlist_id.as_str());
        let reference = sample_ref(dir.path(), playlist_id.as_str());
        cache.put(&entry, &reference).unwrap();

        // Losing the reference document must not lose the entry.
        fs::remove_file(cache.ref_path(&reference.folder)).unwrap();
        assert!(cache.has(&playlist_id));
        assert_eq!(
            cache.get(&playlist_id).unwrap().playlist_id,
            playlist_id.as_str()
        );
    }

    #[test]
    fn test_put_replaces_entry_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let playlist_id = parse_reference("spotify:playlist:4nqA2nDxvZhg2fY9svrL9R").unwrap();

        let entry = sample_entry(playlist_id.as_str());
        let reference = sample_ref(dir.path(), playlist_id.as_str());
        cache.put(&entry, &reference).unwrap();

        let mut fresh = sample_entry(playlist_id.as_str());
        fresh.tracks = vec![Track::mock("Only Song", "Artist C", 5)];
        cache.put(&fresh, &reference).unwrap();

        let loaded = cache.get(&playlist_id).unwrap();
        assert_eq!(loaded.tracks.len(), 1);
        assert_eq!(loaded.tracks[0].name, "Only Song");
    }
}

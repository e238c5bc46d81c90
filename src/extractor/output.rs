use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::spotify::models::{PlaylistMetadata, Track};

/// Conservative cap that stays well under platform path limits once the
/// per-playlist files are appended.
const MAX_OUTPUT_PATH_LEN: usize = 200;

/// Reduce a playlist name (optionally with its owner) to a filesystem-safe
/// stem: word characters, spaces and hyphens survive, spaces become
/// underscores.
pub fn safe_filename(name: &str, owner: Option<&str>) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == ' ' || *c == '-')
            .collect::<String>()
            .trim()
            .replace(' ', "_")
    };

    let mut stem = sanitize(name);
    if stem.is_empty() {
        stem = "playlist".to_string();
    }
    if let Some(owner) = owner {
        let owner = sanitize(owner);
        if !owner.is_empty() {
            let _ = write!(stem, "_by_{}", owner);
        }
    }
    stem
}

/// Normalize an output directory to an absolute path and reject paths that
/// would leave no room for the files written beneath them.
pub fn normalize_output_dir(dir: &Path) -> Result<PathBuf> {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };
    if absolute.as_os_str().len() > MAX_OUTPUT_PATH_LEN {
        return Err(AppError::Path(format!(
            "output directory path is too long ({} characters): {}",
            absolute.as_os_str().len(),
            absolute.display()
        )));
    }
    Ok(absolute)
}

/// Probe that the directory exists and accepts writes before a batch starts.
pub fn check_directory_writable(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(".write_test");
    fs::write(&probe, b"")
        .map_err(|e| AppError::Permission(format!("cannot write to {}: {}", dir.display(), e)))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

/// Resolved destinations for every artifact of one processed playlist.
#[derive(Debug, Clone)]
pub struct PlaylistPaths {
    pub folder: PathBuf,
    pub folder_name: String,
    pub entry_json: PathBuf,
    pub tracks_txt: PathBuf,
    pub links_txt: PathBuf,
    pub analytics_txt: PathBuf,
    pub gems_txt: PathBuf,
    pub gem_urls_txt: PathBuf,
    pub downloads_dir: PathBuf,
}

impl PlaylistPaths {
    /// Lay out the per-playlist folder. When subfolder creation fails the
    /// playlist falls back to writing directly in the output root.
    pub fn prepare(
        output_dir: &Path,
        safe_name: &str,
        timestamp: &str,
        create_subfolder: bool,
    ) -> Result<Self> {
        let folder = if create_subfolder {
            let candidate = output_dir.join(safe_name);
            match fs::create_dir_all(&candidate) {
                Ok(()) => candidate,
                Err(e) => {
                    warn!(
                        folder = %candidate.display(),
                        error = %e,
                        "could not create playlist subfolder, writing to output root"
                    );
                    output_dir.to_path_buf()
                }
            }
        } else {
            output_dir.to_path_buf()
        };

        let stem = format!("{}_{}", safe_name, timestamp);
        let downloads_dir = folder.join("Downloads");
        fs::create_dir_all(&downloads_dir)?;

        Ok(Self {
            entry_json: folder.join(format!("{}.json", stem)),
            tracks_txt: folder.join(format!("{}_tracks.txt", stem)),
            links_txt: folder.join(format!("{}_links.txt", stem)),
            analytics_txt: folder.join(format!("{}_analytics.txt", stem)),
            gems_txt: folder.join(format!("{}_hidden_gems.txt", stem)),
            gem_urls_txt: folder.join(format!("{}_gem_urls.txt", stem)),
            folder,
            folder_name: safe_name.to_string(),
            downloads_dir,
        })
    }
}

/// Human-readable track listing, one numbered line per track.
pub fn save_track_list(path: &Path, metadata: &PlaylistMetadata, tracks: &[Track]) -> Result<()> {
    let mut out = String::new();
    let _ = writeln!(out, "Playlist: {}", metadata.name);
    let _ = writeln!(out, "Owner: {}", metadata.owner);
    let _ = writeln!(out, "Tracks: {}\n", tracks.len());
    for (i, track) in tracks.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} - {} ({})",
            i + 1,
            track.artist_names(),
            track.name,
            track.duration_display()
        );
    }
    fs::write(path, out)?;
    Ok(())
}

/// Bare share URLs, whitespace separated, for piping into other tools.
pub fn save_track_links(path: &Path, tracks: &[Track]) -> Result<()> {
    let mut out = tracks
        .iter()
        .map(|t| t.url.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

/// Per-playlist analytics: aggregates, popularity-sorted listing, low and
/// rising popularity shortlists, and a release-year timeline.
pub fn save_track_analytics(
    path: &Path,
    metadata: &PlaylistMetadata,
    tracks: &[Track],
) -> Result<()> {
    let mut out = String::new();

    let _ = writeln!(out, "Playlist Analytics: {}", metadata.name);
    out.push_str(&"=".repeat("Playlist Analytics: ".len() + metadata.name.chars().count()));
    out.push_str("\n\n");

    let total_ms: u64 = tracks.iter().map(|t| t.duration_ms).sum();
    let avg_popularity = if tracks.is_empty() {
        0.0
    } else {
        tracks.iter().map(|t| t.popularity as f64).sum::<f64>() / tracks.len() as f64
    };
    let explicit = tracks.iter().filter(|t| t.explicit).count();

    let _ = writeln!(out, "Total Tracks: {}", tracks.len());
    let _ = writeln!(
        out,
        "Total Duration: {:.1} hours",
        total_ms as f64 / 3_600_000.0
    );
    let _ = writeln!(out, "Average Popularity: {:.1}/100", avg_popularity);
    let _ = writeln!(out, "Explicit Tracks: {}\n", explicit);

    let mut by_popularity: Vec<&Track> = tracks.iter().collect();
    by_popularity.sort_by_key(|t| t.popularity);

    out.push_str("Tracks by Popularity (ascending):\n");
    out.push_str("-------------------------------\n");
    for track in &by_popularity {
        let _ = writeln!(
            out,
            "[{:>3}/100] {} by {}",
            track.popularity,
            track.name,
            track.artist_names()
        );
    }

    out.push_str("\nUnderground Picks (Popularity <= 20):\n");
    out.push_str("-----------------------------------\n");
    for track in by_popularity.iter().filter(|t| t.popularity <= 20) {
        let _ = writeln!(
            out,
            "[{:>3}] {} by {}",
            track.popularity,
            track.name,
            track.artist_names()
        );
    }

    out.push_str("\nRising Picks (Popularity 21-40):\n");
    out.push_str("------------------------------\n");
    for track in by_popularity
        .iter()
        .filter(|t| t.popularity >= 21 && t.popularity <= 40)
    {
        let _ = writeln!(
            out,
            "[{:>3}] {} by {}",
            track.popularity,
            track.name,
            track.artist_names()
        );
    }

    out.push_str("\nRelease Year Timeline:\n");
    out.push_str("--------------------\n");
    for (year, count) in release_year_counts(tracks) {
        let _ = writeln!(out, "{}: {} tracks", year, count);
    }

    fs::write(path, out)?;
    Ok(())
}

/// Count tracks per release year, ascending. Release dates come in year,
/// year-month, or full-date precision.
fn release_year_counts(tracks: &[Track]) -> Vec<(i32, usize)> {
    let mut counts: Vec<(i32, usize)> = Vec::new();
    for track in tracks {
        let date = &track.album.release_date;
        let year = date
            .get(..4)
            .and_then(|y| y.parse::<i32>().ok())
            .filter(|_| {
                date.len() == 4
                    || NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
                    || date.len() == 7
            });
        let Some(year) = year else { continue };
        match counts.iter_mut().find(|(y, _)| *y == year) {
            Some((_, count)) => *count += 1,
            None => counts.push((year, 1)),
        }
    }
    counts.sort_by_key(|(year, _)| *year);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename_strips_and_replaces() {
        assert_eq!(safe_filename("Chill / Mix!", None), "Chill__Mix");
        assert_eq!(safe_filename("My Mix", Some("DJ Cool")), "My_Mix_by_DJ_Cool");
        assert_eq!(safe_filename("///", None), "playlist");
    }

    #[test]
    fn test_normalize_rejects_overlong_path() {
        let long = PathBuf::from(format!("/{}", "a".repeat(MAX_OUTPUT_PATH_LEN + 1)));
        assert!(matches!(
            normalize_output_dir(&long),
            Err(AppError::Path(_))
        ));
    }

    #[test]
    fn test_prepare_paths_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths =
            PlaylistPaths::prepare(dir.path(), "My_Mix", "20240101_120000", true).unwrap();

        assert_eq!(paths.folder, dir.path().join("My_Mix"));
        assert!(paths.downloads_dir.ends_with("My_Mix/Downloads"));
        assert!(paths.downloads_dir.is_dir());
        assert_eq!(
            paths.entry_json.file_name().unwrap(),
            "My_Mix_20240101_120000.json"
        );
        assert_eq!(
            paths.gems_txt.file_name().unwrap(),
            "My_Mix_20240101_120000_hidden_gems.txt"
        );
    }

    #[test]
    fn test_prepare_without_subfolder_uses_root() {
        let dir = tempfile::tempdir().unwrap();
        let paths =
            PlaylistPaths::prepare(dir.path(), "My_Mix", "20240101_120000", false).unwrap();
        assert_eq!(paths.folder, dir.path());
    }

    #[test]
    fn test_save_track_links_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.txt");
        let tracks = vec![Track::mock("One", "A", 10), Track::mock("Two", "B", 20)];
        save_track_links(&path, &tracks).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("id_one"));
    }

    #[test]
    fn test_release_year_counts_handles_partial_dates() {
        let mut a = Track::mock("A", "X", 10);
        a.album.release_date = "1999".to_string();
        let mut b = Track::mock("B", "X", 10);
        b.album.release_date = "1999-05".to_string();
        let mut c = Track::mock("C", "X", 10);
        c.album.release_date = "2004-02-14".to_string();
        let mut d = Track::mock("D", "X", 10);
        d.album.release_date = "unknown".to_string();

        let counts = release_year_counts(&[a, b, c, d]);
        assert_eq!(counts, vec![(1999, 2), (2004, 1)]);
    }

    #[test]
    fn test_analytics_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.txt");
        let metadata = PlaylistMetadata::mock("Mix");
        let tracks = vec![
            Track::mock("Quiet", "A", 10),
            Track::mock("Loud", "B", 90),
        ];
        save_track_analytics(&path, &metadata, &tracks).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("Total Tracks: 2"));
        assert!(body.contains("Average Popularity: 50.0/100"));
        assert!(body.contains("[ 10/100] Quiet by A"));
        assert!(body.contains("2021: 2 tracks"));
    }
}

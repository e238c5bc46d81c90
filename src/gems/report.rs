use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::gems::{rank, scorer::score_track, GemParams, ScoredTrack, Tier};
use crate::spotify::models::{PlaylistMetadata, Track};

/// Number of gems shown in the top listing of the report body.
const TOP_LIST_LEN: usize = 15;

/// Per-bracket listing cap.
const BRACKET_LIST_LEN: usize = 20;

/// Rank every track and keep the gem candidates, in ranking order.
fn ranked_candidates(tracks: &[Track], params: &GemParams) -> Vec<ScoredTrack> {
    let mut scored: Vec<ScoredTrack> = tracks
        .iter()
        .map(|t| score_track(t, params))
        .filter(|s| s.is_gem(params))
        .collect();
    rank(&mut scored);
    scored
}

/// URLs of the top `top_gems` candidates, for the playlist-creation file.
pub fn top_gem_urls(tracks: &[Track], params: &GemParams) -> Vec<String> {
    ranked_candidates(tracks, params)
        .into_iter()
        .take(params.top_gems)
        .map(|s| s.track.url)
        .collect()
}

/// Render the hidden-gems report body. Byte-reproducible for identical
/// inputs: no wall-clock content, timestamps live in the file names chosen
/// by the caller.
pub fn render_gems_report(
    tracks: &[Track],
    params: &GemParams,
    playlist_name: Option<&str>,
    urls_file: &Path,
) -> String {
    let gems = ranked_candidates(tracks, params);

    let total_analyzed = tracks.len();
    let gems_found = gems.len();
    let avg_score = if gems_found > 0 {
        gems.iter().map(|g| g.score).sum::<u32>() as f64 / gems_found as f64
    } else {
        0.0
    };
    let found_pct = if total_analyzed > 0 {
        gems_found as f64 / total_analyzed as f64 * 100.0
    } else {
        0.0
    };

    let by_tier = |tier: Tier| -> Vec<&ScoredTrack> {
        gems.iter().filter(|g| g.tier() == Some(tier)).collect()
    };
    let elite = by_tier(Tier::Elite);
    let quality = by_tier(Tier::Quality);
    let standard = by_tier(Tier::Standard);

    let mut out = String::new();

    out.push_str("💎 HIDDEN GEMS ANALYSIS 💎\n");
    out.push_str("==========================\n\n");

    if let Some(name) = playlist_name {
        let _ = writeln!(out, "Playlist: {}", name);
        out.push_str(&"-".repeat("Playlist: ".len() + name.chars().count()));
        out.push_str("\n\n");
    }

    out.push_str("📊 ANALYSIS STATISTICS\n");
    out.push_str("---------------------\n");
    let _ = writeln!(out, "Total Tracks Analyzed: {}", total_analyzed);
    let _ = writeln!(
        out,
        "Hidden Gems Found: {} ({:.1}% of tracks)",
        gems_found, found_pct
    );
    let _ = writeln!(out, "Average Gem Score: {:.1} / 50", avg_score);
    let _ = writeln!(out, "Elite Gems (40+ points): {}", elite.len());
    let _ = writeln!(out, "Quality Gems (30-39 points): {}", quality.len());
    let _ = writeln!(out, "Standard Gems (20-29 points): {}\n", standard.len());

    out.push_str("🏆 TOP HIDDEN GEMS\n");
    out.push_str("----------------\n");
    for (i, gem) in gems.iter().take(TOP_LIST_LEN).enumerate() {
        let track = &gem.track;
        let _ = writeln!(
            out,
            "{}. [{:>2}/50] {} by {}",
            i + 1,
            gem.score,
            track.name,
            track.artist_names()
        );
        let _ = writeln!(out, "   Popularity: {}/100", track.popularity);
        let _ = writeln!(
            out,
            "   Album: {} ({})",
            track.album.name, track.album.release_date
        );
        let _ = writeln!(out, "   Scoring: {} points", gem.score);
        for component in &gem.components {
            let _ = writeln!(out, "    - {}", component);
        }
        let _ = writeln!(out, "   URL: {}\n", track.url);
    }

    out.push_str("💎 GEMS BY SCORE CATEGORY\n");
    out.push_str("------------------------\n\n");
    write_tier_section(&mut out, "Elite Gems (40+ points):", &elite);
    write_tier_section(&mut out, "Quality Gems (30-39 points):", &quality);
    write_tier_section(&mut out, "Standard Gems (20-29 points):", &standard);

    out.push_str("💿 GEMS BY POPULARITY BRACKET\n");
    out.push_str("---------------------------\n\n");
    let bracket = |lo: u8, hi: u8| -> Vec<&ScoredTrack> {
        gems.iter()
            .filter(|g| g.track.popularity >= lo && g.track.popularity <= hi)
            .take(BRACKET_LIST_LEN)
            .collect()
    };
    write_tier_section(
        &mut out,
        "Ultra Underground (0-10 popularity):",
        &bracket(params.min_pop, 10),
    );
    write_tier_section(
        &mut out,
        "Deep Underground (11-20 popularity):",
        &bracket(11, 20),
    );
    write_tier_section(
        &mut out,
        "Rising Underground (21-40 popularity):",
        &bracket(21, params.max_pop),
    );

    out.push_str("🎧 PLAYLIST CREATION\n");
    out.push_str("------------------\n");
    let _ = writeln!(
        out,
        "A file with top {} gem URLs has been created at:",
        params.top_gems
    );
    let _ = writeln!(out, "{}\n", urls_file.display());
    out.push_str("You can either:\n");
    out.push_str("1. Copy these URLs manually to create a Hidden Gems playlist in Spotify\n");
    out.push_str(
        "2. Use the --create-playlist option to automatically create it (requires authorization)\n\n",
    );

    out.push_str("First 10 tracks for the playlist:\n");
    for (i, gem) in gems.iter().take(10).enumerate() {
        let _ = writeln!(
            out,
            "{}. {} by {}",
            i + 1,
            gem.track.name,
            gem.track.artist_names()
        );
    }

    out
}

fn write_tier_section(out: &mut String, heading: &str, gems: &[&ScoredTrack]) {
    out.push_str(heading);
    out.push('\n');
    if gems.is_empty() {
        out.push_str("None found\n");
    } else {
        for gem in gems {
            let _ = writeln!(
                out,
                "- [{:>2}/50] {} by {} (Pop: {})",
                gem.score,
                gem.track.name,
                gem.track.artist_names(),
                gem.track.popularity
            );
        }
    }
    out.push('\n');
}

/// Write the gems report and its companion top-URLs file.
pub fn write_gems_report(
    gems_path: &Path,
    urls_path: &Path,
    tracks: &[Track],
    params: &GemParams,
    playlist_name: Option<&str>,
) -> Result<()> {
    let urls = top_gem_urls(tracks, params);
    let urls_body = if urls.is_empty() {
        String::new()
    } else {
        urls.join("\n") + "\n"
    };
    fs::write(urls_path, urls_body)?;

    let body = render_gems_report(tracks, params, playlist_name, urls_path);
    fs::write(gems_path, body)?;
    Ok(())
}

/// Render the combined analysis over the union of tracks from every playlist
/// in a batch. Byte-reproducible for identical inputs.
pub fn render_combined_analysis(
    playlists: &[PlaylistMetadata],
    all_tracks: &[Track],
) -> String {
    let total_tracks = all_tracks.len();
    let mut out = String::new();

    out.push_str("Combined Playlist Analysis\n");
    out.push_str("=========================\n\n");

    out.push_str("Playlist Overview\n");
    out.push_str("----------------\n");
    let _ = writeln!(out, "Total Playlists Analyzed: {}", playlists.len());
    let _ = writeln!(out, "Total Tracks: {}\n", total_tracks);

    out.push_str("Included Playlists:\n");
    for playlist in playlists {
        let _ = writeln!(
            out,
            "- {} by {} ({} tracks)",
            playlist.name, playlist.owner, playlist.total_tracks
        );
    }
    out.push('\n');

    out.push_str("All Tracks Sorted by Popularity\n");
    out.push_str("-----------------------------\n");
    let mut sorted: Vec<&Track> = all_tracks.iter().collect();
    sorted.sort_by_key(|t| t.popularity);
    for track in &sorted {
        let _ = writeln!(
            out,
            "[{:>3}/100] {} by {}",
            track.popularity,
            track.name,
            track.artist_names()
        );
        let _ = writeln!(
            out,
            "         Added: {}",
            track.added_at.as_deref().unwrap_or("Unknown")
        );
        let _ = writeln!(
            out,
            "         Album: {} ({})",
            track.album.name, track.album.release_date
        );
        let _ = writeln!(out, "         URL: {}\n", track.url);
    }

    out.push_str("\nPopularity Distribution:\n");
    out.push_str("----------------------\n");
    for (label, count) in popularity_histogram(all_tracks) {
        let percentage = if total_tracks > 0 {
            count as f64 / total_tracks as f64 * 100.0
        } else {
            0.0
        };
        let bar = "█".repeat((percentage / 2.0) as usize);
        let _ = writeln!(
            out,
            "{:>7}: {} {:>4} tracks ({:>5.1}%)",
            label, bar, count, percentage
        );
    }

    out.push_str("\nPotential Hidden Gems (Popularity <= 30):\n");
    out.push_str("--------------------------------------\n");
    for track in sorted.iter().filter(|t| t.popularity <= 30) {
        let _ = writeln!(
            out,
            "[{:>3}] {} by {}",
            track.popularity,
            track.name,
            track.artist_names()
        );
        let _ = writeln!(
            out,
            "      Added: {}",
            track.added_at.as_deref().unwrap_or("Unknown")
        );
        let _ = writeln!(out, "      URL: {}\n", track.url);
    }

    let underground = underground_artists(all_tracks);
    if !underground.is_empty() {
        out.push_str("\nPromising Underground Artists:\n");
        out.push_str("---------------------------\n");
        for artist in &underground {
            let _ = writeln!(out, "\n{}", artist.name);
            let _ = writeln!(out, "Average Popularity: {:.1}", artist.avg_popularity);
            let _ = writeln!(out, "Tracks in Collection: {}", artist.tracks.len());
            out.push_str("Tracks:\n");
            for track in &artist.tracks {
                let _ = writeln!(out, "- [{:>3}] {}", track.popularity, track.name);
            }
        }
    }

    out
}

pub fn write_combined_analysis(
    path: &Path,
    playlists: &[PlaylistMetadata],
    all_tracks: &[Track],
) -> Result<()> {
    fs::write(path, render_combined_analysis(playlists, all_tracks))?;
    Ok(())
}

/// Fixed 10-point popularity buckets, in ascending order.
fn popularity_histogram(tracks: &[Track]) -> Vec<(&'static str, usize)> {
    const LABELS: [&str; 10] = [
        "0-10", "11-20", "21-30", "31-40", "41-50", "51-60", "61-70", "71-80", "81-90", "91-100",
    ];
    let mut counts = [0usize; 10];
    for track in tracks {
        let pop = track.popularity.min(100) as usize;
        let bucket = if pop <= 10 { 0 } else { (pop - 1) / 10 };
        counts[bucket] += 1;
    }
    LABELS.into_iter().zip(counts).collect()
}

struct UndergroundArtist<'a> {
    name: &'a str,
    avg_popularity: f64,
    tracks: Vec<&'a Track>,
}

/// An artist qualifies with average popularity <= 30 across their tracks in
/// the batch and at least 2 contributed tracks. Sorted by average popularity
/// ascending, then track count descending, then name for determinism.
fn underground_artists(all_tracks: &[Track]) -> Vec<UndergroundArtist<'_>> {
    let mut by_artist: HashMap<&str, (&str, Vec<&Track>)> = HashMap::new();
    for track in all_tracks {
        for artist in &track.artists {
            by_artist
                .entry(artist.id.as_str())
                .or_insert((artist.name.as_str(), Vec::new()))
                .1
                .push(track);
        }
    }

    let mut qualified: Vec<UndergroundArtist<'_>> = by_artist
        .into_values()
        .filter_map(|(name, mut tracks)| {
            if tracks.len() < 2 {
                return None;
            }
            let avg = tracks.iter().map(|t| t.popularity as f64).sum::<f64>()
                / tracks.len() as f64;
            if avg > 30.0 {
                return None;
            }
            tracks.sort_by_key(|t| t.popularity);
            Some(UndergroundArtist {
                name,
                avg_popularity: avg,
                tracks,
            })
        })
        .collect();

    qualified.sort_by(|a, b| {
        a.avg_popularity
            .partial_cmp(&b.avg_popularity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.tracks.len().cmp(&a.tracks.len()))
            .then(a.name.cmp(b.name))
    });
    qualified
}

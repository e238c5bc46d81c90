use crate::gems::{GemParams, ScoredTrack};
use crate::spotify::models::Track;

/// Score a track on the 0-50 hidden-gem scale. Pure and deterministic: the
/// same track and parameters always produce the same score and the same
/// component list, in the same order.
///
/// Bands are non-overlapping; at most one popularity contribution applies.
pub fn score(track: &Track, params: &GemParams) -> (u32, Vec<String>) {
    let mut score = 0u32;
    let mut components = Vec::new();

    // Base popularity (0-20 points)
    let pop = track.popularity;
    if pop >= params.min_pop && pop <= 20 {
        score += 20;
        components.push("Low popularity (0-20): +20 points".to_string());
    } else if (21..=params.max_pop).contains(&pop) {
        score += 15;
        components.push("Rising popularity (21-40): +15 points".to_string());
    }

    // Artist collaboration (0-10 points)
    if track.artists.len() >= 2 {
        score += 10;
        components.push(format!(
            "Artist collaboration ({} artists): +10 points",
            track.artists.len()
        ));
    }

    // Track duration (0-10 points)
    let duration_min = track.duration_ms as f64 / 60_000.0;
    if (5.0..=9.0).contains(&duration_min) {
        score += 10;
        components.push(format!(
            "Extended track length ({:.1} minutes): +10 points",
            duration_min
        ));
    }

    // Focus release (0-10 points)
    let album_type = track.album.album_type.to_lowercase();
    if (album_type == "single" || album_type == "ep")
        && (1..=4).contains(&track.album.total_tracks)
    {
        score += 10;
        components.push(format!(
            "Focus release ({}, {} tracks): +10 points",
            album_type.to_uppercase(),
            track.album.total_tracks
        ));
    }

    (score, components)
}

pub fn score_track(track: &Track, params: &GemParams) -> ScoredTrack {
    let (score, components) = score(track, params);
    ScoredTrack {
        track: track.clone(),
        score,
        components,
    }
}

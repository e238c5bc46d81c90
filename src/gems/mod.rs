pub mod report;
pub mod scorer;

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::spotify::models::Track;

/// Scoring window and report sizing, threaded explicitly from the CLI down
/// to the report generator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GemParams {
    /// Minimum popularity considered for gem candidacy.
    pub min_pop: u8,
    /// Maximum popularity considered for gem candidacy.
    pub max_pop: u8,
    /// Minimum gem score for a track to appear in the report.
    pub min_score: u32,
    /// Number of top gems written to the playlist-creation URLs file.
    pub top_gems: usize,
}

impl Default for GemParams {
    fn default() -> Self {
        Self {
            min_pop: 0,
            max_pop: 40,
            min_score: 20,
            top_gems: 30,
        }
    }
}

/// Score tier for reporting. Thresholds are fixed on the 0-50 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Elite,    // 40+
    Quality,  // 30-39
    Standard, // 20-29
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredTrack {
    pub track: Track,
    pub score: u32,
    pub components: Vec<String>,
}

impl ScoredTrack {
    /// A track is a gem candidate iff its popularity lies in the configured
    /// window and its score clears the threshold.
    pub fn is_gem(&self, params: &GemParams) -> bool {
        let pop = self.track.popularity;
        pop >= params.min_pop && pop <= params.max_pop && self.score >= params.min_score
    }

    pub fn tier(&self) -> Option<Tier> {
        match self.score {
            40.. => Some(Tier::Elite),
            30..=39 => Some(Tier::Quality),
            20..=29 => Some(Tier::Standard),
            _ => None,
        }
    }
}

/// Ranking order: score descending, then popularity ascending (prefer the
/// least popular among equal scores).
pub fn rank(scored: &mut [ScoredTrack]) {
    scored.sort_by_key(|s| (Reverse(s.score), s.track.popularity));
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorer::score_track;

    #[test]
    fn test_ranking_prefers_least_popular_on_ties() {
        let params = GemParams::default();
        let mut tracks = vec![
            Track::mock("Popular Low Score", "A", 35),
            Track::mock("Obscure", "B", 5),
            Track::mock("Less Obscure", "C", 12),
        ];
        // Same duration/album everywhere: scores differ only by popularity
        // band, so Obscure and Less Obscure tie at 20.
        tracks[0].popularity = 35;

        let mut scored: Vec<ScoredTrack> =
            tracks.iter().map(|t| score_track(t, &params)).collect();
        rank(&mut scored);

        assert_eq!(scored[0].track.name, "Obscure");
        assert_eq!(scored[1].track.name, "Less Obscure");
        assert_eq!(scored[2].track.name, "Popular Low Score");
    }

    #[test]
    fn test_tiers() {
        let params = GemParams::default();
        let mut track = Track::mock("T", "A", 10);
        track.artists.push(crate::spotify::models::Artist {
            name: "B".into(),
            id: "b".into(),
        });
        track.duration_ms = 360_000;
        track.album.album_type = "single".into();
        track.album.total_tracks = 2;

        let scored = score_track(&track, &params);
        assert_eq!(scored.score, 50);
        assert_eq!(scored.tier(), Some(Tier::Elite));

        let plain = score_track(&Track::mock("P", "A", 30), &params);
        assert_eq!(plain.score, 15);
        assert_eq!(plain.tier(), None);
    }

    #[test]
    fn test_gem_candidacy_requires_window_and_score() {
        let params = GemParams {
            min_pop: 0,
            max_pop: 40,
            min_score: 20,
            top_gems: 30,
        };

        let inside = score_track(&Track::mock("Inside", "A", 10), &params);
        assert!(inside.is_gem(&params));

        // Scores 0: outside every band, no other contribution.
        let outside = score_track(&Track::mock("Outside", "A", 55), &params);
        assert!(!outside.is_gem(&params));

        // In the window but below the score floor.
        let weak = score_track(&Track::mock("Weak", "A", 30), &params);
        assert_eq!(weak.score, 15);
        assert!(!weak.is_gem(&params));
    }
}

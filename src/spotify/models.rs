use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumRef {
    pub name: String,
    pub release_date: String,
    pub total_tracks: u32,
    pub album_type: String,
}

/// Immutable snapshot of one playlist entry. Ordering within a playlist is
/// by (disc_number, track_number), not API arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<Artist>,
    pub album: AlbumRef,
    pub duration_ms: u64,
    pub popularity: u8,
    pub explicit: bool,
    pub track_number: u32,
    pub disc_number: u32,
    pub added_at: Option<String>,
    pub url: String,
    pub preview_url: Option<String>,
}

impl Track {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn duration_display(&self) -> String {
        format_duration_ms(self.duration_ms)
    }
}

/// Convert a duration from milliseconds to m:ss format.
pub fn format_duration_ms(duration_ms: u64) -> String {
    let seconds = duration_ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistMetadata {
    pub name: String,
    pub description: String,
    pub owner: String,
    pub total_tracks: u32,
    pub followers: u64,
    pub public: bool,
}

#[cfg(test)]
impl Track {
    pub fn mock(name: &str, artist: &str, popularity: u8) -> Self {
        Self {
            id: format!("id_{}", name.to_lowercase().replace(' ', "_")),
            name: name.to_string(),
            artists: vec![Artist {
                name: artist.to_string(),
                id: format!("artist_{}", artist.to_lowercase().replace(' ', "_")),
            }],
            album: AlbumRef {
                name: "Mock Album".to_string(),
                release_date: "2021-06-01".to_string(),
                total_tracks: 12,
                album_type: "album".to_string(),
            },
            duration_ms: 180_000,
            popularity,
            explicit: false,
            track_number: 1,
            disc_number: 1,
            added_at: Some("2023-01-15T10:00:00Z".to_string()),
            url: format!(
                "https://open.spotify.com/track/id_{}?si=id_{}",
                name.to_lowercase().replace(' ', "_"),
                name.to_lowercase().replace(' ', "_")
            ),
            preview_url: None,
        }
    }
}

#[cfg(test)]
impl PlaylistMetadata {
    pub fn mock(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: "Mock playlist".to_string(),
            owner: "Mock Owner".to_string(),
            total_tracks: 2,
            followers: 10,
            public: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(0), "0:00");
        assert_eq!(format_duration_ms(59_000), "0:59");
        assert_eq!(format_duration_ms(330_000), "5:30");
        assert_eq!(format_duration_ms(3_601_000), "60:01");
    }

    #[test]
    fn test_artist_names_joined() {
        let mut track = Track::mock("Song", "First", 10);
        track.artists.push(Artist {
            name: "Second".to_string(),
            id: "artist_second".to_string(),
        });
        assert_eq!(track.artist_names(), "First, Second");
    }
}

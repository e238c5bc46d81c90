use url::Url;

use crate::error::{AppError, Result};

/// Prefix reserved for playlists published by Spotify itself. These need
/// regional fallbacks during fetch because their availability varies by
/// market.
const CURATED_PREFIX: &str = "37i9dQ";

const RECOGNIZED_HOSTS: [&str; 2] = ["open.spotify.com", "spotify.com"];

/// Canonical playlist identifier extracted from a user-supplied reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaylistId(String);

impl PlaylistId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id belongs to a Spotify-curated playlist (as opposed to
    /// a user playlist).
    pub fn is_curated(&self) -> bool {
        self.0.starts_with(CURATED_PREFIX)
    }
}

impl std::fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a playlist reference and extract the playlist id.
/// Supported forms:
/// - https://open.spotify.com/playlist/37i9dQZF1E8NC99vGqLsaH
/// - https://open.spotify.com/playlist/37i9dQZF1E8NC99vGqLsaH?si=...
/// - spotify:playlist:37i9dQZF1E8NC99vGqLsaH
pub fn parse_reference(reference: &str) -> Result<PlaylistId> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(AppError::Validation("Playlist URL cannot be empty".into()));
    }

    // Spotify URI form
    if let Some(id) = reference.strip_prefix("spotify:playlist:") {
        return extract_id(id);
    }

    let url = Url::parse(reference)
        .map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

    let host = url.host_str().unwrap_or_default();
    if !RECOGNIZED_HOSTS.contains(&host) {
        return Err(AppError::Validation(
            "Not a valid Spotify URL. URL must be from open.spotify.com or spotify.com".into(),
        ));
    }

    let mut segments = url
        .path_segments()
        .ok_or_else(|| AppError::Validation("Invalid Spotify URL".into()))?;

    // Expect a .../playlist/{id} pair anywhere in the path (embed URLs put
    // a locale segment first).
    while let Some(segment) = segments.next() {
        if segment == "playlist" {
            if let Some(id) = segments.next() {
                return extract_id(id);
            }
            break;
        }
    }

    Err(AppError::Validation(
        "Could not find playlist ID in URL. Make sure it's a valid Spotify playlist URL".into(),
    ))
}

fn extract_id(raw: &str) -> Result<PlaylistId> {
    let id: String = raw.chars().take_while(|c| c.is_ascii_alphanumeric()).collect();
    if id.is_empty() {
        return Err(AppError::Validation(
            "Could not find playlist ID in URL. Make sure it's a valid Spotify playlist URL".into(),
        ));
    }
    Ok(PlaylistId(id))
}

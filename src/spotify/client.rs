use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::spotify::models::{AlbumRef, Artist, PlaylistMetadata, Track};
use crate::validator::PlaylistId;

const ACCOUNTS_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

const PAGE_LIMIT: u32 = 100;

/// Refresh the token this many seconds before it actually expires.
const TOKEN_REFRESH_BUFFER_SECS: i64 = 240;

/// Consecutive 429 responses tolerated for a single request before giving up.
const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Markets tried in order for Spotify-curated playlists, which 404 in some
/// regions. User playlists use the default market only.
const REGION_FALLBACKS: [Option<&str>; 5] =
    [Some("US"), Some("GB"), Some("DE"), Some("FR"), None];

const METADATA_FIELDS: &str =
    "name,description,owner.display_name,tracks.total,followers.total,public";

const TRACK_FIELDS: &str = "items(added_at,track(id,name,external_urls.spotify,\
artists(name,id),album(name,release_date,total_tracks,album_type),duration_ms,\
preview_url,popularity,explicit,track_number,disc_number,is_local)),total";

/// Read access to the catalog service. The orchestrator and the download
/// pipeline depend on this seam rather than on the concrete HTTP client.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    async fn fetch_metadata(&self, playlist_id: &PlaylistId) -> Result<PlaylistMetadata>;
    async fn fetch_tracks(&self, playlist_id: &PlaylistId) -> Result<Vec<Track>>;
}

#[derive(Debug, Clone)]
struct TokenState {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Client-credentials client for public playlist reads. Does not require
/// user authorization - only app credentials.
pub struct CatalogClient {
    http: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<TokenState>>,
}

impl CatalogClient {
    pub async fn new(config: &Config) -> Result<Self> {
        if !config.validate_credentials() {
            return Err(AppError::Auth(
                "Missing Spotify credentials. Please set SPOTIFY_CLIENT_ID and \
                 SPOTIFY_CLIENT_SECRET"
                    .into(),
            ));
        }

        let client = Self {
            http: Client::new(),
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
            token: Mutex::new(None),
        };

        // Fail fast on rejected credentials.
        let state = client.request_token().await?;
        info!("Authenticated with Spotify using client credentials");
        *client.token.lock().await = Some(state);

        Ok(client)
    }

    async fn request_token(&self) -> Result<TokenState> {
        let response = self
            .http
            .post(ACCOUNTS_TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "Failed to authenticate with Spotify. Please check your credentials: {}",
                error_text
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("Failed to parse token response: {}", e)))?;

        Ok(TokenState {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    async fn token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        let expiring = match guard.as_ref() {
            Some(state) => {
                (state.expires_at - Utc::now()).num_seconds() < TOKEN_REFRESH_BUFFER_SECS
            }
            None => true,
        };

        if expiring {
            debug!("Refreshing Spotify access token");
            *guard = Some(self.request_token().await?);
        }

        Ok(guard.as_ref().map(|s| s.access_token.clone()).unwrap_or_default())
    }

    /// GET a JSON document, sleeping out rate limits. On 429 the
    /// service-provided delay is honored exactly and the same request is
    /// re-issued; a run of them surfaces `RateLimited`.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut rate_limit_hits = 0u32;

        loop {
            let token = self.token().await?;
            let response = self.http.get(url).bearer_auth(token).send().await?;

            match response.status() {
                s if s.is_success() => return Ok(response.json().await?),
                StatusCode::TOO_MANY_REQUESTS => {
                    rate_limit_hits += 1;
                    if rate_limit_hits > MAX_RATE_LIMIT_RETRIES {
                        return Err(AppError::RateLimited(format!(
                            "Gave up after {} consecutive rate-limit responses",
                            MAX_RATE_LIMIT_RETRIES
                        )));
                    }
                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(1);
                    info!("Rate limited. Waiting {} seconds...", retry_after);
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                }
                StatusCode::NOT_FOUND => {
                    return Err(AppError::NotFound("Playlist not found".into()));
                }
                StatusCode::FORBIDDEN => {
                    return Err(AppError::AccessDenied(
                        "The playlist might be private".into(),
                    ));
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(AppError::Auth("Access token rejected".into()));
                }
                status => {
                    let error_text = response.text().await.unwrap_or_default();
                    return Err(AppError::Api(format!("{}: {}", status, error_text)));
                }
            }
        }
    }

    fn metadata_url(playlist_id: &PlaylistId, market: Option<&str>) -> String {
        let mut url = format!(
            "{}/playlists/{}?fields={}",
            API_BASE,
            playlist_id,
            urlencoding::encode(METADATA_FIELDS)
        );
        if let Some(market) = market {
            url.push_str(&format!("&market={}", market));
        }
        url
    }

    fn tracks_url(playlist_id: &PlaylistId, offset: u32, market: Option<&str>) -> String {
        let mut url = format!(
            "{}/playlists/{}/tracks?offset={}&limit={}&fields={}",
            API_BASE,
            playlist_id,
            offset,
            PAGE_LIMIT,
            urlencoding::encode(TRACK_FIELDS)
        );
        if let Some(market) = market {
            url.push_str(&format!("&market={}", market));
        }
        url
    }
}

impl Catalog for CatalogClient {
    async fn fetch_metadata(&self, playlist_id: &PlaylistId) -> Result<PlaylistMetadata> {
        let regions = regions_for(playlist_id);

        try_regions(regions, |market| async move {
            if playlist_id.is_curated() {
                debug!(
                    "Trying curated playlist {} with market {}",
                    playlist_id,
                    market.unwrap_or("default")
                );
            }
            let playlist: ApiPlaylist = self
                .get_json(&Self::metadata_url(playlist_id, market))
                .await?;
            Ok(playlist.into_metadata())
        })
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => {
                AppError::NotFound(format!("Playlist not found: {}", playlist_id))
            }
            other => other,
        })
    }

    async fn fetch_tracks(&self, playlist_id: &PlaylistId) -> Result<Vec<Track>> {
        let regions = regions_for(playlist_id);
        let mut region_idx = 0;
        let mut tracks: Vec<Track> = Vec::new();
        let mut offset = 0u32;

        loop {
            let url = Self::tracks_url(playlist_id, offset, regions[region_idx]);
            let page: ApiPage = match self.get_json(&url).await {
                Ok(page) => page,
                Err(AppError::NotFound(_)) if region_idx + 1 < regions.len() => {
                    // Curated playlist dropped out under this market; retry
                    // the same offset under the next one.
                    region_idx += 1;
                    info!(
                        "Switching to market {} for playlist {}",
                        regions[region_idx].unwrap_or("default"),
                        playlist_id
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            if page.items.is_empty() {
                break;
            }

            for item in page.items {
                if let Some(track) = convert_item(item) {
                    tracks.push(track);
                }
            }

            offset += PAGE_LIMIT;
            if offset >= page.total {
                break;
            }
        }

        if tracks.is_empty() {
            return Err(AppError::Api(
                "No playable tracks found in playlist".into(),
            ));
        }

        sort_tracks(&mut tracks);
        info!("Fetched {} tracks from playlist {}", tracks.len(), playlist_id);
        Ok(tracks)
    }
}

fn regions_for(playlist_id: &PlaylistId) -> &'static [Option<&'static str>] {
    if playlist_id.is_curated() {
        &REGION_FALLBACKS
    } else {
        &REGION_FALLBACKS[4..]
    }
}

/// Try `call` across the given markets in order, stopping at the first
/// success. Only a not-found outcome advances to the next market; any other
/// error propagates immediately.
async fn try_regions<T, F, Fut>(regions: &[Option<&'static str>], mut call: F) -> Result<T>
where
    F: FnMut(Option<&'static str>) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_not_found = None;
    for (i, market) in regions.iter().enumerate() {
        match call(*market).await {
            Ok(value) => return Ok(value),
            Err(AppError::NotFound(msg)) => {
                if i + 1 < regions.len() {
                    debug!(
                        "Market {} failed, trying next market",
                        market.unwrap_or("default")
                    );
                }
                last_not_found = Some(msg);
            }
            Err(e) => return Err(e),
        }
    }
    Err(AppError::NotFound(last_not_found.unwrap_or_else(|| {
        "Could not access playlist with any market setting".into()
    })))
}

/// Playlist ordering invariant relied on by reports and download filenames.
fn sort_tracks(tracks: &mut [Track]) {
    tracks.sort_by_key(|t| (t.disc_number, t.track_number));
}

fn convert_item(item: ApiItem) -> Option<Track> {
    let track = match item.track {
        Some(track) => track,
        None => {
            warn!("Skipping removed track entry");
            return None;
        }
    };

    if track.is_local.unwrap_or(false) {
        warn!("Skipping local track: {}", track.name);
        return None;
    }

    let id = match track.id {
        Some(id) => id,
        None => {
            warn!("Skipping track with no media reference: {}", track.name);
            return None;
        }
    };

    // Share URL with the si parameter, as the rest of the pipeline emits it.
    let external = track
        .external_urls
        .spotify
        .unwrap_or_else(|| format!("https://open.spotify.com/track/{}", id));
    let url = format!("{}?si={}", external, id);

    Some(Track {
        name: track.name,
        artists: track
            .artists
            .into_iter()
            .map(|a| Artist {
                name: a.name,
                id: a.id.unwrap_or_default(),
            })
            .collect(),
        album: AlbumRef {
            name: track.album.name,
            release_date: track
                .album
                .release_date
                .unwrap_or_else(|| "Unknown".to_string()),
            total_tracks: track.album.total_tracks.unwrap_or(0),
            album_type: track.album.album_type.unwrap_or_default(),
        },
        duration_ms: track.duration_ms,
        popularity: track.popularity.unwrap_or(0),
        explicit: track.explicit.unwrap_or(false),
        track_number: track.track_number.unwrap_or(0),
        disc_number: track.disc_number.unwrap_or(1),
        added_at: item.added_at,
        url,
        preview_url: track.preview_url,
        id,
    })
}

// Wire shapes, private to this adapter.

#[derive(Debug, Deserialize)]
struct ApiPlaylist {
    name: String,
    description: Option<String>,
    owner: ApiOwner,
    tracks: ApiTracksTotal,
    followers: Option<ApiFollowers>,
    public: Option<bool>,
}

impl ApiPlaylist {
    fn into_metadata(self) -> PlaylistMetadata {
        PlaylistMetadata {
            name: self.name,
            description: self.description.unwrap_or_default(),
            owner: self.owner.display_name.unwrap_or_default(),
            total_tracks: self.tracks.total,
            followers: self.followers.and_then(|f| f.total).unwrap_or(0),
            public: self.public.unwrap_or(true),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiOwner {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiTracksTotal {
    total: u32,
}

#[derive(Debug, Deserialize)]
struct ApiFollowers {
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    items: Vec<ApiItem>,
    total: u32,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    added_at: Option<String>,
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    external_urls: ApiExternalUrls,
    artists: Vec<ApiArtist>,
    album: ApiAlbum,
    duration_ms: u64,
    preview_url: Option<String>,
    popularity: Option<u8>,
    explicit: Option<bool>,
    track_number: Option<u32>,
    disc_number: Option<u32>,
    is_local: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    name: String,
    release_date: Option<String>,
    total_tracks: Option<u32>,
    album_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn api_item(name: &str, id: Option<&str>, is_local: bool, disc: u32, number: u32) -> ApiItem {
        ApiItem {
            added_at: Some("2023-01-15T10:00:00Z".to_string()),
            track: Some(ApiTrack {
                id: id.map(|s| s.to_string()),
                name: name.to_string(),
                external_urls: ApiExternalUrls {
                    spotify: id.map(|s| format!("https://open.spotify.com/track/{}", s)),
                },
                artists: vec![ApiArtist {
                    name: "Artist".to_string(),
                    id: Some("artist_id".to_string()),
                }],
                album: ApiAlbum {
                    name: "Album".to_string(),
                    release_date: Some("2020-01-01".to_string()),
                    total_tracks: Some(10),
                    album_type: Some("album".to_string()),
                },
                duration_ms: 200_000,
                preview_url: None,
                popularity: Some(30),
                explicit: Some(false),
                track_number: Some(number),
                disc_number: Some(disc),
                is_local: Some(is_local),
            }),
        }
    }

    #[test]
    fn test_convert_drops_local_tracks() {
        assert!(convert_item(api_item("Local", Some("x"), true, 1, 1)).is_none());
    }

    #[test]
    fn test_convert_drops_tracks_without_id() {
        assert!(convert_item(api_item("NoId", None, false, 1, 1)).is_none());
    }

    #[test]
    fn test_convert_builds_share_url() {
        let track = convert_item(api_item("Song", Some("abc"), false, 1, 1)).unwrap();
        assert_eq!(track.url, "https://open.spotify.com/track/abc?si=abc");
    }

    #[test]
    fn test_sort_orders_by_disc_then_track() {
        let mut tracks: Vec<Track> = [
            ("c", 2, 1),
            ("a", 1, 2),
            ("b", 1, 1),
            ("d", 2, 3),
        ]
        .iter()
        .map(|(name, disc, number)| {
            convert_item(api_item(name, Some(name), false, *disc, *number)).unwrap()
        })
        .collect();

        sort_tracks(&mut tracks);

        let order: Vec<(u32, u32)> = tracks
            .iter()
            .map(|t| (t.disc_number, t.track_number))
            .collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 1), (2, 3)]);
        assert!(order.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_region_fallback_stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let regions: [Option<&'static str>; 5] =
            [Some("US"), Some("GB"), Some("DE"), Some("FR"), None];

        let result = try_regions(&regions, |market| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match market {
                    Some("DE") => Ok("found in DE"),
                    _ => Err(AppError::NotFound("missing".into())),
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "found in DE");
        // US and GB 404, DE succeeds; FR and default are never attempted.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_region_fallback_exhaustion_is_not_found() {
        let regions: [Option<&'static str>; 2] = [Some("US"), None];
        let result: Result<()> = try_regions(&regions, |_| async {
            Err(AppError::NotFound("missing".into()))
        })
        .await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_region_fallback_propagates_other_errors() {
        let calls = AtomicU32::new(0);
        let regions: [Option<&'static str>; 3] = [Some("US"), Some("GB"), None];

        let result: Result<()> = try_regions(&regions, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::AccessDenied("private".into())) }
        })
        .await;

        assert!(matches!(result.unwrap_err(), AppError::AccessDenied(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_curated_playlists_get_full_region_list() {
        let curated =
            crate::validator::parse_reference("spotify:playlist:37i9dQZF1E8NC99vGqLsaH").unwrap();
        let user =
            crate::validator::parse_reference("spotify:playlist:4nqA2nDxvZhg2fY9svrL9R").unwrap();

        assert_eq!(regions_for(&curated).len(), 5);
        assert_eq!(regions_for(&user), &[None]);
    }
}

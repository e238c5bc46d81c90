use std::io::{self, Write};
use std::path::Path;

use chrono::Local;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};

const ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Tracks are added to a playlist in batches of this size (API limit).
const ADD_BATCH_SIZE: usize = 100;

/// Client for playlist creation under user-delegated authorization. This is
/// a different, elevated auth scope than the read-only catalog client.
pub struct UserClient {
    http: Client,
    access_token: String,
    user_id: String,
}

impl UserClient {
    /// Runs the authorization-code flow interactively: prints the authorize
    /// URL, reads the pasted redirect back, and exchanges the code.
    pub async fn new(config: &Config, public_scope: bool) -> Result<Self> {
        let http = Client::new();

        let mut scope = "playlist-modify-private".to_string();
        if public_scope {
            scope.push_str(" playlist-modify-public");
        }

        let auth_url = format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}",
            ACCOUNTS_BASE,
            urlencoding::encode(&config.spotify_client_id),
            urlencoding::encode(&config.spotify_redirect_uri),
            urlencoding::encode(&scope)
        );

        println!("\nOpen this URL in your browser to authorize Spotify:");
        println!("{}\n", auth_url);

        print!("Enter the URL you were redirected to: ");
        io::stdout().flush()?;

        let mut redirect_url = String::new();
        io::stdin().read_line(&mut redirect_url)?;

        let code = parse_response_code(redirect_url.trim())
            .ok_or_else(|| AppError::Auth("Failed to parse authorization code".into()))?;

        let access_token = Self::exchange_code(&http, config, &code).await?;

        let user_id = Self::current_user_id(&http, &access_token).await?;
        info!("Authenticated as Spotify user: {}", user_id);

        Ok(Self {
            http,
            access_token,
            user_id,
        })
    }

    async fn exchange_code(http: &Client, config: &Config, code: &str) -> Result<String> {
        let response = http
            .post(format!("{}/api/token", ACCOUNTS_BASE))
            .basic_auth(&config.spotify_client_id, Some(&config.spotify_client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", config.spotify_redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "Token exchange failed: {}",
                error_text
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("Failed to parse token response: {}", e)))?;
        Ok(token.access_token)
    }

    async fn current_user_id(http: &Client, token: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct ApiUser {
            id: String,
        }

        let response = http
            .get(format!("{}/me", API_BASE))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Auth("Failed to look up current user".into()));
        }

        let user: ApiUser = response.json().await?;
        Ok(user.id)
    }

    /// Create a playlist named `{name} (YYYY-MM-DD)` from a URLs file (one
    /// track URL per line) and return the created playlist's URL.
    pub async fn create_playlist_from_file(
        &self,
        urls_file: &Path,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<String> {
        let contents = std::fs::read_to_string(urls_file).map_err(|e| {
            AppError::Validation(format!("URLs file not found: {}: {}", urls_file.display(), e))
        })?;

        let track_ids = extract_track_ids(&contents);
        if track_ids.is_empty() {
            return Err(AppError::Validation(
                "No valid track IDs found in the URLs file".into(),
            ));
        }

        let dated_name = format!("{} ({})", name, Local::now().format("%Y-%m-%d"));
        info!("Creating playlist '{}' for user {}", dated_name, self.user_id);

        let (playlist_id, playlist_url) =
            self.create_playlist(&dated_name, description, public).await?;

        for batch in track_ids.chunks(ADD_BATCH_SIZE) {
            self.add_tracks(&playlist_id, batch).await?;
        }

        info!(
            "Created playlist with {} tracks: {}",
            track_ids.len(),
            playlist_url
        );
        Ok(playlist_url)
    }

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<(String, String)> {
        let response = self
            .http
            .post(format!("{}/users/{}/playlists", API_BASE, self.user_id))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "name": name,
                "description": description,
                "public": public,
            }))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED => {
                return Err(AppError::Auth(
                    "Authentication failed. Please check your credentials or reauthorize.".into(),
                ));
            }
            StatusCode::FORBIDDEN => {
                return Err(AppError::Auth(
                    "Forbidden. You don't have permission to create playlists.".into(),
                ));
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                return Err(AppError::Api(format!(
                    "Failed to create playlist ({}): {}",
                    status, error_text
                )));
            }
        }

        #[derive(Deserialize)]
        struct ApiCreatedPlaylist {
            id: String,
            external_urls: ApiExternalUrls,
        }

        #[derive(Deserialize)]
        struct ApiExternalUrls {
            spotify: Option<String>,
        }

        let playlist: ApiCreatedPlaylist = response.json().await?;
        let url = playlist
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", playlist.id));
        Ok((playlist.id, url))
    }

    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let uris: Vec<String> = track_ids
            .iter()
            .map(|id| format!("spotify:track:{}", id))
            .collect();

        let response = self
            .http
            .post(format!("{}/playlists/{}/tracks", API_BASE, playlist_id))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "uris": uris }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Failed to add batch of tracks: {}", error_text);
            return Err(AppError::Api(format!(
                "Failed to add tracks to playlist: {}",
                error_text
            )));
        }

        Ok(())
    }
}

fn parse_response_code(redirect_url: &str) -> Option<String> {
    let url = Url::parse(redirect_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
}

/// Extract track ids from a URLs file body: one URL per line, id is the last
/// path segment before any query string.
fn extract_track_ids(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let id = line
                .rsplit('/')
                .next()?
                .split('?')
                .next()
                .unwrap_or_default();
            if id.is_empty() {
                warn!("Could not extract track ID from URL: {}", line);
                None
            } else {
                Some(id.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_track_ids_from_urls() {
        let contents = "https://open.spotify.com/track/abc123?si=xyz\n\
                        https://open.spotify.com/track/def456\n\
                        \n";
        assert_eq!(extract_track_ids(contents), vec!["abc123", "def456"]);
    }

    #[test]
    fn test_parses_code_from_redirect() {
        let code =
            parse_response_code("http://localhost:8888/callback?code=AQDtoken&state=s").unwrap();
        assert_eq!(code, "AQDtoken");
    }

    #[test]
    fn test_missing_code_is_none() {
        assert!(parse_response_code("http://localhost:8888/callback?error=denied").is_none());
    }
}

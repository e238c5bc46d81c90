pub mod engine;
pub mod query;
pub mod tools;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::spotify::models::Track;

pub use engine::DownloadEngine;

/// Target container for extracted audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Opus,
    Wav,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Opus => "opus",
            AudioFormat::Wav => "wav",
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "m4a" => Ok(AudioFormat::M4a),
            "opus" => Ok(AudioFormat::Opus),
            "wav" => Ok(AudioFormat::Wav),
            other => Err(format!("unsupported audio format: {}", other)),
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub format: AudioFormat,
    pub max_workers: usize,
    pub skip_existing: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            format: AudioFormat::Mp3,
            max_workers: 4,
            skip_existing: true,
        }
    }
}

/// Outcome of one track download, persisted alongside the audio files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResult {
    pub track_name: String,
    pub artists: String,
    pub success: bool,
    pub file_path: Option<PathBuf>,
    pub error: Option<String>,
    pub search_query: String,
}

impl DownloadResult {
    pub fn success(track: &Track, file_path: PathBuf, search_query: String) -> Self {
        Self {
            track_name: track.name.clone(),
            artists: track.artist_names(),
            success: true,
            file_path: Some(file_path),
            error: None,
            search_query,
        }
    }

    pub fn failure(track: &Track, error: String, search_query: String) -> Self {
        Self {
            track_name: track.name.clone(),
            artists: track.artist_names(),
            success: false,
            file_path: None,
            error: Some(error),
            search_query,
        }
    }
}

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::downloader::AudioFormat;
use crate::error::{AppError, Result};
use crate::spotify::models::Track;

/// Per-file size cap passed to the retriever, keeps album-length uploads and
/// mislabeled mixes out of the results.
const MAX_FILESIZE: &str = "25m";

/// Fetches one search result as an audio file on disk. The explicit `Send`
/// bound lets the engine drive retrievals from spawned workers.
pub trait Retriever {
    /// Run a search-and-download for `query`, writing into `output_template`
    /// (a path template without extension; the tool appends it). Returns an
    /// error when the tool fails to run or exits non-zero.
    fn retrieve(
        &self,
        query: &str,
        output_template: &Path,
        format: AudioFormat,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Writes track metadata tags into a finished audio file.
pub trait Tagger {
    fn tag(&self, file: &Path, track: &Track) -> impl Future<Output = Result<()>> + Send;
}

/// yt-dlp adapter: `ytsearch:` queries, best audio, converted to the
/// requested format.
#[derive(Debug, Clone, Default)]
pub struct YtDlp;

impl Retriever for YtDlp {
    async fn retrieve(
        &self,
        query: &str,
        output_template: &Path,
        format: AudioFormat,
    ) -> Result<()> {
        let output = Command::new("yt-dlp")
            .arg("-x")
            .arg(format!("--audio-format={}", format))
            .arg("--audio-quality=0")
            .arg("-o")
            .arg(output_template)
            .arg("--embed-metadata")
            .arg("--max-filesize")
            .arg(MAX_FILESIZE)
            .arg(format!("ytsearch:{}", query))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::Config(format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Api(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        debug!(query = %query, "yt-dlp finished");
        Ok(())
    }
}

/// ffmpeg adapter: rewrites the container with title, artist, album and date
/// tags, then swaps the tagged file into place.
#[derive(Debug, Clone, Default)]
pub struct Ffmpeg;

/// Temp path for the tagged copy. ffmpeg infers the output muxer from the
/// extension, so the audio extension must stay last:
/// `Song.mp3` -> `Song.tagged.mp3`.
fn tagged_temp_path(file: &Path) -> std::path::PathBuf {
    let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("tmp");
    file.with_extension(format!("tagged.{}", ext))
}

impl Tagger for Ffmpeg {
    async fn tag(&self, file: &Path, track: &Track) -> Result<()> {
        let temp = tagged_temp_path(file);
        let output = Command::new("ffmpeg")
            .arg("-i")
            .arg(file)
            .arg("-c")
            .arg("copy")
            .arg("-metadata")
            .arg(format!("title={}", track.name))
            .arg("-metadata")
            .arg(format!("artist={}", track.artist_names()))
            .arg("-metadata")
            .arg(format!("album={}", track.album.name))
            .arg("-metadata")
            .arg(format!("date={}", track.album.release_date))
            .arg("-y")
            .arg(&temp)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::Config(format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&temp).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Api(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tokio::fs::rename(&temp, file).await?;
        Ok(())
    }
}

/// Probe that both external tools are installed before a download run.
pub async fn check_dependencies() -> Result<()> {
    for tool in ["yt-dlp", "ffmpeg"] {
        let probe = Command::new(tool)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match probe {
            Ok(status) if status.success() => {}
            Ok(status) => {
                warn!(tool = tool, status = %status, "version probe failed");
                return Err(AppError::Config(format!(
                    "{} is installed but not working (exit {})",
                    tool, status
                )));
            }
            Err(_) => {
                return Err(AppError::Config(format!(
                    "{} not found. Install it to enable downloads",
                    tool
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_tagged_temp_path_keeps_audio_extension() {
        assert_eq!(
            tagged_temp_path(&PathBuf::from("/music/Artist - Midnight.mp3")),
            PathBuf::from("/music/Artist - Midnight.tagged.mp3")
        );
        assert_eq!(
            tagged_temp_path(&PathBuf::from("/music/Song (Live).opus")),
            PathBuf::from("/music/Song (Live).tagged.opus")
        );
    }
}

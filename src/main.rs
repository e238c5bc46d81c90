use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spotify_gems::downloader::tools::{check_dependencies, Ffmpeg, YtDlp};
use spotify_gems::{
    AudioFormat, BatchExtractor, BatchOptions, CatalogClient, Config, DownloadEngine,
    DownloadOptions, GemParams, ProcessingOptions, ResultCache, UserClient,
};

#[derive(Parser)]
#[command(name = "spotify-gems")]
#[command(about = "Extract Spotify playlists, surface hidden gems, and download tracks")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one or more playlists and generate reports
    Extract {
        /// Playlist URLs or URIs
        #[arg(required_unless_present = "file")]
        references: Vec<String>,

        /// Read playlist references from a file, one per line
        #[arg(long)]
        file: Option<PathBuf>,

        /// Output directory for playlist folders and reports
        #[arg(short, long, default_value = "spotify_playlists")]
        output_dir: PathBuf,

        /// Append the owner name to folder and file names
        #[arg(long)]
        include_artist: bool,

        /// Write everything into the output root instead of per-playlist folders
        #[arg(long)]
        no_subfolders: bool,

        /// Re-fetch playlists that are already cached
        #[arg(long)]
        force: bool,

        /// Do not retry failed playlists at the end of the batch
        #[arg(long)]
        no_retry: bool,

        /// Attempts per playlist during the retry pass
        #[arg(long, default_value_t = 2)]
        retry_limit: u32,

        /// One combined analysis over all playlists instead of per-playlist gems reports
        #[arg(long)]
        combined: bool,

        /// Skip hidden-gems analysis entirely
        #[arg(long)]
        no_gems: bool,

        /// Lowest popularity considered for gems
        #[arg(long, default_value_t = 0)]
        min_popularity: u8,

        /// Highest popularity considered for gems
        #[arg(long, default_value_t = 40)]
        max_popularity: u8,

        /// Minimum gem score (0-50)
        #[arg(long, default_value_t = 20)]
        min_score: u32,

        /// Number of gems written to the playlist URLs file
        #[arg(long, default_value_t = 30)]
        top_gems: usize,

        /// Create a Hidden Gems playlist from each gems URLs file (prompts
        /// for authorization)
        #[arg(long)]
        create_playlist: bool,

        /// Name for created playlists (date suffix is appended)
        #[arg(long, default_value = "Hidden Gems")]
        playlist_name: String,

        /// Make created playlists public
        #[arg(long)]
        public: bool,
    },

    /// Download the tracks of a previously extracted playlist
    Download {
        /// Playlist URL or URI
        reference: String,

        /// Output directory used during extraction
        #[arg(short, long, default_value = "spotify_playlists")]
        output_dir: PathBuf,

        /// Audio format (mp3, m4a, opus, wav)
        #[arg(long, default_value = "mp3")]
        format: AudioFormat,

        /// Concurrent download workers
        #[arg(long, default_value_t = 4)]
        max_workers: usize,

        /// Re-download files that already exist
        #[arg(long)]
        force: bool,
    },

    /// Create a Spotify playlist from a gem URLs file
    CreatePlaylist {
        /// File with one track URL per line
        urls_file: PathBuf,

        /// Playlist name (date suffix is appended)
        #[arg(long, default_value = "Hidden Gems")]
        name: String,

        /// Playlist description
        #[arg(long, default_value = "Hidden gems discovered by spotify-gems")]
        description: String,

        /// Make the playlist public
        #[arg(long)]
        public: bool,
    },

    /// Show setup guide
    Setup,
}

fn setup_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose);

    match cli.command {
        Commands::Extract {
            references,
            file,
            output_dir,
            include_artist,
            no_subfolders,
            force,
            no_retry,
            retry_limit,
            combined,
            no_gems,
            min_popularity,
            max_popularity,
            min_score,
            top_gems,
            create_playlist,
            playlist_name,
            public,
        } => {
            let options = BatchOptions {
                skip_existing: !force,
                retry_failed: !no_retry,
                retry_limit,
                combined_analysis: combined,
                hidden_gems: !no_gems,
                gems: GemParams {
                    min_pop: min_popularity,
                    max_pop: max_popularity,
                    min_score,
                    top_gems,
                },
                processing: ProcessingOptions {
                    output_dir,
                    include_artist,
                    create_subfolders: !no_subfolders,
                },
            };
            let creation = create_playlist.then_some(PlaylistCreation {
                name: playlist_name,
                public,
            });
            extract(references, file, options, creation).await?;
        }
        Commands::Download {
            reference,
            output_dir,
            format,
            max_workers,
            force,
        } => {
            download(
                &reference,
                &output_dir,
                DownloadOptions {
                    format,
                    max_workers,
                    skip_existing: !force,
                },
            )
            .await?;
        }
        Commands::CreatePlaylist {
            urls_file,
            name,
            description,
            public,
        } => {
            create_playlist(&urls_file, &name, &description, public).await?;
        }
        Commands::Setup => {
            show_setup_guide();
        }
    }

    Ok(())
}

fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let missing = config.get_missing_config();
    if !missing.is_empty() {
        println!("{}", "Missing configuration:".red());
        for item in &missing {
            println!("   - {}", item);
        }
        println!(
            "\n{}",
            "Please copy .env.example to .env and fill in your credentials.".yellow()
        );
        std::process::exit(1);
    }

    Ok(config)
}

struct PlaylistCreation {
    name: String,
    public: bool,
}

async fn extract(
    references: Vec<String>,
    file: Option<PathBuf>,
    options: BatchOptions,
    creation: Option<PlaylistCreation>,
) -> Result<()> {
    println!("{}", "Spotify Playlist Extractor".cyan().bold());
    println!("{}", "=".repeat(50));

    let mut references = references;
    if let Some(file) = file {
        let contents = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        references.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from),
        );
    }

    if references.is_empty() {
        println!("{}", "No playlist references given".yellow());
        return Ok(());
    }
    println!("Playlists queued: {}\n", references.len());

    let config = load_config()?;
    let catalog = CatalogClient::new(&config)
        .await
        .context("Failed to connect to Spotify")?;

    let extractor = BatchExtractor::new(catalog, options);
    let result = extractor.process_batch(&references).await?;
    result.print_summary();

    if !result.urls_files.is_empty() {
        match creation {
            Some(creation) => {
                let client = UserClient::new(&config, creation.public)
                    .await
                    .context("Spotify authorization failed")?;
                for urls_file in &result.urls_files {
                    let url = client
                        .create_playlist_from_file(
                            urls_file,
                            &creation.name,
                            "Hidden gems discovered by spotify-gems",
                            creation.public,
                        )
                        .await?;
                    println!("{} {}", "Playlist created:".green(), url);
                }
            }
            None => {
                println!(
                    "\n{}",
                    "Run `spotify-gems create-playlist <urls-file>` to turn gems into a playlist"
                        .cyan()
                );
            }
        }
    }

    // The batch only counts as a failure when nothing got through at all.
    if result.processed == 0 && result.skipped == 0 && !result.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

async fn download(
    reference: &str,
    output_dir: &std::path::Path,
    options: DownloadOptions,
) -> Result<()> {
    println!("{}", "Playlist Track Downloader".cyan().bold());
    println!("{}", "=".repeat(50));

    check_dependencies()
        .await
        .context("Missing download tools")?;

    let playlist_id = spotify_gems::validator::parse_reference(reference)?;
    let cache = ResultCache::new(output_dir);
    let Some(entry) = cache.get(&playlist_id) else {
        println!(
            "{}",
            "Playlist is not cached yet. Run `spotify-gems extract` first.".yellow()
        );
        std::process::exit(1);
    };

    let downloads_dir = cache
        .get_ref(&playlist_id)
        .map(|r| r.files.downloads_dir)
        .unwrap_or_else(|| output_dir.join("Downloads"));

    println!(
        "Downloading {} tracks from {} into {}\n",
        entry.tracks.len(),
        entry.metadata.name.green(),
        downloads_dir.display()
    );

    let engine = DownloadEngine::new(YtDlp, Ffmpeg, options);
    let results = engine.download_all(&entry.tracks, &downloads_dir).await?;

    let succeeded = results.iter().filter(|r| r.success).count();
    println!(
        "\n{} {}/{} tracks downloaded",
        "Done:".green(),
        succeeded,
        results.len()
    );
    for result in results.iter().filter(|r| !r.success) {
        println!(
            "  {} {} - {}",
            "failed:".red(),
            result.artists,
            result.track_name
        );
    }

    Ok(())
}

async fn create_playlist(
    urls_file: &std::path::Path,
    name: &str,
    description: &str,
    public: bool,
) -> Result<()> {
    println!("{}", "Playlist Creator".cyan().bold());
    println!("{}", "=".repeat(50));

    let config = load_config()?;
    let client = UserClient::new(&config, public)
        .await
        .context("Spotify authorization failed")?;

    let url = client
        .create_playlist_from_file(urls_file, name, description, public)
        .await?;

    println!("\n{}", "Playlist created!".green());
    println!("{}", url);
    Ok(())
}

fn show_setup_guide() {
    println!("{}", "Spotify Gems Setup Guide".cyan().bold());
    println!("{}", "=".repeat(50));

    println!("\n{}", "1. Spotify API Setup".yellow());
    println!("   - Go to https://developer.spotify.com/dashboard/");
    println!("   - Create a new app");
    println!("   - Copy your Client ID and Client Secret");
    println!("   - Add 'http://localhost:8888/callback' as a redirect URI");

    println!("\n{}", "2. Configuration".yellow());
    println!("   - Create a .env file with:");
    println!("     SPOTIFY_CLIENT_ID=your_spotify_client_id");
    println!("     SPOTIFY_CLIENT_SECRET=your_spotify_client_secret");
    println!("     SPOTIFY_REDIRECT_URI=http://localhost:8888/callback");

    println!("\n{}", "3. Download tools (optional)".yellow());
    println!("   - Install yt-dlp and ffmpeg to enable track downloads");

    println!("\n{}", "4. Usage".yellow());
    println!("   - spotify-gems extract <playlist-url>       (extract and analyze)");
    println!("   - spotify-gems extract --file playlists.txt (batch from a file)");
    println!("   - spotify-gems download <playlist-url>      (download cached tracks)");
    println!("   - spotify-gems create-playlist <urls-file>  (publish the gems)");

    println!("\n{}", "Ready to dig for gems!".green());
}

pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod gems;
pub mod retry;
pub mod spotify;
pub mod validator;

pub use cache::{CacheEntry, PlaylistRef, ResultCache};
pub use config::Config;
pub use downloader::{AudioFormat, DownloadEngine, DownloadOptions, DownloadResult};
pub use error::{AppError, Result};
pub use extractor::{BatchExtractor, BatchOptions, BatchResult, ProcessingOptions};
pub use gems::GemParams;
pub use spotify::{Catalog, CatalogClient, PlaylistMetadata, Track, UserClient};
pub use validator::PlaylistId;

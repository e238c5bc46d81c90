pub mod client;
pub mod models;
pub mod user;

pub use client::{Catalog, CatalogClient};
pub use models::{AlbumRef, Artist, PlaylistMetadata, Track};
pub use user::UserClient;

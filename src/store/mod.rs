//! Object store gateway
//!
//! Lists, reads and writes objects in an S3-compatible bucket. Written
//! objects are always public-read.

pub mod client;
pub mod mock;

pub use client::S3Store;
pub use mock::MockObjectStore;

use crate::Result;
use async_trait::async_trait;

/// Extensions the listing keeps.
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".tiff"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub content_length: i64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Image objects under `prefix`, in listing order.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn head(&self, key: &str) -> Result<ObjectMetadata>;
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()>;
}

/// Whether `key` ends in one of [`IMAGE_EXTENSIONS`], ignoring case.
pub fn is_supported_image_key(key: &str) -> bool {
    match key.rfind('.') {
        Some(index) => {
            let extension = key[index..].to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&extension.as_str())
        }
        None => false,
    }
}

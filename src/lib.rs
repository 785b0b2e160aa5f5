//! Batch image shrinker for S3-compatible object stores
//!
//! Lists images under a bucket prefix, archives each original under a
//! `backup/` folder and overwrites it with a resized, re-encoded copy.

pub mod app;
pub mod error;
pub mod image;
pub mod models;
pub mod store;

pub use error::{Error, Result};

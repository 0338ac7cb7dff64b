//! Uploaded image storage

pub mod images;

pub use images::{ImageStore, StoredImage};

//! Dubmix Storage Library
//!
//! Object storage abstraction for merge inputs and published artifacts, with S3
//! (via `object_store`) and local filesystem backends.
//!
//! # Storage key format
//!
//! Published artifacts use owner-scoped keys:
//!
//! - **Merged videos**: `user_videos/{owner_id}/{uuid}.mp4`
//! - **Thumbnails**: `user_thumbnails/{owner_id}/{uuid}.png`
//!
//! Keys must not contain `..` or a leading `/`. Inputs arrive as raw keys or as URLs
//! a backend issued earlier; [`ReferenceParser`] turns either into a key.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod reference;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use dubmix_core::StorageBackend;
pub use factory::create_storage;
pub use keys::artifact_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use reference::{ReferenceError, ReferenceParser};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};

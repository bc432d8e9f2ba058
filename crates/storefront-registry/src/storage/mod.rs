//! Object storage abstraction for the registry and the site synchronizer
//!
//! Both components only need a bucket-scoped key/value capability:
//! put, get, head, prefix listing, server-side copy and delete.

pub mod object_store;

pub use object_store::{
    Listing, MemoryStorage, ObjectMeta, ObjectStore, PutOptions, StorageError,
};

#[cfg(feature = "s3")]
pub mod s3_storage;

/// Cache policy for template assets, which never change under a given key
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Cache policy for tenant data files, which must always be refetched
pub const NO_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";

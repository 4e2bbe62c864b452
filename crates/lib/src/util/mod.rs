//! Shared utilities.
//!
//! Content hashing used by the store uploader.

pub mod hash;

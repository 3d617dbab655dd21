//! Shared types and utilities for swiftslo.
//!
//! This crate provides common functionality used across the swiftslo crates:
//! - MD5 digest helpers (Swift ETags are MD5 hex digests)
//! - Chunk and manifest object-naming conventions
//! - Shared size and retry constants

pub mod constants;
pub mod hash;
pub mod naming;

// Re-export commonly used items at crate root
pub use constants::*;
pub use hash::{hash_bytes, Md5Hasher};
pub use naming::{chunk_object_name, manifest_object_name, parse_chunk_number};

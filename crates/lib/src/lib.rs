//! bes-lib: ordered build event streaming.
//!
//! This crate provides the pieces of a build event pipeline:
//! - `event`: the build event model
//! - `encode` / `reader`: the on-disk record formats
//! - `upload`: turning local artifact paths into stream references
//! - `sink`: byte destinations
//! - `transport`: the ordered, asynchronous writer tying them together

pub mod consts;
pub mod encode;
pub mod event;
pub mod reader;
pub mod sink;
pub mod transport;
pub mod upload;
pub mod util;

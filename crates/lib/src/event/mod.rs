//! Build event model.
//!
//! A [`BuildEvent`] records one build-lifecycle occurrence. Events are created
//! by the orchestrator, are immutable once handed to a transport, and may
//! reference local files through [`FileLocation::Path`]. Those references are
//! rewritten into sink-addressable URIs by the encoder once the uploader has
//! resolved them.
//!
//! # Submodules
//!
//! - [`types`] - Event ids, payloads and file references

mod types;

pub use types::*;

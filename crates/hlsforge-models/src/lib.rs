//! Shared data models for the HLSForge transcode pipeline.
//!
//! This crate holds the queue wire types and the pure rendition ladder.
//! It deliberately has no I/O so every other crate can depend on it.

pub mod job;
pub mod ladder;
pub mod variant;

pub use job::{TranscodeJob, VideoId};
pub use ladder::{select_profiles, LADDER};
pub use variant::{RenditionProfile, VariantResult};

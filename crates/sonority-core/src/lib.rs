//! Core library model for sonority.
//!
//! This crate defines the identifiers and records of the music library
//! (tracks, releases, artists, track lists), the artist link types used to
//! partition artist similarity, and the SQLite store that holds them along
//! with the per-track audio features.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;

pub use error::{Error, Result};

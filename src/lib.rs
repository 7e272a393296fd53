//! Multi-author feed aggregator.
//!
//! Reads the feeds of a roster of authors, keeps the posts that mention a
//! marker keyword, and publishes one combined RSS feed per language.

pub mod aggregate;
pub mod config;
pub mod feed;
pub mod publish;
pub mod roster;

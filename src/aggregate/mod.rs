//! The aggregation engine.
//!
//! [`Aggregator`] selects authors by language, fans out one
//! [`SourceReader`] per author, waits for all of them, and assembles a
//! [`CombinedFeed`]. Feed failures never cross the Source Reader: the
//! aggregator only ever sees a possibly smaller item pool.

mod aggregator;
mod source;

pub use aggregator::{
    assemble_items, select_authors, Aggregator, ChannelInfo, CombinedFeed, Contributor,
    COPYRIGHT_NOTICE, MIXED_LANGUAGE,
};
pub use source::SourceReader;

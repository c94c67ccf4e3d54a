//! Service layer for feed-service
//!
//! - feed_assembler: read path, merges own and celebrity rows into a page
//! - fanout_writer: write path, turns post events into timeline appends

pub mod fanout_writer;
pub mod feed_assembler;

pub use fanout_writer::{Classification, FanoutPath, FanoutReport, FanoutWriter};
pub use feed_assembler::{chain_celebrity_reads, paginate, FeedAssembler, MergeAccumulator};

//! Row reader module
//!
//! # Overview
//!
//! A [`PartitionReader`] owns the cursor of one partition and produces its
//! rows lazily, either one at a time, as a `futures::Stream`, or grouped
//! into Arrow RecordBatches. Readers share nothing but the HTTP connection
//! pool, so partitions can be read concurrently.

mod partition_reader;
mod types;

pub use partition_reader::PartitionReader;
pub use types::{ReadStats, ReaderOptions};

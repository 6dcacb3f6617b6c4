//! Partition planning module
//!
//! Splits a translated read into slices that can be fetched independently:
//!
//! - **All docs**: contiguous `_id` ranges whose boundaries are probed from
//!   the store at evenly spaced offsets
//! - **Changes**: one sequential cursor starting at the beginning of the feed
//! - **Selector / View / Search**: one partition paged by the reader

mod planner;
mod types;

pub use planner::{boundary_offsets, split_range, PartitionPlanner};
pub use types::{Partition, PartitionPlan, PartitionScope};

#[cfg(test)]
mod tests;

//! Partition plan types

use crate::store::KeyRange;
use serde::{Deserialize, Serialize};

/// Slice of a read owned by one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionScope {
    /// Contiguous `_id` range of an `_all_docs` scan
    KeyRange(KeyRange),
    /// Changes feed from a sequence token (`None` = from the beginning)
    Sequence { since: Option<String> },
    /// The whole result of a query that cannot be split
    Whole,
}

impl PartitionScope {
    /// Key range, for key-ordered scopes
    pub fn key_range(&self) -> Option<&KeyRange> {
        match self {
            PartitionScope::KeyRange(range) => Some(range),
            _ => None,
        }
    }
}

/// One independently readable slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Position in the plan
    pub index: usize,
    pub scope: PartitionScope,
}

impl Partition {
    /// Create a partition
    pub fn new(index: usize, scope: PartitionScope) -> Self {
        Self { index, scope }
    }
}

/// Ordered set of partitions covering a read without overlap or gaps
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartitionPlan {
    pub partitions: Vec<Partition>,
}

impl PartitionPlan {
    /// Plan from scopes, numbering them in order
    pub fn from_scopes(scopes: impl IntoIterator<Item = PartitionScope>) -> Self {
        Self {
            partitions: scopes
                .into_iter()
                .enumerate()
                .map(|(i, scope)| Partition::new(i, scope))
                .collect(),
        }
    }

    /// Single-partition plan
    pub fn single(scope: PartitionScope) -> Self {
        Self::from_scopes([scope])
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Check whether the plan is empty
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Partition by index
    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.partitions.get(index)
    }

    /// Iterate partitions in order
    pub fn iter(&self) -> std::slice::Iter<'_, Partition> {
        self.partitions.iter()
    }
}

impl IntoIterator for PartitionPlan {
    type Item = Partition;
    type IntoIter = std::vec::IntoIter<Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.into_iter()
    }
}

use std::collections::BTreeSet;

use crate::record::WorkerCount;

/// The shared x-axis of a scalability run: every worker count observed across
/// all labels, ascending and without duplicates.
///
/// Cells a label never measured stay absent. A missing cell means no data,
/// never a zero duration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerGrid {
    counts: BTreeSet<WorkerCount>,
}

impl WorkerGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, workers: WorkerCount) {
        self.counts.insert(workers);
    }

    pub fn to_vec(&self) -> Vec<WorkerCount> {
        self.counts.iter().copied().collect()
    }
}

impl FromIterator<WorkerCount> for WorkerGrid {
    fn from_iter<I: IntoIterator<Item = WorkerCount>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_and_deduplicated() {
        let grid: WorkerGrid = [5, 0, 5, 0, 10, 2].into_iter().collect();
        assert_eq!(grid.to_vec(), vec![0, 2, 5, 10]);
    }

    #[test]
    fn test_empty_grid() {
        assert!(WorkerGrid::new().to_vec().is_empty());
    }
}

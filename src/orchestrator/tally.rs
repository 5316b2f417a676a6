//! Shutdown acknowledgement tally kept by the primary.

use std::collections::BTreeSet;

use crate::worker::WorkerKey;

/// Shutdown acknowledgements received by the primary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownTally {
    /// Every ack received, duplicates included.
    pub count: usize,
    pub acked: BTreeSet<WorkerKey>,
}

impl ShutdownTally {
    pub fn record(&mut self, key: WorkerKey) {
        self.count += 1;
        if !self.acked.insert(key) {
            tracing::warn!(worker = %key, "Duplicate shutdown acknowledgement");
        }
    }

    /// Whether every key in `expected` has acknowledged.
    pub fn covers<'a>(&self, expected: impl IntoIterator<Item = &'a WorkerKey>) -> bool {
        expected.into_iter().all(|key| self.acked.contains(key))
    }

    pub fn missing<'a>(&self, expected: impl IntoIterator<Item = &'a WorkerKey>) -> Vec<WorkerKey> {
        expected
            .into_iter()
            .filter(|key| !self.acked.contains(key))
            .copied()
            .collect()
    }
}

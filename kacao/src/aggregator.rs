use std::collections::HashMap;

use crate::types::{PartitionOffsetPlan, Record};

/// Collects records until every planned partition has delivered its quota.
///
/// Owned by the fetch loop task; lives for one invocation.
#[derive(Debug, Default)]
pub struct RecordAggregator {
    quotas: HashMap<i32, i64>,
    counts: HashMap<i32, i64>,
    buffer: Vec<Record>,
}

impl RecordAggregator {
    pub fn new(plans: &[PartitionOffsetPlan]) -> Self {
        let quotas: HashMap<i32, i64> = plans.iter().map(|p| (p.partition, p.quota)).collect();
        let counts = quotas.keys().map(|&partition| (partition, 0)).collect();
        let capacity = plans.iter().map(|p| p.quota.max(0) as usize).sum();
        Self {
            quotas,
            counts,
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Keep `record` if its partition is still under quota. Records from
    /// partitions that are not part of the plan are dropped.
    pub fn offer(&mut self, record: Record) -> bool {
        let Some(&quota) = self.quotas.get(&record.partition) else {
            return false;
        };
        let count = self.counts.entry(record.partition).or_insert(0);
        if *count >= quota {
            return false;
        }
        *count += 1;
        self.buffer.push(record);
        true
    }

    /// Offer a whole batch, returning how many records were kept.
    pub fn extend(&mut self, batch: Vec<Record>) -> usize {
        batch
            .into_iter()
            .map(|record| self.offer(record))
            .filter(|kept| *kept)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.quotas
            .iter()
            .all(|(partition, quota)| self.counts.get(partition).copied().unwrap_or(0) >= *quota)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The kept records, in arrival order.
    pub fn into_records(self) -> Vec<Record> {
        self.buffer
    }
}

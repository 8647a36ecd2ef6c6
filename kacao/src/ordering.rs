use std::cmp::Ordering;

use tracing::debug;

use crate::filter::FilterSpec;
use crate::types::Record;

/// Newest first: timestamp descending, then offset descending. Partition
/// ascending settles the rest so the order is total.
pub fn newest_first(a: &Record, b: &Record) -> Ordering {
    b.timestamp_millis
        .cmp(&a.timestamp_millis)
        .then_with(|| b.offset.cmp(&a.offset))
        .then_with(|| a.partition.cmp(&b.partition))
}

/// Order the collected records, keep the `limit` most recent across the
/// whole topic, then drop whatever `filter` rejects.
///
/// Truncation happens before filtering, so a filtered result can hold fewer
/// than `limit` records even when more matching ones were fetched.
pub fn select_recent(mut records: Vec<Record>, limit: usize, filter: &FilterSpec) -> Vec<Record> {
    records.sort_by(newest_first);
    records.truncate(limit);

    if filter.is_empty() {
        return records;
    }

    let before = records.len();
    records.retain(|record| filter.matches(record));
    debug!(before, after = records.len(), "Applied record filter");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Header;

    fn record(partition: i32, offset: i64, timestamp_millis: i64) -> Record {
        Record {
            topic: "events".to_string(),
            partition,
            offset,
            timestamp_millis,
            key: None,
            value: format!("{partition}-{offset}").into_bytes(),
            headers: Vec::new(),
        }
    }

    fn ids(records: &[Record]) -> Vec<(i32, i64)> {
        records.iter().map(|r| (r.partition, r.offset)).collect()
    }

    #[test]
    fn sorts_by_timestamp_then_offset_descending() {
        let records = vec![
            record(0, 0, 100),
            record(0, 1, 100),
            record(1, 5, 300),
            record(0, 2, 200),
        ];

        let selected = select_recent(records, 10, &FilterSpec::default());

        assert_eq!(ids(&selected), vec![(1, 5), (0, 2), (0, 1), (0, 0)]);
    }

    #[test]
    fn identical_timestamp_and_offset_fall_back_to_partition() {
        let records = vec![record(2, 1, 100), record(0, 1, 100), record(1, 1, 100)];
        let selected = select_recent(records, 10, &FilterSpec::default());
        assert_eq!(ids(&selected), vec![(0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn truncates_globally_not_per_partition() {
        // partition 1 is busier and newer, so it takes every slot
        let records = vec![
            record(0, 0, 10),
            record(0, 1, 20),
            record(1, 0, 30),
            record(1, 1, 40),
        ];

        let selected = select_recent(records, 2, &FilterSpec::default());

        assert_eq!(ids(&selected), vec![(1, 1), (1, 0)]);
    }

    #[test]
    fn filters_after_truncating() {
        let mut tagged = record(0, 0, 10);
        tagged.headers.push(Header {
            key: "k".to_string(),
            value: b"v".to_vec(),
        });
        let records = vec![tagged, record(0, 1, 20), record(0, 2, 30)];
        let filter = FilterSpec::from_args(None, &["k=*".to_string()]).unwrap();

        // the only tagged record is the oldest and falls outside the limit
        assert!(select_recent(records.clone(), 2, &filter).is_empty());
        assert_eq!(ids(&select_recent(records, 3, &filter)), vec![(0, 0)]);
    }
}

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Vec<u8>,
}

/// A fetched message. Never mutated after it leaves the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp_millis: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub headers: Vec<Header>,
}

/// One partition's answer to an offset listing. `error` is set when the
/// cluster could not produce an offset for this partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedOffset {
    pub partition: i32,
    pub offset: i64,
    pub error: Option<String>,
}

impl ListedOffset {
    pub fn ok(partition: i32, offset: i64) -> Self {
        Self {
            partition,
            offset,
            error: None,
        }
    }

    pub fn failed(partition: i32, error: impl Into<String>) -> Self {
        Self {
            partition,
            offset: -1,
            error: Some(error.into()),
        }
    }
}

/// Where to start reading a partition and how many records to take from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOffsetPlan {
    pub partition: i32,
    pub start_offset: i64,
    pub quota: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    QuotaReached,
    DeadlineExceeded,
    SignalReceived,
    FetchError,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::QuotaReached => "quota_reached",
            TerminationReason::DeadlineExceeded => "deadline_exceeded",
            TerminationReason::SignalReceived => "signal_received",
            TerminationReason::FetchError => "fetch_error",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the tail mode repositions the consumer group before polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetReset {
    /// Resume from whatever the group last committed.
    #[default]
    Committed,
    Earliest,
    Latest,
}

impl FromStr for OffsetReset {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(ValidationError::OffsetMode(other.to_string())),
        }
    }
}

/// Result of a bounded retrieval: the final, ordered and filtered records.
#[derive(Debug)]
pub struct RetrievalOutcome {
    pub records: Vec<Record>,
    pub reason: TerminationReason,
}

impl RetrievalOutcome {
    /// Nothing fetched because the run was stopped before polling began.
    pub fn stopped(reason: TerminationReason) -> Self {
        Self {
            records: Vec::new(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    pub emitted: u64,
    pub reason: TerminationReason,
}

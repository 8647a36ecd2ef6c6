use rdkafka::error::KafkaError;
use thiserror::Error;

/// Bad flag values. Always detected before a client exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid timeout value {0:?}. Must be a non-negative integer representing seconds")]
    Timeout(String),

    #[error("invalid header format: {0}. Expected key=value")]
    Header(String),

    #[error("invalid offset argument {0:?}. Use 'earliest' or 'latest'. By default, the last committed offset will be used")]
    OffsetMode(String),

    #[error("invalid limit {0}. Must be greater than zero")]
    Limit(i64),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no cluster configured. Set KAFKA_HOSTS or pass --bootstrap-servers")]
    NoClusterConfigured,

    #[error("consumer group must not be empty")]
    EmptyConsumerGroup,
}

/// Failures reported by a `ClusterClient` implementation.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("kafka error during {operation}: {source}")]
    Kafka {
        operation: &'static str,
        #[source]
        source: KafkaError,
    },

    #[error("topic {topic} is unavailable: {reason}")]
    Topic { topic: String, reason: String },

    #[error("client is closed")]
    Closed,

    #[error("{operation} was cancelled before the broker answered")]
    Canceled { operation: &'static str },

    #[error("blocking task for {operation} did not complete: {source}")]
    Task {
        operation: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ClientError {
    pub fn kafka(operation: &'static str) -> impl FnOnce(KafkaError) -> Self {
        move |source| ClientError::Kafka { operation, source }
    }
}

#[derive(Error, Debug)]
pub enum PollError {
    /// The cancellation token fired while waiting for records.
    #[error("poll cancelled")]
    Cancelled,

    /// The client was closed underneath the poll.
    #[error("client closed during poll")]
    Closed,

    #[error("fetch failed: {0}")]
    Fetch(#[source] ClientError),
}

#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("failed to list offsets for topic {topic}: {source}")]
    Listing {
        topic: String,
        #[source]
        source: ClientError,
    },

    #[error("topic {0} does not exist or has no partitions")]
    UnknownTopic(String),

    #[error("partition {partition} of topic {topic} reported an error: {reason}")]
    Partition {
        topic: String,
        partition: i32,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to create kafka client: {0}")]
    Connect(#[source] ClientError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error("failed to commit offsets for consumer group {group}: {source}")]
    Commit {
        group: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to subscribe to topic {topic}: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: ClientError,
    },

    #[error("fatal fetch error: {0}")]
    Fetch(#[source] ClientError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

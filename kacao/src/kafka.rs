//! `ClusterClient` backed by librdkafka.
//!
//! A `StreamConsumer` joins the consumer group and does the polling; an
//! `AdminClient` built from the same settings answers metadata and watermark
//! queries. Commits go through a short-lived `BaseConsumer` bound to the group
//! being committed, so the group is always an explicit argument.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use rdkafka::admin::AdminClient;
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClusterClient;
use crate::error::{ClientError, PollError};
use crate::metrics_consts::{FETCH_ERRORS, RECORDS_POLLED};
use crate::types::{Header, ListedOffset, Record};

#[derive(Debug, Clone, Copy)]
enum Watermark {
    Low,
    High,
}

pub struct KafkaClusterClient {
    consumer: StreamConsumer,
    admin: Arc<AdminClient<DefaultClientContext>>,
    base_config: ClientConfig,
    operation_timeout: Duration,

    // how many records a single poll may return, and how long
    // it keeps draining after the first one arrived
    batch_size: usize,
    batch_timeout: Duration,

    closed: AtomicBool,
    close_token: CancellationToken,
}

impl KafkaClusterClient {
    /// `base_config` must already carry the bootstrap servers; the group
    /// member settings are layered on top here.
    pub fn connect(
        base_config: ClientConfig,
        group: &str,
        operation_timeout: Duration,
        batch_size: usize,
        batch_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let admin: AdminClient<DefaultClientContext> = base_config
            .clone()
            .create()
            .map_err(ClientError::kafka("create_admin_client"))?;

        // Offsets are only ever moved explicitly by the committer, the
        // earliest reset only matters for partitions the group never saw
        let consumer: StreamConsumer = base_config
            .clone()
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(ClientError::kafka("create_consumer"))?;

        info!(group, "Created kafka consumer");

        Ok(Self {
            consumer,
            admin: Arc::new(admin),
            base_config,
            operation_timeout,
            batch_size: batch_size.max(1),
            batch_timeout,
            closed: AtomicBool::new(false),
            close_token: CancellationToken::new(),
        })
    }

    /// Metadata and watermark queries block inside librdkafka, so they run on
    /// the blocking pool.
    async fn watermarks(
        &self,
        topic: &str,
        side: Watermark,
    ) -> Result<Vec<ListedOffset>, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }

        let admin = self.admin.clone();
        let topic = topic.to_string();
        let timeout = self.operation_timeout;
        run_blocking("list_offsets", move || list_watermarks(&admin, &topic, side, timeout)).await
    }

    async fn drain(&self, batch: &mut Vec<Record>) -> Result<(), PollError> {
        let deadline = tokio::time::Instant::now() + self.batch_timeout;
        while batch.len() < self.batch_size {
            let received = tokio::select! {
                biased;
                _ = self.close_token.cancelled() => return Err(PollError::Closed),
                received = tokio::time::timeout_at(deadline, self.consumer.recv()) => received,
            };
            match received {
                Ok(Ok(message)) => batch.push(record_from_message(&message)),
                Ok(Err(e)) => return Err(poll_failure(e)),
                Err(_elapsed) => break,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KafkaClusterClient {
    async fn list_end_offsets(&self, topic: &str) -> Result<Vec<ListedOffset>, ClientError> {
        self.watermarks(topic, Watermark::High).await
    }

    async fn list_start_offsets(&self, topic: &str) -> Result<Vec<ListedOffset>, ClientError> {
        self.watermarks(topic, Watermark::Low).await
    }

    async fn commit_offsets(
        &self,
        group: &str,
        topic: &str,
        offsets: &[(i32, i64)],
    ) -> Result<(), ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }

        let mut config = self.base_config.clone();
        config
            .set("group.id", group)
            .set("enable.auto.commit", "false");
        let (commit_topic, offsets_owned) = (topic.to_string(), offsets.to_vec());

        // the synchronous commit blocks until the coordinator answers
        run_blocking("commit", move || {
            let mut tpl = TopicPartitionList::with_capacity(offsets_owned.len());
            for &(partition, offset) in &offsets_owned {
                tpl.add_partition_offset(&commit_topic, partition, Offset::Offset(offset))
                    .map_err(ClientError::kafka("build_commit_list"))?;
            }

            // Dropped on return, which leaves no member behind in the group
            let committer: BaseConsumer = config
                .create()
                .map_err(ClientError::kafka("create_committer"))?;
            committer
                .commit(&tpl, CommitMode::Sync)
                .map_err(ClientError::kafka("commit"))
        })
        .await?;

        info!(group, topic, partitions = offsets.len(), "Committed offsets");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        self.consumer
            .subscribe(&[topic])
            .map_err(ClientError::kafka("subscribe"))
    }

    async fn poll(&self, cancel: &CancellationToken) -> Result<Vec<Record>, PollError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PollError::Closed);
        }

        let first = tokio::select! {
            biased;
            _ = self.close_token.cancelled() => return Err(PollError::Closed),
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            received = self.consumer.recv() => match received {
                Ok(message) => record_from_message(&message),
                Err(e) => return Err(poll_failure(e)),
            },
        };

        let mut batch = Vec::with_capacity(self.batch_size);
        batch.push(first);
        self.drain(&mut batch).await?;

        counter!(RECORDS_POLLED).increment(batch.len() as u64);
        Ok(batch)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close_token.cancel();
        self.consumer.unsubscribe();
        info!("Closed kafka client");
    }
}

fn list_watermarks(
    admin: &AdminClient<DefaultClientContext>,
    topic: &str,
    side: Watermark,
    timeout: Duration,
) -> Result<Vec<ListedOffset>, ClientError> {
    let metadata = admin
        .inner()
        .fetch_metadata(Some(topic), timeout)
        .map_err(ClientError::kafka("fetch_metadata"))?;

    let Some(topic_metadata) = metadata.topics().iter().find(|t| t.name() == topic) else {
        return Ok(Vec::new());
    };

    if let Some(err) = topic_metadata.error() {
        return Err(ClientError::Topic {
            topic: topic.to_string(),
            reason: RDKafkaErrorCode::from(err).to_string(),
        });
    }

    let mut listed = Vec::with_capacity(topic_metadata.partitions().len());
    for partition in topic_metadata.partitions() {
        let id = partition.id();
        if let Some(err) = partition.error() {
            listed.push(ListedOffset::failed(
                id,
                RDKafkaErrorCode::from(err).to_string(),
            ));
            continue;
        }

        match admin.inner().fetch_watermarks(topic, id, timeout) {
            Ok((low, high)) => {
                debug!(topic, partition = id, low, high, "Fetched watermarks");
                let offset = match side {
                    Watermark::Low => low,
                    Watermark::High => high,
                };
                listed.push(ListedOffset::ok(id, offset));
            }
            Err(e) => {
                warn!(topic, partition = id, error = %e, "Failed to fetch watermarks");
                listed.push(ListedOffset::failed(id, e.to_string()));
            }
        }
    }

    listed.sort_by_key(|l| l.partition);
    Ok(listed)
}

/// Run a blocking librdkafka call off the async workers.
async fn run_blocking<T, F>(operation: &'static str, call: F) -> Result<T, ClientError>
where
    F: FnOnce() -> Result<T, ClientError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(result) => result,
        Err(source) => Err(ClientError::Task { operation, source }),
    }
}

fn poll_failure(e: rdkafka::error::KafkaError) -> PollError {
    counter!(FETCH_ERRORS).increment(1);
    PollError::Fetch(ClientError::Kafka {
        operation: "poll",
        source: e,
    })
}

pub fn record_from_message<M: Message>(message: &M) -> Record {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| Header {
                    key: header.key.to_string(),
                    value: header.value.map(<[u8]>::to_vec).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    Record {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        timestamp_millis: message.timestamp().to_millis().unwrap_or(0),
        key: message.key().map(<[u8]>::to_vec),
        value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
    }
}

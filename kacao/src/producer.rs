//! Appending single records for the `produce` command.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use rdkafka::message::{Header as KafkaHeader, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::info;

use crate::error::ClientError;
use crate::metrics_consts::RECORDS_PRODUCED;
use crate::types::Header;

/// A record on its way to `topic`. Without a key the partitioner picks the
/// partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRecord {
    pub topic: String,
    pub key: Option<String>,
    pub value: String,
    pub headers: Vec<Header>,
}

#[async_trait]
pub trait RecordProducer: Send + Sync {
    /// Hand `record` to the cluster and wait until it is acknowledged.
    async fn send(&self, record: &OutgoingRecord) -> Result<(), ClientError>;
}

pub struct KafkaRecordProducer {
    producer: FutureProducer,
}

impl KafkaRecordProducer {
    /// Deliveries that take longer than `message_timeout` fail instead of
    /// waiting forever on an unreachable cluster.
    pub fn connect(
        mut client_config: ClientConfig,
        message_timeout: Duration,
    ) -> Result<Self, ClientError> {
        client_config
            .set("message.timeout.ms", message_timeout.as_millis().to_string())
            .set("linger.ms", "0");

        let producer: FutureProducer = client_config
            .create()
            .map_err(ClientError::kafka("create producer"))?;
        Ok(Self { producer })
    }
}

#[async_trait]
impl RecordProducer for KafkaRecordProducer {
    async fn send(&self, record: &OutgoingRecord) -> Result<(), ClientError> {
        let headers = record
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, header| {
                headers.insert(KafkaHeader {
                    key: header.key.as_str(),
                    value: Some(header.value.as_slice()),
                })
            });

        let future_record = FutureRecord {
            topic: record.topic.as_str(),
            key: record.key.as_deref(),
            payload: Some(record.value.as_str()),
            timestamp: None,
            partition: None,
            headers: Some(headers),
        };

        let delivery = self
            .producer
            .send_result(future_record)
            .map_err(|(e, _)| ClientError::kafka("produce")(e))?;

        match delivery.await {
            Ok(Ok(_)) => {}
            Ok(Err((e, _))) => return Err(ClientError::kafka("produce")(e)),
            Err(_) => return Err(ClientError::Canceled { operation: "produce" }),
        }

        counter!(RECORDS_PRODUCED).increment(1);
        info!(topic = %record.topic, key = ?record.key, headers = record.headers.len(), "Produced record");
        Ok(())
    }
}

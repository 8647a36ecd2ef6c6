use std::time::Duration;

use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::mocking::MockCluster;
use rdkafka::producer::{DefaultProducerContext, FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;

use crate::config::KafkaConfig;

/// In-process brokers plus a producer wired to them, for tests that need a real
/// librdkafka client on the other end.
pub fn create_mock_kafka() -> (
    MockCluster<'static, DefaultProducerContext>,
    FutureProducer,
    KafkaConfig,
) {
    let cluster = MockCluster::new(1).expect("failed to create mock brokers");

    let config = KafkaConfig {
        kafka_hosts: Some(cluster.bootstrap_servers()),
        kafka_tls: false,
        kafka_session_timeout_ms: 6000,
        kafka_operation_timeout_ms: 5000,
    };

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", cluster.bootstrap_servers())
        .set("message.timeout.ms", "5000")
        .set("linger.ms", "0")
        .create()
        .expect("failed to create mocked kafka producer");

    (cluster, producer, config)
}

pub async fn produce(
    producer: &FutureProducer,
    topic: &str,
    partition: i32,
    key: Option<&str>,
    value: &str,
    headers: &[(&str, &str)],
) {
    let mut owned = OwnedHeaders::new();
    for &(key, value) in headers {
        owned = owned.insert(Header {
            key,
            value: Some(value),
        });
    }

    let mut record: FutureRecord<'_, str, str> = FutureRecord::to(topic)
        .partition(partition)
        .payload(value)
        .headers(owned);
    if let Some(key) = key {
        record = record.key(key);
    }

    producer
        .send(record, Timeout::After(Duration::from_secs(5)))
        .await
        .map_err(|(e, _)| e)
        .expect("failed to produce test message");
}

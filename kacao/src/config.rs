use std::time::Duration;

use common_kafka::config::KafkaConfig;
use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(from = "KACAO_CONSUMER_GROUP", default = "kacao-cli")]
    pub consumer_group: String,

    #[envconfig(from = "KACAO_POLL_BATCH_SIZE", default = "500")]
    pub poll_batch_size: usize,

    #[envconfig(from = "KACAO_POLL_BATCH_TIMEOUT_MS", default = "250")]
    pub poll_batch_timeout_ms: u64,
}

impl Config {
    pub fn poll_batch_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_batch_timeout_ms)
    }

    /// Defaults only, nothing read from the environment.
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Self::init_from_hashmap(&Default::default())
    }
}

use std::time::Duration;

use envconfig::Envconfig;
use rdkafka::ClientConfig;
use tracing::debug;

#[derive(Envconfig, Clone, Debug)]
pub struct KafkaConfig {
    pub kafka_hosts: Option<String>, // Comma separated bootstrap servers, no default on purpose

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "6000")]
    pub kafka_session_timeout_ms: u32,

    #[envconfig(default = "10000")]
    pub kafka_operation_timeout_ms: u64, // Bound on metadata, watermark and commit calls
}

impl KafkaConfig {
    /// The configured bootstrap servers, in order, with blanks dropped.
    pub fn bootstrap_servers(&self) -> Vec<String> {
        split_hosts(self.kafka_hosts.as_deref().unwrap_or_default())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.kafka_operation_timeout_ms)
    }

    /// Settings shared by every client we create against `bootstrap_servers`.
    /// Callers layer their role specific settings (group.id etc.) on a clone.
    pub fn client_config(&self, bootstrap_servers: &[String]) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", bootstrap_servers.join(","))
            .set(
                "session.timeout.ms",
                self.kafka_session_timeout_ms.to_string(),
            );

        if self.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        client_config
    }
}

pub fn split_hosts(hosts: &str) -> Vec<String> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_owned)
        .collect()
}

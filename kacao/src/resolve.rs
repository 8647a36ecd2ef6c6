//! Where the cluster address and consumer group of an invocation come from.

use common_kafka::config::split_hosts;

use crate::config::Config;
use crate::error::ResolveError;

pub trait ClusterResolver {
    /// A non-empty, ordered list of bootstrap servers.
    fn bootstrap_servers(&self) -> Result<Vec<String>, ResolveError>;
}

pub trait ConsumerGroupResolver {
    fn consumer_group(&self) -> Result<String, ResolveError>;
}

/// Command line flags first, then the environment configuration.
pub struct FlagOrEnvResolver<'a> {
    config: &'a Config,
    bootstrap_servers: Option<&'a str>,
    consumer_group: Option<&'a str>,
}

impl<'a> FlagOrEnvResolver<'a> {
    pub fn new(
        config: &'a Config,
        bootstrap_servers: Option<&'a str>,
        consumer_group: Option<&'a str>,
    ) -> Self {
        Self {
            config,
            bootstrap_servers,
            consumer_group,
        }
    }
}

impl ClusterResolver for FlagOrEnvResolver<'_> {
    fn bootstrap_servers(&self) -> Result<Vec<String>, ResolveError> {
        let servers = match self.bootstrap_servers {
            Some(flag) => split_hosts(flag),
            None => self.config.kafka.bootstrap_servers(),
        };
        if servers.is_empty() {
            return Err(ResolveError::NoClusterConfigured);
        }
        Ok(servers)
    }
}

impl ConsumerGroupResolver for FlagOrEnvResolver<'_> {
    fn consumer_group(&self) -> Result<String, ResolveError> {
        let group = self
            .consumer_group
            .unwrap_or(&self.config.consumer_group)
            .trim();
        if group.is_empty() {
            return Err(ResolveError::EmptyConsumerGroup);
        }
        Ok(group.to_string())
    }
}

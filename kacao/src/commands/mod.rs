use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::client::ClusterClient;
use crate::config::Config;
use crate::error::{ClientError, EngineError};
use crate::kafka::KafkaClusterClient;
use crate::producer::{KafkaRecordProducer, RecordProducer};
use crate::resolve::{ClusterResolver, ConsumerGroupResolver, FlagOrEnvResolver};

pub mod consume;
pub mod get;
pub mod produce;

#[derive(Parser, Debug)]
#[command(name = "kacao", version, about, long_about = None)]
pub struct Cli {
    /// Comma separated bootstrap servers, overrides KAFKA_HOSTS
    #[arg(long, global = true)]
    pub bootstrap_servers: Option<String>,

    /// Consumer group whose offsets are read and moved, overrides KACAO_CONSUMER_GROUP
    #[arg(long, global = true)]
    pub consumer_group: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read data from the cluster
    Get {
        #[command(subcommand)]
        cmd: GetCommand,
    },

    /// Print the values of a topic's records as they arrive
    Consume(consume::ConsumeArgs),

    /// Send one message to a topic
    Produce(produce::ProduceArgs),
}

#[derive(Subcommand, Debug)]
pub enum GetCommand {
    /// Print the most recent messages of a topic, newest first
    Messages(get::MessagesArgs),
}

/// Creates the clients an invocation runs against.
pub trait Connector {
    fn connect(
        &self,
        bootstrap_servers: &[String],
        group: &str,
    ) -> Result<Arc<dyn ClusterClient>, ClientError>;

    fn connect_producer(
        &self,
        bootstrap_servers: &[String],
    ) -> Result<Arc<dyn RecordProducer>, ClientError>;
}

pub struct KafkaConnector<'a> {
    config: &'a Config,
}

impl<'a> KafkaConnector<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl Connector for KafkaConnector<'_> {
    fn connect(
        &self,
        bootstrap_servers: &[String],
        group: &str,
    ) -> Result<Arc<dyn ClusterClient>, ClientError> {
        let client = KafkaClusterClient::connect(
            self.config.kafka.client_config(bootstrap_servers),
            group,
            self.config.kafka.operation_timeout(),
            self.config.poll_batch_size,
            self.config.poll_batch_timeout(),
        )?;
        Ok(Arc::new(client))
    }

    fn connect_producer(
        &self,
        bootstrap_servers: &[String],
    ) -> Result<Arc<dyn RecordProducer>, ClientError> {
        let producer = KafkaRecordProducer::connect(
            self.config.kafka.client_config(bootstrap_servers),
            self.config.kafka.operation_timeout(),
        )?;
        Ok(Arc::new(producer))
    }
}

impl Cli {
    /// Run the parsed command, writing records to `out`. `signal` resolves
    /// when the user asks the process to stop.
    pub async fn run<S, W>(
        self,
        config: &Config,
        connector: &dyn Connector,
        signal: S,
        out: &mut W,
    ) -> anyhow::Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
        W: Write,
    {
        let resolver = FlagOrEnvResolver::new(
            config,
            self.bootstrap_servers.as_deref(),
            self.consumer_group.as_deref(),
        );

        match self.command {
            Commands::Get { cmd } => match cmd {
                GetCommand::Messages(args) => {
                    get::messages(args, &resolver, connector, signal, out).await
                }
            },
            Commands::Consume(args) => {
                consume::consume(args, &resolver, connector, signal, out).await
            }
            Commands::Produce(args) => produce::produce(args, &resolver, connector).await,
        }
    }
}

/// Resolve where to connect and as whom, then create the client. Only called
/// once every flag has been validated.
fn connect<R>(resolver: &R, connector: &dyn Connector) -> anyhow::Result<(Arc<dyn ClusterClient>, String)>
where
    R: ClusterResolver + ConsumerGroupResolver,
{
    let bootstrap_servers = resolver.bootstrap_servers()?;
    let group = resolver.consumer_group()?;

    let client = connector
        .connect(&bootstrap_servers, &group)
        .map_err(EngineError::Connect)
        .with_context(|| format!("could not connect to {}", bootstrap_servers.join(",")))?;
    info!(servers = ?bootstrap_servers, group, "Connected");

    Ok((client, group))
}

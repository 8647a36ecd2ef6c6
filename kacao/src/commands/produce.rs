use anyhow::Context;
use clap::Args;
use tracing::info;

use crate::commands::Connector;
use crate::error::{EngineError, ValidationError};
use crate::filter::split_header_arg;
use crate::producer::OutgoingRecord;
use crate::resolve::ClusterResolver;
use crate::types::Header;

#[derive(Args, Debug)]
pub struct ProduceArgs {
    pub topic: String,

    /// Message to produce
    #[arg(short, long)]
    pub message: String,

    /// Key of the message
    #[arg(short, long)]
    pub key: Option<String>,

    /// Header to add to the message, example: --header key=value
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,
}

impl ProduceArgs {
    /// Headers are sent in the order given, repeated keys included. `*` has
    /// no special meaning here.
    pub fn into_record(self) -> Result<OutgoingRecord, ValidationError> {
        let headers = self
            .headers
            .iter()
            .map(|arg| {
                split_header_arg(arg).map(|(key, value)| Header {
                    key: key.to_string(),
                    value: value.as_bytes().to_vec(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OutgoingRecord {
            topic: self.topic,
            key: self.key,
            value: self.message,
            headers,
        })
    }
}

pub async fn produce<R>(
    args: ProduceArgs,
    resolver: &R,
    connector: &dyn Connector,
) -> anyhow::Result<()>
where
    R: ClusterResolver,
{
    let record = args.into_record()?;

    let bootstrap_servers = resolver.bootstrap_servers()?;
    let producer = connector
        .connect_producer(&bootstrap_servers)
        .map_err(EngineError::Connect)
        .with_context(|| format!("could not connect to {}", bootstrap_servers.join(",")))?;
    info!(servers = ?bootstrap_servers, "Connected");

    producer
        .send(&record)
        .await
        .with_context(|| format!("failed to produce to topic {}", record.topic))?;
    Ok(())
}

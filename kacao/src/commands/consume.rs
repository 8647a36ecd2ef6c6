use std::future::Future;
use std::io::Write;

use anyhow::Context;
use clap::Args;

use crate::commands::{connect, Connector};
use crate::engine::{self, ConsumeRequest};
use crate::format::{self, TIMEOUT_NOTICE};
use crate::resolve::FlagOrEnvResolver;
use crate::types::TerminationReason;

#[derive(Args, Debug)]
pub struct ConsumeArgs {
    pub topic: String,

    /// Offset to start consuming from (latest, earliest, or by default the
    /// last committed offset of the consumer group)
    #[arg(short, long)]
    pub offset: Option<String>,

    /// Timeout in seconds to stop consuming messages. 0 means no timeout
    #[arg(short, long, allow_hyphen_values = true)]
    pub timeout: Option<String>,
}

pub async fn consume<S, W>(
    args: ConsumeArgs,
    resolver: &FlagOrEnvResolver<'_>,
    connector: &dyn Connector,
    signal: S,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
    W: Write,
{
    let request = ConsumeRequest::parse(
        &args.topic,
        args.offset.as_deref(),
        args.timeout.as_deref(),
    )?;

    let (client, group) = connect(resolver, connector)?;

    let outcome = engine::consume(client, &group, &request, signal, |record| {
        format::write_value_line(&mut *out, record)
    })
    .await
    .with_context(|| format!("failed to consume topic {}", request.topic))?;

    if outcome.reason == TerminationReason::DeadlineExceeded {
        writeln!(out, "{TIMEOUT_NOTICE}")?;
    }
    out.flush()?;
    Ok(())
}

use std::future::Future;
use std::io::Write;

use anyhow::Context;
use clap::Args;

use crate::commands::{connect, Connector};
use crate::engine::{self, RetrievalRequest, DEFAULT_LIMIT};
use crate::format;
use crate::resolve::FlagOrEnvResolver;

#[derive(Args, Debug)]
pub struct MessagesArgs {
    pub topic: String,

    /// Limit the number of messages to get
    #[arg(short, long, default_value_t = DEFAULT_LIMIT, allow_negative_numbers = true)]
    pub limit: i64,

    /// Filter messages by header, example: --header key=value. Use key=* to
    /// only require the header to be present
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Only keep messages with this key
    #[arg(short, long)]
    pub key: Option<String>,

    /// Stop fetching after this many seconds and print what arrived. 0 means no timeout
    #[arg(short, long, allow_hyphen_values = true)]
    pub timeout: Option<String>,
}

pub async fn messages<S, W>(
    args: MessagesArgs,
    resolver: &FlagOrEnvResolver<'_>,
    connector: &dyn Connector,
    signal: S,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
    W: Write,
{
    let request = RetrievalRequest::parse(
        &args.topic,
        args.limit,
        args.key,
        &args.headers,
        args.timeout.as_deref(),
    )?;

    let (client, group) = connect(resolver, connector)?;

    let outcome = engine::recent_messages(client, &group, &request, signal)
        .await
        .with_context(|| format!("failed to get messages from topic {}", request.topic))?;

    format::write_records(out, &outcome.records).context("failed to print messages")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::commands::tests::{config, run, FakeConnector};
    use crate::error::ValidationError;
    use crate::test::InMemoryCluster;

    #[tokio::test]
    async fn negative_timeout_is_rejected_before_connecting() {
        let connector = FakeConnector::new(InMemoryCluster::new("events", "kacao-cli", 1));

        let (result, out) = run(
            &["kacao", "get", "messages", "events", "-t", "-1"],
            &config(),
            &connector,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::Timeout("-1".to_string()))
        );
        assert_eq!(connector.connects(), 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn malformed_header_is_rejected_before_connecting() {
        let connector = FakeConnector::new(InMemoryCluster::new("events", "kacao-cli", 1));

        let (result, _) = run(
            &["kacao", "get", "messages", "events", "-H", "a=b=c"],
            &config(),
            &connector,
        )
        .await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid header format: a=b=c. Expected key=value"
        );
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn prints_newest_first() {
        let cluster = InMemoryCluster::new("events", "kacao-cli", 1);
        cluster.produce(0, None, "a", &[], 1_000);
        cluster.produce(0, Some("k"), "b", &[("source", "web")], 2_000);
        cluster.produce(0, None, "c", &[], 3_000);
        let connector = FakeConnector::new(cluster);

        let (result, out) = run(
            &["kacao", "get", "messages", "events", "-l", "3"],
            &config(),
            &connector,
        )
        .await;

        result.unwrap();
        assert_eq!(
            out,
            "Topic: events, Partition: 0, Offset: 2, Key: , Value: c\n\
             Topic: events, Partition: 0, Offset: 1, Key: k, Value: b\n\
             Header: source: web\n\
             Topic: events, Partition: 0, Offset: 0, Key: , Value: a\n"
        );
        assert_eq!(connector.cluster.close_count(), 1);
    }

    #[tokio::test]
    async fn unknown_topic_fails_with_context() {
        let connector = FakeConnector::new(InMemoryCluster::new("events", "kacao-cli", 1));

        let (result, out) = run(
            &["kacao", "get", "messages", "missing"],
            &config(),
            &connector,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "failed to get messages from topic missing");
        assert!(out.is_empty());
        assert_eq!(connector.cluster.close_count(), 1);
    }
}

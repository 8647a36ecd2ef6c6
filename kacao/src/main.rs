use std::future::Future;

use anyhow::Context;
use clap::Parser;
use envconfig::Envconfig;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use kacao::commands::{Cli, KafkaConnector};
use kacao::Config;

/// Resolves on the first SIGINT or SIGTERM. The handlers are installed
/// before this returns so an early Ctrl-C is not lost.
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()> + Send + 'static> {
    let mut term =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

    Ok(async move {
        tokio::select! {
            _ = term.recv() => info!("received SIGTERM"),
            _ = interrupt.recv() => info!("received SIGINT"),
        }
    })
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::init_from_env().context("invalid configuration")?;
    let connector = KafkaConnector::new(&config);
    let signal = shutdown_signal()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    cli.run(&config, &connector, signal, &mut out).await
}

#[tokio::main]
async fn main() {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::WARN.into())
                .from_env_lossy(),
        )
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");

        let mut causes = e.chain().skip(1).peekable();
        if causes.peek().is_some() {
            eprintln!("\nCaused by:");
            for (index, err) in causes.enumerate() {
                eprintln!("    {index}: {err}");
            }
        }
        std::process::exit(1);
    }
}

//! Entry points tying the pieces together for one command invocation:
//! plan → commit → poll → aggregate → order and filter.
//!
//! Both entry points take the consumer group explicitly and own the client
//! for their whole run. The client is closed exactly once on every way out,
//! including when the interrupt watcher closes it first.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::aggregator::RecordAggregator;
use crate::cancellation::CancellationController;
use crate::client::ClusterClient;
use crate::committer::{commit_plan, reposition};
use crate::error::{EngineError, ValidationError};
use crate::fetch_loop::FetchLoop;
use crate::filter::FilterSpec;
use crate::ordering::select_recent;
use crate::planner::plan_topic;
use crate::types::{ConsumeOutcome, OffsetReset, Record, RetrievalOutcome, TerminationReason};

pub const DEFAULT_LIMIT: i64 = 10;

/// A validated `get messages` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub topic: String,
    pub limit: i64,
    pub filter: FilterSpec,
    pub timeout: Option<Duration>,
}

impl RetrievalRequest {
    pub fn parse(
        topic: &str,
        limit: i64,
        key: Option<String>,
        headers: &[String],
        timeout: Option<&str>,
    ) -> Result<Self, ValidationError> {
        if limit <= 0 {
            return Err(ValidationError::Limit(limit));
        }
        Ok(Self {
            topic: topic.to_string(),
            limit,
            filter: FilterSpec::from_args(key, headers)?,
            timeout: parse_timeout(timeout)?,
        })
    }
}

/// A validated `consume` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub topic: String,
    pub offset_reset: OffsetReset,
    pub timeout: Option<Duration>,
}

impl ConsumeRequest {
    pub fn parse(
        topic: &str,
        offset: Option<&str>,
        timeout: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let offset_reset = match offset {
            None | Some("") => OffsetReset::Committed,
            Some(token) => token.parse()?,
        };
        Ok(Self {
            topic: topic.to_string(),
            offset_reset,
            timeout: parse_timeout(timeout)?,
        })
    }
}

/// Whole seconds, zero or more. Zero and absent both mean "no deadline".
pub fn parse_timeout(raw: Option<&str>) -> Result<Option<Duration>, ValidationError> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let seconds: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::Timeout(raw.to_string()))?;
    match seconds {
        s if s < 0 => Err(ValidationError::Timeout(raw.to_string())),
        0 => Ok(None),
        s => Ok(Some(Duration::from_secs(s as u64))),
    }
}

/// The engine's hold on the client. Closes it once, whoever asks first.
struct ClientGuard {
    client: Arc<dyn ClusterClient>,
    closed: AtomicBool,
}

impl ClientGuard {
    fn new(client: Arc<dyn ClusterClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.close();
        }
    }
}

/// Releases everything an invocation acquired when it goes out of scope.
struct Scope {
    guard: Arc<ClientGuard>,
    controller: CancellationController,
}

impl Scope {
    fn enter<S>(client: Arc<dyn ClusterClient>, timeout: Option<Duration>, signal: S) -> Self
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let guard = ClientGuard::new(client);
        let controller = CancellationController::new();

        let on_signal = guard.clone();
        controller.watch_signal(signal, move || on_signal.close());
        controller.arm_deadline(timeout);

        Self { guard, controller }
    }

    fn client(&self) -> &dyn ClusterClient {
        self.guard.client.as_ref()
    }

    /// Run a step that happens before polling starts, cut short by the
    /// deadline or the interrupt. A step that fails because the interrupt
    /// closed the client underneath it counts as stopped too.
    async fn before_polling<T, E, F>(&self, step: F) -> Result<Setup<T>, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::pin!(step);
        let finished = tokio::select! {
            biased;
            _ = self.controller.token().cancelled() => None,
            result = &mut step => Some(result),
        };
        let result = match (finished, self.stopped_early()) {
            (Some(result), _) => result,
            (None, Some(reason)) => return Ok(Setup::Stopped(reason)),
            (None, None) => step.await,
        };

        match (result, self.stopped_early()) {
            (Err(_), Some(reason)) => Ok(Setup::Stopped(reason)),
            (result, _) => result.map(Setup::Ready),
        }
    }

    fn stopped_early(&self) -> Option<TerminationReason> {
        match self.controller.reason() {
            Some(
                reason @ (TerminationReason::DeadlineExceeded | TerminationReason::SignalReceived),
            ) => Some(reason),
            _ => None,
        }
    }
}

enum Setup<T> {
    Ready(T),
    Stopped(TerminationReason),
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.controller.shutdown();
        self.guard.close();
    }
}

/// Fetch the `limit` most recent records of the topic, newest first, with
/// `request.filter` applied.
///
/// Moves `group`'s committed offsets on the topic to the planned start
/// positions. The deadline and interrupt only shorten the fetch; whatever was
/// collected by then is still ordered, filtered and returned.
#[instrument(skip_all, fields(topic = %request.topic, group = %group, limit = request.limit))]
pub async fn recent_messages<S>(
    client: Arc<dyn ClusterClient>,
    group: &str,
    request: &RetrievalRequest,
    signal: S,
) -> Result<RetrievalOutcome, EngineError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let scope = Scope::enter(client, request.timeout, signal);
    let client = scope.client();
    let topic = request.topic.as_str();

    let plans = match scope
        .before_polling(plan_topic(client, topic, request.limit))
        .await?
    {
        Setup::Ready(plans) => plans,
        Setup::Stopped(reason) => return Ok(RetrievalOutcome::stopped(reason)),
    };
    if let Setup::Stopped(reason) = scope
        .before_polling(commit_plan(client, group, topic, &plans))
        .await?
    {
        return Ok(RetrievalOutcome::stopped(reason));
    }

    let mut aggregator = RecordAggregator::new(&plans);
    let reason = FetchLoop::new(client, &scope.controller, topic)
        .run_bounded(&mut aggregator)
        .await?;

    let collected = aggregator.len();
    let records = select_recent(
        aggregator.into_records(),
        request.limit as usize,
        &request.filter,
    );
    info!(collected, returned = records.len(), reason = %reason, "Retrieved recent messages");

    Ok(RetrievalOutcome { records, reason })
}

/// Tail the topic, handing each record to `emit` in arrival order until the
/// deadline or the interrupt stops it.
#[instrument(skip_all, fields(topic = %request.topic, group = %group))]
pub async fn consume<S, F>(
    client: Arc<dyn ClusterClient>,
    group: &str,
    request: &ConsumeRequest,
    signal: S,
    emit: F,
) -> Result<ConsumeOutcome, EngineError>
where
    S: Future<Output = ()> + Send + 'static,
    F: FnMut(&Record) -> std::io::Result<()>,
{
    let scope = Scope::enter(client, request.timeout, signal);
    let client = scope.client();
    let topic = request.topic.as_str();

    if let Setup::Stopped(reason) = scope
        .before_polling(reposition(client, group, topic, request.offset_reset))
        .await?
    {
        info!(reason = %reason, "Stopped before consuming");
        return Ok(ConsumeOutcome { emitted: 0, reason });
    }

    let (emitted, reason) = FetchLoop::new(client, &scope.controller, topic)
        .run_tail(emit)
        .await?;
    info!(emitted, reason = %reason, "Stopped consuming");

    Ok(ConsumeOutcome { emitted, reason })
}

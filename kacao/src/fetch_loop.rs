//! The single cooperative poll loop.
//!
//! ```text
//! Idle -> Polling -> { Aggregating -> Polling | Done | Cancelled | FatalError }
//! ```
//!
//! The cancellation token is checked before each poll and again after it
//! returns. A poll error is only fatal when no stop was requested: once the
//! deadline has fired it means `Done`, once the signal watcher closed the
//! client it means `Cancelled`.

use metrics::counter;
use tracing::{debug, error, info, warn};

use crate::aggregator::RecordAggregator;
use crate::cancellation::CancellationController;
use crate::client::ClusterClient;
use crate::error::{ClientError, EngineError, PollError};
use crate::metrics_consts::{FETCH_LOOP_EXITS, RECORDS_EMITTED, RECORDS_KEPT};
use crate::types::{Record, TerminationReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    Aggregating,
    Done,
    Cancelled,
    FatalError,
}

/// What one poll attempt turned into.
enum Step {
    Batch(Vec<Record>),
    Stop(TerminationReason),
    Fatal(ClientError),
}

pub struct FetchLoop<'a> {
    client: &'a dyn ClusterClient,
    controller: &'a CancellationController,
    topic: &'a str,
    state: LoopState,
}

impl<'a> FetchLoop<'a> {
    pub fn new(
        client: &'a dyn ClusterClient,
        controller: &'a CancellationController,
        topic: &'a str,
    ) -> Self {
        Self {
            client,
            controller,
            topic,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Bounded mode: poll until every quota in `aggregator` is met or a stop
    /// is requested. Already collected records stay in `aggregator` either way.
    pub async fn run_bounded(
        &mut self,
        aggregator: &mut RecordAggregator,
    ) -> Result<TerminationReason, EngineError> {
        if aggregator.is_complete() {
            // nothing to read, e.g. every partition is empty
            return Ok(self.finish(LoopState::Done, TerminationReason::QuotaReached));
        }

        if let Some(reason) = self.start().await? {
            return Ok(reason);
        }

        loop {
            match self.next_step().await {
                Step::Batch(batch) => {
                    self.state = LoopState::Aggregating;
                    let polled = batch.len();
                    let kept = aggregator.extend(batch);
                    counter!(RECORDS_KEPT).increment(kept as u64);
                    debug!(
                        topic = self.topic,
                        polled,
                        kept,
                        collected = aggregator.len(),
                        "Aggregated batch"
                    );

                    if aggregator.is_complete() {
                        self.controller.stop(TerminationReason::QuotaReached);
                        return Ok(self.finish(LoopState::Done, TerminationReason::QuotaReached));
                    }
                    if let Some(reason) = self.stop_requested() {
                        return Ok(self.finish_stopped(reason));
                    }
                    self.state = LoopState::Polling;
                }
                Step::Stop(reason) => return Ok(self.finish_stopped(reason)),
                Step::Fatal(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Tail mode: hand every record to `emit` as it arrives until a stop is
    /// requested. Returns how many records were emitted.
    pub async fn run_tail<F>(&mut self, mut emit: F) -> Result<(u64, TerminationReason), EngineError>
    where
        F: FnMut(&Record) -> std::io::Result<()>,
    {
        if let Some(reason) = self.start().await? {
            return Ok((0, reason));
        }

        let mut emitted = 0u64;
        loop {
            match self.next_step().await {
                Step::Batch(batch) => {
                    for record in &batch {
                        emit(record)?;
                    }
                    emitted += batch.len() as u64;
                    counter!(RECORDS_EMITTED).increment(batch.len() as u64);

                    if let Some(reason) = self.stop_requested() {
                        return Ok((emitted, self.finish_stopped(reason)));
                    }
                }
                Step::Stop(reason) => return Ok((emitted, self.finish_stopped(reason))),
                Step::Fatal(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Subscribe and move to `Polling`. Returns the stop reason instead when
    /// a stop arrived before or during the subscribe.
    async fn start(&mut self) -> Result<Option<TerminationReason>, EngineError> {
        debug_assert_eq!(self.state, LoopState::Idle);
        if let Some(reason) = self.stop_requested() {
            return Ok(Some(self.finish_stopped(reason)));
        }
        if let Err(source) = self.client.subscribe(self.topic).await {
            if let Some(reason) = self.stopped_externally() {
                debug!(error = %source, "Subscribe failed after a stop was requested");
                return Ok(Some(self.finish_stopped(reason)));
            }
            self.state = LoopState::FatalError;
            self.controller.stop(TerminationReason::FetchError);
            return Err(EngineError::Subscribe {
                topic: self.topic.to_string(),
                source,
            });
        }
        info!(topic = self.topic, "Polling for records");
        self.state = LoopState::Polling;
        Ok(None)
    }

    async fn next_step(&mut self) -> Step {
        if let Some(reason) = self.stop_requested() {
            return Step::Stop(reason);
        }

        match self.client.poll(self.controller.token()).await {
            Ok(batch) => Step::Batch(batch),
            // the signal watcher records its reason before it closes the client
            Err(PollError::Cancelled) | Err(PollError::Closed) => match self.controller.reason() {
                Some(reason) => Step::Stop(reason),
                None => Step::Fatal(ClientError::Closed),
            },
            // the error is a consequence of the stop, not a broker failure
            Err(PollError::Fetch(e)) => match self.stopped_externally() {
                Some(reason) => {
                    debug!(error = %e, "Poll failed after a stop was requested");
                    Step::Stop(reason)
                }
                None => Step::Fatal(e),
            },
        }
    }

    /// The deadline or the signal, if either has fired.
    fn stopped_externally(&self) -> Option<TerminationReason> {
        match self.controller.reason() {
            Some(
                reason @ (TerminationReason::DeadlineExceeded | TerminationReason::SignalReceived),
            ) => Some(reason),
            _ => None,
        }
    }

    /// The recorded reason, if a stop was requested. A cancelled token with
    /// no recorded reason means the engine is tearing down and counts as
    /// nothing to report.
    fn stop_requested(&self) -> Option<TerminationReason> {
        if !self.controller.is_stopped() {
            return None;
        }
        self.controller.reason()
    }

    fn finish_stopped(&mut self, reason: TerminationReason) -> TerminationReason {
        let state = match reason {
            TerminationReason::SignalReceived => LoopState::Cancelled,
            TerminationReason::FetchError => LoopState::FatalError,
            TerminationReason::QuotaReached | TerminationReason::DeadlineExceeded => {
                LoopState::Done
            }
        };
        if reason == TerminationReason::DeadlineExceeded {
            warn!(topic = self.topic, "Timeout reached, stopping consumer");
        }
        self.finish(state, reason)
    }

    fn finish(&mut self, state: LoopState, reason: TerminationReason) -> TerminationReason {
        self.state = state;
        counter!(FETCH_LOOP_EXITS, "reason" => reason.as_str()).increment(1);
        info!(topic = self.topic, reason = %reason, "Fetch loop finished");
        reason
    }

    fn fail(&mut self, e: ClientError) -> EngineError {
        self.controller.stop(TerminationReason::FetchError);
        self.state = LoopState::FatalError;
        counter!(FETCH_LOOP_EXITS, "reason" => TerminationReason::FetchError.as_str()).increment(1);
        error!(topic = self.topic, error = %e, "Fatal fetch error");
        EngineError::Fetch(e)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::test::InMemoryCluster;
    use crate::types::{ListedOffset, PartitionOffsetPlan};

    const GROUP: &str = "kacao-cli";

    fn plan(partition: i32, start_offset: i64, quota: i64) -> PartitionOffsetPlan {
        PartitionOffsetPlan {
            partition,
            start_offset,
            quota,
        }
    }

    fn cluster_with(records_per_partition: i64, partitions: i32) -> InMemoryCluster {
        let cluster = InMemoryCluster::new("events", GROUP, partitions);
        for partition in 0..partitions {
            for i in 0..records_per_partition {
                cluster.produce(partition, None, &format!("{partition}-{i}"), &[], i);
            }
        }
        cluster
    }

    #[tokio::test]
    async fn bounded_run_stops_once_every_quota_is_met() {
        let cluster = cluster_with(3, 2);
        let controller = CancellationController::new();
        let mut aggregator = RecordAggregator::new(&[plan(0, 0, 3), plan(1, 0, 3)]);

        let mut fetch = FetchLoop::new(&cluster, &controller, "events");
        let reason = fetch.run_bounded(&mut aggregator).await.unwrap();

        assert_eq!(reason, TerminationReason::QuotaReached);
        assert_eq!(fetch.state(), LoopState::Done);
        assert_eq!(aggregator.len(), 6);
        assert_eq!(controller.reason(), Some(TerminationReason::QuotaReached));
    }

    #[tokio::test]
    async fn nothing_to_read_skips_subscribing() {
        let cluster = InMemoryCluster::new("events", GROUP, 2);
        let controller = CancellationController::new();
        let mut aggregator = RecordAggregator::new(&[plan(0, 0, 0), plan(1, 0, 0)]);

        let mut fetch = FetchLoop::new(&cluster, &controller, "events");
        let reason = fetch.run_bounded(&mut aggregator).await.unwrap();

        assert_eq!(reason, TerminationReason::QuotaReached);
        assert!(!cluster.is_subscribed());
        assert_eq!(cluster.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_keeps_what_was_collected() {
        // quota asks for more than the partition will ever hold
        let cluster = cluster_with(2, 1);
        let controller = CancellationController::new();
        controller.arm_deadline(Some(Duration::from_secs(2)));
        let mut aggregator = RecordAggregator::new(&[plan(0, 0, 5)]);

        let mut fetch = FetchLoop::new(&cluster, &controller, "events");
        let reason = fetch.run_bounded(&mut aggregator).await.unwrap();

        assert_eq!(reason, TerminationReason::DeadlineExceeded);
        assert_eq!(fetch.state(), LoopState::Done);
        assert_eq!(aggregator.len(), 2);
    }

    #[tokio::test]
    async fn poll_error_without_a_stop_is_fatal() {
        let cluster = cluster_with(2, 1);
        cluster.fail_next_poll(ClientError::Topic {
            topic: "events".to_string(),
            reason: "leader not available".to_string(),
        });
        let controller = CancellationController::new();
        let mut aggregator = RecordAggregator::new(&[plan(0, 0, 2)]);

        let mut fetch = FetchLoop::new(&cluster, &controller, "events");
        let err = fetch.run_bounded(&mut aggregator).await.unwrap_err();

        assert!(matches!(err, EngineError::Fetch(ClientError::Topic { .. })));
        assert_eq!(fetch.state(), LoopState::FatalError);
        assert_eq!(controller.reason(), Some(TerminationReason::FetchError));
    }

    /// Records `reason` and then fails, the way a broker call fails when the
    /// deadline or the signal watcher lands in the middle of it.
    struct StopsMidCall {
        controller: CancellationController,
        reason: TerminationReason,
        during_subscribe: bool,
    }

    impl StopsMidCall {
        fn stop_and_fail(&self) -> ClientError {
            self.controller.stop(self.reason);
            ClientError::Closed
        }
    }

    #[async_trait::async_trait]
    impl ClusterClient for StopsMidCall {
        async fn list_end_offsets(&self, _: &str) -> Result<Vec<ListedOffset>, ClientError> {
            Ok(Vec::new())
        }

        async fn list_start_offsets(&self, _: &str) -> Result<Vec<ListedOffset>, ClientError> {
            Ok(Vec::new())
        }

        async fn commit_offsets(&self, _: &str, _: &str, _: &[(i32, i64)]) -> Result<(), ClientError> {
            Ok(())
        }

        async fn subscribe(&self, _: &str) -> Result<(), ClientError> {
            if self.during_subscribe {
                return Err(self.stop_and_fail());
            }
            Ok(())
        }

        async fn poll(&self, _: &CancellationToken) -> Result<Vec<Record>, PollError> {
            Err(PollError::Fetch(self.stop_and_fail()))
        }

        fn close(&self) {}
    }

    #[tokio::test]
    async fn poll_error_after_a_deadline_is_not_fatal() {
        let controller = CancellationController::new();
        let client = StopsMidCall {
            controller: controller.clone(),
            reason: TerminationReason::DeadlineExceeded,
            during_subscribe: false,
        };
        let mut aggregator = RecordAggregator::new(&[plan(0, 0, 2)]);

        let mut fetch = FetchLoop::new(&client, &controller, "events");
        let reason = fetch.run_bounded(&mut aggregator).await.unwrap();

        assert_eq!(reason, TerminationReason::DeadlineExceeded);
        assert_eq!(fetch.state(), LoopState::Done);
    }

    #[tokio::test]
    async fn subscribe_error_after_a_signal_is_cancelled() {
        let controller = CancellationController::new();
        let client = StopsMidCall {
            controller: controller.clone(),
            reason: TerminationReason::SignalReceived,
            during_subscribe: true,
        };

        let mut fetch = FetchLoop::new(&client, &controller, "events");
        let (emitted, reason) = fetch.run_tail(|_| Ok(())).await.unwrap();

        assert_eq!(emitted, 0);
        assert_eq!(reason, TerminationReason::SignalReceived);
        assert_eq!(fetch.state(), LoopState::Cancelled);
    }

    #[tokio::test]
    async fn closed_client_after_a_signal_is_cancelled() {
        let cluster = cluster_with(0, 1);
        let controller = CancellationController::new();
        let mut aggregator = RecordAggregator::new(&[plan(0, 0, 1)]);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let cluster = std::sync::Arc::new(cluster);
        let closer = cluster.clone();
        controller.watch_signal(
            async move {
                rx.await.ok();
            },
            move || closer.close(),
        );

        let mut fetch = FetchLoop::new(cluster.as_ref(), &controller, "events");
        let run = fetch.run_bounded(&mut aggregator);
        tx.send(()).unwrap();
        let reason = run.await.unwrap();

        assert_eq!(reason, TerminationReason::SignalReceived);
        assert_eq!(fetch.state(), LoopState::Cancelled);
        assert_eq!(cluster.close_count(), 1);
        assert!(aggregator.is_empty());
    }

    #[tokio::test]
    async fn tail_emits_in_arrival_order_until_stopped() {
        let cluster = cluster_with(3, 1);
        let controller = CancellationController::new();
        let mut seen = Vec::new();

        let mut fetch = FetchLoop::new(&cluster, &controller, "events");
        let stopper = controller.clone();
        let (emitted, reason) = fetch
            .run_tail(|record| {
                seen.push(String::from_utf8_lossy(&record.value).into_owned());
                if seen.len() == 3 {
                    stopper.stop(TerminationReason::SignalReceived);
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(emitted, 3);
        assert_eq!(reason, TerminationReason::SignalReceived);
        assert_eq!(seen, vec!["0-0", "0-1", "0-2"]);
    }

    #[tokio::test]
    async fn stop_before_subscribing_skips_the_subscribe() {
        let cluster = cluster_with(1, 1);
        let controller = CancellationController::new();
        controller.stop(TerminationReason::SignalReceived);
        let mut aggregator = RecordAggregator::new(&[plan(0, 0, 1)]);

        let mut fetch = FetchLoop::new(&cluster, &controller, "events");
        let reason = fetch.run_bounded(&mut aggregator).await.unwrap();

        assert_eq!(reason, TerminationReason::SignalReceived);
        assert_eq!(fetch.state(), LoopState::Cancelled);
        assert!(!cluster.is_subscribed());
        assert_eq!(cluster.poll_count(), 0);
    }

    #[tokio::test]
    async fn subscribe_failure_never_polls() {
        let cluster = cluster_with(1, 1);
        cluster.close();
        let controller = CancellationController::new();
        let mut aggregator = RecordAggregator::new(&[plan(0, 0, 1)]);

        let mut fetch = FetchLoop::new(&cluster, &controller, "events");
        let err = fetch.run_bounded(&mut aggregator).await.unwrap_err();

        assert!(matches!(err, EngineError::Subscribe { .. }));
        assert_eq!(cluster.poll_count(), 0);
    }
}

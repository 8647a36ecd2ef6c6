use tracing::info;

use crate::client::ClusterClient;
use crate::error::{EngineError, PlanningError};
use crate::types::{ListedOffset, OffsetReset, PartitionOffsetPlan};

/// Commit the planned start offsets as `group`'s position on `topic`.
///
/// This moves a shared, named cursor: two invocations using the same group on
/// the same topic will overwrite each other's commits.
pub async fn commit_plan(
    client: &dyn ClusterClient,
    group: &str,
    topic: &str,
    plans: &[PartitionOffsetPlan],
) -> Result<(), EngineError> {
    let offsets: Vec<(i32, i64)> = plans.iter().map(|p| (p.partition, p.start_offset)).collect();
    commit(client, group, topic, &offsets).await
}

/// Apply a tail-mode reposition policy to `group` on `topic`.
pub async fn reposition(
    client: &dyn ClusterClient,
    group: &str,
    topic: &str,
    policy: OffsetReset,
) -> Result<(), EngineError> {
    let listed = match policy {
        OffsetReset::Committed => {
            info!(group, topic, "Resuming from committed offsets");
            return Ok(());
        }
        OffsetReset::Earliest => client.list_start_offsets(topic).await,
        OffsetReset::Latest => client.list_end_offsets(topic).await,
    }
    .map_err(|source| PlanningError::Listing {
        topic: topic.to_string(),
        source,
    })?;

    let offsets = positions(topic, &listed)?;
    info!(group, topic, policy = ?policy, "Repositioning consumer group");
    commit(client, group, topic, &offsets).await
}

fn positions(topic: &str, listed: &[ListedOffset]) -> Result<Vec<(i32, i64)>, PlanningError> {
    if listed.is_empty() {
        return Err(PlanningError::UnknownTopic(topic.to_string()));
    }
    listed
        .iter()
        .map(|l| match &l.error {
            Some(reason) => Err(PlanningError::Partition {
                topic: topic.to_string(),
                partition: l.partition,
                reason: reason.clone(),
            }),
            None => Ok((l.partition, l.offset.max(0))),
        })
        .collect()
}

async fn commit(
    client: &dyn ClusterClient,
    group: &str,
    topic: &str,
    offsets: &[(i32, i64)],
) -> Result<(), EngineError> {
    client
        .commit_offsets(group, topic, offsets)
        .await
        .map_err(|source| EngineError::Commit {
            group: group.to_string(),
            source,
        })
}

use tracing::{debug, info};

use crate::client::ClusterClient;
use crate::error::PlanningError;
use crate::types::{ListedOffset, PartitionOffsetPlan};

/// Work out where each partition starts and how many records it contributes
/// so that the last `limit` records of every partition get read.
///
/// Any per-partition listing error fails the whole plan, as does a topic with
/// no partitions at all.
pub fn plan_offsets(
    topic: &str,
    limit: i64,
    end_offsets: &[ListedOffset],
) -> Result<Vec<PartitionOffsetPlan>, PlanningError> {
    if end_offsets.is_empty() {
        return Err(PlanningError::UnknownTopic(topic.to_string()));
    }

    let mut plans = Vec::with_capacity(end_offsets.len());
    for listed in end_offsets {
        if let Some(reason) = &listed.error {
            return Err(PlanningError::Partition {
                topic: topic.to_string(),
                partition: listed.partition,
                reason: reason.clone(),
            });
        }

        let end = listed.offset.max(0);
        let start = end - limit;
        let plan = if start < 0 {
            // fewer than `limit` records exist, take all of them
            PartitionOffsetPlan {
                partition: listed.partition,
                start_offset: 0,
                quota: end,
            }
        } else {
            PartitionOffsetPlan {
                partition: listed.partition,
                start_offset: start,
                quota: limit,
            }
        };
        debug!(
            topic,
            partition = plan.partition,
            end,
            start = plan.start_offset,
            quota = plan.quota,
            "Planned partition"
        );
        plans.push(plan);
    }

    plans.sort_by_key(|p| p.partition);
    Ok(plans)
}

/// List the end offsets of `topic` and plan against them.
pub async fn plan_topic(
    client: &dyn ClusterClient,
    topic: &str,
    limit: i64,
) -> Result<Vec<PartitionOffsetPlan>, PlanningError> {
    let end_offsets =
        client
            .list_end_offsets(topic)
            .await
            .map_err(|source| PlanningError::Listing {
                topic: topic.to_string(),
                source,
            })?;

    let plans = plan_offsets(topic, limit, &end_offsets)?;
    info!(
        topic,
        partitions = plans.len(),
        total_quota = plans.iter().map(|p| p.quota).sum::<i64>(),
        "Planned offsets"
    );
    Ok(plans)
}

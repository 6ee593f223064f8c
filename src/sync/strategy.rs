use std::sync::Arc;

use crate::remote::{RelayTarget, RemoteContent, RemoteError};
use crate::retry::{self, RetryPolicy};
use crate::state::TransferStrategy;
use crate::types::ChatId;

/// Picks a transfer strategy for a source by probing it once.
pub struct StrategyResolver {
    remote: Arc<dyn RemoteContent>,
    policy: RetryPolicy,
}

impl StrategyResolver {
    pub fn new(remote: Arc<dyn RemoteContent>, policy: RetryPolicy) -> Self {
        Self { remote, policy }
    }

    /// Return `force` when given. Otherwise relay the source's latest item
    /// to the scratch chat: success means direct relay works, anything else
    /// falls back to staging. Probe errors never fail the job.
    pub async fn resolve(
        &self,
        source: ChatId,
        force: Option<TransferStrategy>,
    ) -> TransferStrategy {
        if let Some(strategy) = force {
            tracing::info!(source, strategy = %strategy, "Using forced transfer strategy");
            return strategy;
        }

        let latest = match retry::execute(&self.policy, || self.remote.latest_item(source)).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::info!(source, "Source is empty, defaulting to stage-and-relay");
                return TransferStrategy::StageAndRelay;
            }
            Err(e) => {
                tracing::warn!(source, error = %e, "Could not fetch latest item for probing, defaulting to stage-and-relay");
                return TransferStrategy::StageAndRelay;
            }
        };

        let probe = retry::execute(&self.policy, || {
            self.remote.relay(source, latest.id, RelayTarget::Scratch)
        })
        .await;

        match probe {
            Ok(_) => {
                tracing::info!(source, probe_item = latest.id, "Direct relay allowed");
                TransferStrategy::Direct
            }
            Err(RemoteError::RelayRestricted(reason)) => {
                tracing::info!(source, %reason, "Source restricts relaying, staging items locally");
                TransferStrategy::StageAndRelay
            }
            Err(e) => {
                tracing::warn!(source, error = %e, "Relay probe failed, defaulting to stage-and-relay");
                TransferStrategy::StageAndRelay
            }
        }
    }
}

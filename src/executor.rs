//! Batch executor: applies policy to the candidate list and drives each
//! selected account through its lifecycle.
//!
//! Per-account lifecycle: `Candidate -> Verifying -> {Skipped, Unfollowing}
//! -> {Unfollowed, Failed}`. Failures are isolated to their account; only
//! rate-limit exhaustion cuts the batch short, and only storage failures
//! abort the run.

use crate::config::Config;
use crate::engine;
use crate::error::Result;
use crate::github::SocialGraph;
use crate::model::{Account, ActionOutcome, BatchReport, UnfollowReason};
use crate::storage::Storage;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

/// Delay, quota, and safety knobs for one batch run. Passed in explicitly;
/// the executor holds no ambient state.
#[derive(Debug, Clone)]
pub struct ActionPolicy {
    /// Hard cap on accounts processed in this run.
    pub max_per_run: usize,
    /// Pause between consecutive live actions.
    pub request_delay: Duration,
    /// Simulate only: no API calls, no store mutation.
    pub dry_run: bool,
    /// Re-check reciprocity and edge existence before each unfollow.
    pub verify: bool,
    /// Requests held in reserve when budgeting against the rate limit.
    pub rate_limit_floor: u32,
}

impl ActionPolicy {
    /// Derive a policy from configuration plus the run's dry-run flag.
    #[must_use]
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            max_per_run: config.batch.max_unfollows_per_run,
            request_delay: Duration::from_millis(config.batch.request_delay_ms),
            dry_run,
            verify: config.batch.verify_before_unfollow,
            rate_limit_floor: config.batch.rate_limit_floor,
        }
    }

    /// Worst-case API requests per selected account under this policy.
    #[must_use]
    pub const fn requests_per_action(&self) -> u32 {
        if self.verify { 3 } else { 1 }
    }
}

/// Executes one bounded batch against the remote graph.
pub struct BatchExecutor<'a, G: SocialGraph + ?Sized> {
    graph: &'a G,
    policy: ActionPolicy,
}

impl<'a, G: SocialGraph + ?Sized> BatchExecutor<'a, G> {
    pub const fn new(graph: &'a G, policy: ActionPolicy) -> Self {
        Self { graph, policy }
    }

    /// Process a bounded prefix of the candidate list, in order.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal failures (storage); per-account API
    /// failures are recorded in the report instead.
    pub async fn run(&self, storage: &mut Storage, candidates: &[Account]) -> Result<BatchReport> {
        let limit = engine::batch_limit(
            self.policy.max_per_run,
            candidates.len(),
            self.graph.rate_limit(),
            self.policy.rate_limit_floor,
            self.policy.requests_per_action(),
        );
        let selected = &candidates[..limit];
        let mut report = BatchReport::new();

        info!(
            candidates = candidates.len(),
            selected = selected.len(),
            dry_run = self.policy.dry_run,
            "starting batch"
        );

        for (i, account) in selected.iter().enumerate() {
            if self.policy.dry_run {
                info!(login = %account.login, "dry run: would unfollow");
                report.push(&account.login, ActionOutcome::WouldUnfollow);
                continue;
            }

            match self.process(storage, account).await {
                Ok(outcome) => report.push(&account.login, outcome),
                Err(e) if e.is_rate_limited() => {
                    warn!(login = %account.login, "rate limit exhausted, halting batch");
                    report.push(&account.login, ActionOutcome::Failed(e.to_string()));
                    report.halted = true;
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(login = %account.login, error = %e, "unfollow failed, will retry next run");
                    report.push(&account.login, ActionOutcome::Failed(e.to_string()));
                }
            }

            if i + 1 < selected.len() {
                tokio::time::sleep(self.policy.request_delay).await;
            }
        }

        Ok(report)
    }

    /// One account through the verify-then-unfollow flow.
    async fn process(&self, storage: &mut Storage, account: &Account) -> Result<ActionOutcome> {
        if self.policy.verify {
            // Snapshots are point-in-time; the graph may have moved since.
            if self.graph.is_following_me(&account.login).await? {
                info!(login = %account.login, "now follows back, skipping");
                return Ok(ActionOutcome::Skipped);
            }
            if !self.graph.is_followed_by_me(&account.login).await? {
                info!(login = %account.login, "follow edge already gone, recording");
                storage.mark_unfollowed(account, UnfollowReason::AlreadyUnfollowed, Utc::now())?;
                return Ok(ActionOutcome::Unfollowed(UnfollowReason::AlreadyUnfollowed));
            }
        }

        match self.graph.unfollow(&account.login).await {
            Ok(()) => {
                storage.mark_unfollowed(account, UnfollowReason::NotFollowingBack, Utc::now())?;
                info!(login = %account.login, "unfollowed");
                Ok(ActionOutcome::Unfollowed(UnfollowReason::NotFollowingBack))
            }
            Err(crate::error::PruneError::NotFound { .. }) => {
                // Account deleted or renamed upstream; the edge is gone
                // either way.
                storage.mark_unfollowed(account, UnfollowReason::AccountGone, Utc::now())?;
                info!(login = %account.login, "account gone, recorded as unfollowed");
                Ok(ActionOutcome::Unfollowed(UnfollowReason::AccountGone))
            }
            Err(e) => Err(e),
        }
    }
}

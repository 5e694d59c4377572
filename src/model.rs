//! Data models for the locally cached GitHub social graph.
//!
//! Everything the core components exchange is one of these fixed value
//! types; raw API response shapes never leave the client boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GitHub account as observed in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
    pub user_id: i64,
    /// When this account first entered the set. Survives snapshot
    /// replacement; candidate ordering depends on it.
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Account {
    /// Build an account observed right now (first and last seen coincide).
    #[must_use]
    pub fn observed(login: impl Into<String>, user_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            login: login.into(),
            user_id,
            first_seen: at,
            last_seen: at,
        }
    }
}

/// Why an account ended up in the unfollowed history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnfollowReason {
    /// Normal case: the account never followed back.
    NotFollowingBack,
    /// The remote account no longer exists (404 on unfollow).
    AccountGone,
    /// The re-verify step found the follow edge already absent.
    AlreadyUnfollowed,
}

impl UnfollowReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFollowingBack => "not-following-back",
            Self::AccountGone => "account-gone",
            Self::AlreadyUnfollowed => "already-unfollowed",
        }
    }
}

impl std::fmt::Display for UnfollowReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UnfollowReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-following-back" => Ok(Self::NotFollowingBack),
            "account-gone" => Ok(Self::AccountGone),
            "already-unfollowed" => Ok(Self::AlreadyUnfollowed),
            _ => Err(format!("unknown unfollow reason: {s}")),
        }
    }
}

/// One row of the append-only unfollow history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnfollowRecord {
    pub login: String,
    pub user_id: i64,
    pub unfollowed_at: DateTime<Utc>,
    pub reason: UnfollowReason,
}

/// What a single invocation was doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Sync,
    Unfollow,
    DryRun,
}

impl RunMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Unfollow => "unfollow",
            Self::DryRun => "dry-run",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "unfollow" => Ok(Self::Unfollow),
            "dry-run" => Ok(Self::DryRun),
            _ => Err(format!("unknown run mode: {s}")),
        }
    }
}

/// Terminal status of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// The run processed everything it selected.
    Completed,
    /// Rate-limit exhaustion cut the batch short; the remainder stays
    /// eligible for the next run.
    PartialBatch,
    /// The run aborted on a fatal error.
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartialBatch => "partial-batch",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "partial-batch" => Ok(Self::PartialBatch),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown run status: {s}")),
        }
    }
}

/// One row of the run log: a summary of a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub mode: RunMode,
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
    pub status: RunStatus,
    pub details: Option<String>,
}

/// Remaining-quota metadata reported by the API on every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

/// Aggregate view of the stored graph, for the stats command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub following: i64,
    pub followers: i64,
    pub unfollowed: i64,
    pub candidates: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl GraphStats {
    /// Followers per account followed, in [0, 1] for the usual case.
    #[must_use]
    pub fn follow_ratio(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.followers as f64 / self.following.max(1) as f64
        }
    }
}

/// Terminal state of one account's trip through the batch executor.
///
/// Lifecycle: `Candidate -> Verifying -> {Skipped, Unfollowing} ->
/// {Unfollowed, Failed}`; dry runs short-circuit to `WouldUnfollow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "state", content = "detail")]
pub enum ActionOutcome {
    /// Dry run only: no call was made, no state was touched.
    WouldUnfollow,
    /// The re-verify step found the account now follows back.
    Skipped,
    Unfollowed(UnfollowReason),
    /// Retryable failure; the account stays eligible next run.
    Failed(String),
}

/// One processed account inside a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAction {
    pub login: String,
    pub outcome: ActionOutcome,
}

/// Everything a batch run did, account by account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub actions: Vec<AccountAction>,
    /// True when rate-limit exhaustion terminated the batch early.
    pub halted: bool,
}

impl BatchReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, login: impl Into<String>, outcome: ActionOutcome) {
        self.actions.push(AccountAction {
            login: login.into(),
            outcome,
        });
    }

    #[must_use]
    pub fn attempted(&self) -> u32 {
        u32::try_from(self.actions.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn succeeded(&self) -> u32 {
        self.count(|o| matches!(o, ActionOutcome::Unfollowed(_)))
    }

    #[must_use]
    pub fn failed(&self) -> u32 {
        self.count(|o| matches!(o, ActionOutcome::Failed(_)))
    }

    #[must_use]
    pub fn skipped(&self) -> u32 {
        self.count(|o| matches!(o, ActionOutcome::Skipped))
    }

    /// Logins a dry run would have unfollowed, in batch order.
    pub fn would_unfollow(&self) -> impl Iterator<Item = &str> {
        self.actions
            .iter()
            .filter(|a| a.outcome == ActionOutcome::WouldUnfollow)
            .map(|a| a.login.as_str())
    }

    #[must_use]
    pub const fn status(&self) -> RunStatus {
        if self.halted {
            RunStatus::PartialBatch
        } else {
            RunStatus::Completed
        }
    }

    /// Collapse this report into one run-log row.
    #[must_use]
    pub fn into_run_record(
        self,
        started_at: DateTime<Utc>,
        mode: RunMode,
        details: Option<String>,
    ) -> RunRecord {
        RunRecord {
            started_at,
            mode,
            attempted: self.attempted(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            skipped: self.skipped(),
            status: self.status(),
            details,
        }
    }

    fn count(&self, pred: impl Fn(&ActionOutcome) -> bool) -> u32 {
        u32::try_from(self.actions.iter().filter(|a| pred(&a.outcome)).count()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_round_trips_through_strings() {
        for reason in [
            UnfollowReason::NotFollowingBack,
            UnfollowReason::AccountGone,
            UnfollowReason::AlreadyUnfollowed,
        ] {
            let parsed: UnfollowReason = reason.as_str().parse().unwrap();
            assert_eq!(parsed, reason);
        }
        assert!("nope".parse::<UnfollowReason>().is_err());
    }

    #[test]
    fn mode_and_status_round_trip() {
        for mode in [RunMode::Sync, RunMode::Unfollow, RunMode::DryRun] {
            assert_eq!(mode.as_str().parse::<RunMode>().unwrap(), mode);
        }
        for status in [
            RunStatus::Completed,
            RunStatus::PartialBatch,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
    }

    #[test]
    fn report_counts_by_outcome() {
        let mut report = BatchReport::new();
        report.push("a", ActionOutcome::Unfollowed(UnfollowReason::NotFollowingBack));
        report.push("b", ActionOutcome::Skipped);
        report.push("c", ActionOutcome::Failed("503".into()));
        report.push("d", ActionOutcome::Unfollowed(UnfollowReason::AccountGone));

        assert_eq!(report.attempted(), 4);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.status(), RunStatus::Completed);
    }

    #[test]
    fn halted_report_is_a_partial_batch() {
        let mut report = BatchReport::new();
        report.push("a", ActionOutcome::Failed("rate limited".into()));
        report.halted = true;

        let record = report.into_run_record(Utc::now(), RunMode::Unfollow, None);
        assert_eq!(record.status, RunStatus::PartialBatch);
        assert_eq!(record.attempted, 1);
        assert_eq!(record.failed, 1);
    }

    #[test]
    fn would_unfollow_preserves_batch_order() {
        let mut report = BatchReport::new();
        report.push("zed", ActionOutcome::WouldUnfollow);
        report.push("amy", ActionOutcome::WouldUnfollow);
        let logins: Vec<_> = report.would_unfollow().collect();
        assert_eq!(logins, vec!["zed", "amy"]);
    }

    #[test]
    fn follow_ratio_handles_zero_following() {
        let stats = GraphStats {
            following: 0,
            followers: 10,
            unfollowed: 0,
            candidates: 0,
            last_synced_at: None,
        };
        assert!((stats.follow_ratio() - 10.0).abs() < f64::EPSILON);
    }
}

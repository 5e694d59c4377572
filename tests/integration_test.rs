//! Integration tests for ghprune.
//!
//! These tests verify end-to-end behaviour of the core flow with a
//! scripted in-memory graph in place of the GitHub API:
//! - Sync into the state store, including the all-or-nothing guarantee
//! - Candidate derivation and ordering
//! - Batch execution: quota, dry-run, re-verify, and rate-limit handling

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ghprune::{
    ActionPolicy, BatchExecutor, SocialGraph, engine,
    error::{PruneError, Result},
    model::{Account, RateLimit, RunMode, RunStatus},
    storage::Storage,
    sync::sync_graph,
};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).single().unwrap()
}

fn accounts(logins: &[&str]) -> Vec<Account> {
    logins
        .iter()
        .enumerate()
        .map(|(i, login)| Account::observed(*login, i as i64 + 1, t0()))
        .collect()
}

/// Scripted stand-in for the GitHub API.
struct ScriptedGraph {
    following: Vec<Account>,
    followers: Vec<Account>,
    /// Logins that follow the acting user at verify time.
    follows_me_now: HashSet<String>,
    /// Unfollowing any of these reports rate-limit exhaustion.
    rate_limited: HashSet<String>,
    fail_following_fetch: bool,
    fail_followers_fetch: bool,
    unfollow_calls: Mutex<Vec<String>>,
}

impl ScriptedGraph {
    fn new(following: &[&str], followers: &[&str]) -> Self {
        Self {
            following: accounts(following),
            followers: accounts(followers),
            follows_me_now: HashSet::new(),
            rate_limited: HashSet::new(),
            fail_following_fetch: false,
            fail_followers_fetch: false,
            unfollow_calls: Mutex::new(Vec::new()),
        }
    }

    fn unfollowed(&self) -> Vec<String> {
        self.unfollow_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SocialGraph for ScriptedGraph {
    async fn list_following(&self) -> Result<Vec<Account>> {
        if self.fail_following_fetch {
            // What a pagination failure on a later page looks like from the
            // caller's side: the set could not be fetched to exhaustion.
            return Err(PruneError::api("listing following", 502, "bad gateway"));
        }
        Ok(self.following.clone())
    }

    async fn list_followers(&self) -> Result<Vec<Account>> {
        if self.fail_followers_fetch {
            return Err(PruneError::api("listing followers", 502, "bad gateway"));
        }
        Ok(self.followers.clone())
    }

    async fn unfollow(&self, login: &str) -> Result<()> {
        self.unfollow_calls.lock().unwrap().push(login.to_string());
        if self.rate_limited.contains(login) {
            return Err(PruneError::rate_limited(None));
        }
        Ok(())
    }

    async fn is_following_me(&self, login: &str) -> Result<bool> {
        Ok(self.follows_me_now.contains(login))
    }

    async fn is_followed_by_me(&self, login: &str) -> Result<bool> {
        Ok(self.following.iter().any(|a| a.login == login))
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        None
    }
}

fn policy(dry_run: bool) -> ActionPolicy {
    ActionPolicy {
        max_per_run: 50,
        request_delay: Duration::ZERO,
        dry_run,
        verify: true,
        rate_limit_floor: 100,
    }
}

#[tokio::test]
async fn sync_then_candidates_matches_the_set_difference() {
    let mut storage = Storage::open_memory().unwrap();
    let graph = ScriptedGraph::new(&["alpha", "bravo", "charlie"], &["bravo"]);

    let summary = sync_graph(&graph, &mut storage).await.unwrap();
    assert_eq!(summary.following, 3);
    assert_eq!(summary.followers, 1);

    let candidates: Vec<_> = engine::eligible_candidates(&storage)
        .unwrap()
        .into_iter()
        .map(|a| a.login)
        .collect();
    assert_eq!(candidates, vec!["alpha", "charlie"]);
}

#[tokio::test]
async fn quota_of_one_processes_only_the_first_candidate() {
    let mut storage = Storage::open_memory().unwrap();
    let graph = ScriptedGraph::new(&["alpha", "bravo", "charlie"], &["bravo"]);
    sync_graph(&graph, &mut storage).await.unwrap();

    let candidates = engine::eligible_candidates(&storage).unwrap();
    let mut limited = policy(false);
    limited.max_per_run = 1;

    let report = BatchExecutor::new(&graph, limited)
        .run(&mut storage, &candidates)
        .await
        .unwrap();

    assert_eq!(report.attempted(), 1);
    assert_eq!(graph.unfollowed(), vec!["alpha"]);

    // charlie remains a candidate for the next run
    let next: Vec<_> = engine::eligible_candidates(&storage)
        .unwrap()
        .into_iter()
        .map(|a| a.login)
        .collect();
    assert_eq!(next, vec!["charlie"]);
}

#[tokio::test]
async fn rate_limited_first_attempt_terminates_with_a_partial_batch() {
    let mut storage = Storage::open_memory().unwrap();
    let mut graph = ScriptedGraph::new(&["alpha", "bravo"], &[]);
    graph.rate_limited.insert("alpha".to_string());
    sync_graph(&graph, &mut storage).await.unwrap();

    let candidates = engine::eligible_candidates(&storage).unwrap();
    let started = Utc::now();
    let report = BatchExecutor::new(&graph, policy(false))
        .run(&mut storage, &candidates)
        .await
        .unwrap();

    assert!(report.halted);
    assert_eq!(report.attempted(), 1);
    assert_eq!(graph.unfollowed(), vec!["alpha"]);

    // The run log records the partial batch.
    let record = report.into_run_record(started, RunMode::Unfollow, None);
    storage.record_run(&record).unwrap();
    let runs = storage.recent_runs(1).unwrap();
    assert_eq!(runs[0].status, RunStatus::PartialBatch);

    // alpha was not marked unfollowed and stays eligible.
    assert!(!storage.is_unfollowed("alpha").unwrap());
    let next: Vec<_> = engine::eligible_candidates(&storage)
        .unwrap()
        .into_iter()
        .map(|a| a.login)
        .collect();
    assert_eq!(next, vec!["alpha", "bravo"]);
}

#[tokio::test]
async fn dry_run_leaves_the_store_identical() {
    let mut storage = Storage::open_memory().unwrap();
    let graph = ScriptedGraph::new(&["alpha", "bravo", "charlie"], &["charlie"]);
    sync_graph(&graph, &mut storage).await.unwrap();

    let following_before = storage.following_logins().unwrap();
    let followers_before = storage.followers_logins().unwrap();

    let candidates = engine::eligible_candidates(&storage).unwrap();
    let report = BatchExecutor::new(&graph, policy(true))
        .run(&mut storage, &candidates)
        .await
        .unwrap();

    assert_eq!(report.would_unfollow().count(), 2);
    assert!(graph.unfollowed().is_empty());
    assert_eq!(storage.following_logins().unwrap(), following_before);
    assert_eq!(storage.followers_logins().unwrap(), followers_before);
    assert_eq!(storage.stats().unwrap().unfollowed, 0);
}

#[tokio::test]
async fn account_that_follows_back_since_the_snapshot_is_skipped() {
    let mut storage = Storage::open_memory().unwrap();
    let mut graph = ScriptedGraph::new(&["alpha", "bravo"], &[]);
    // alpha started following between the sync and the batch.
    graph.follows_me_now.insert("alpha".to_string());
    sync_graph(&graph, &mut storage).await.unwrap();

    let candidates = engine::eligible_candidates(&storage).unwrap();
    let report = BatchExecutor::new(&graph, policy(false))
        .run(&mut storage, &candidates)
        .await
        .unwrap();

    assert_eq!(report.skipped(), 1);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(graph.unfollowed(), vec!["bravo"]);
    // Skipped, never Unfollowed: alpha is untouched in the store.
    assert!(!storage.is_unfollowed("alpha").unwrap());
    assert!(
        storage
            .following_logins()
            .unwrap()
            .contains(&"alpha".to_string())
    );
}

#[tokio::test]
async fn incomplete_fetch_leaves_both_snapshots_at_their_pre_sync_values() {
    let mut storage = Storage::open_memory().unwrap();
    let graph = ScriptedGraph::new(&["alpha", "bravo"], &["bravo"]);
    sync_graph(&graph, &mut storage).await.unwrap();

    let following_before = storage.following_logins().unwrap();
    let followers_before = storage.followers_logins().unwrap();
    let stamp_before = storage.last_synced_at().unwrap();

    // The remote moved on, but the following fetch dies partway.
    let mut flaky = ScriptedGraph::new(&["alpha", "bravo", "delta"], &["delta"]);
    flaky.fail_following_fetch = true;
    let err = sync_graph(&flaky, &mut storage).await.unwrap_err();
    assert!(matches!(err, PruneError::SyncIncomplete { .. }));

    // Nothing was overwritten: both sets keep their pre-sync values exactly.
    assert_eq!(storage.following_logins().unwrap(), following_before);
    assert_eq!(storage.followers_logins().unwrap(), followers_before);
    assert_eq!(storage.last_synced_at().unwrap(), stamp_before);
}

#[tokio::test]
async fn sync_is_all_or_nothing_per_set() {
    let mut storage = Storage::open_memory().unwrap();
    let graph = ScriptedGraph::new(&["alpha", "bravo"], &["bravo"]);
    sync_graph(&graph, &mut storage).await.unwrap();
    let followers_before = storage.followers_logins().unwrap();
    let stamp_before = storage.last_synced_at().unwrap();

    // The following list fetches fully and lands; the followers fetch
    // fails, so its set (and the sync timestamp) stay put.
    let mut flaky = ScriptedGraph::new(&["alpha", "bravo", "delta"], &["delta"]);
    flaky.fail_followers_fetch = true;
    let err = sync_graph(&flaky, &mut storage).await.unwrap_err();
    assert!(matches!(
        err,
        PruneError::SyncIncomplete {
            set: "followers",
            ..
        }
    ));

    assert_eq!(
        storage.following_logins().unwrap(),
        vec!["alpha", "bravo", "delta"]
    );
    assert_eq!(storage.followers_logins().unwrap(), followers_before);
    assert_eq!(storage.last_synced_at().unwrap(), stamp_before);
}

#[tokio::test]
async fn unfollowed_accounts_are_never_reselected_after_a_resync() {
    let mut storage = Storage::open_memory().unwrap();
    let graph = ScriptedGraph::new(&["alpha", "bravo"], &[]);
    sync_graph(&graph, &mut storage).await.unwrap();

    let candidates = engine::eligible_candidates(&storage).unwrap();
    let mut limited = policy(false);
    limited.max_per_run = 1;
    BatchExecutor::new(&graph, limited)
        .run(&mut storage, &candidates)
        .await
        .unwrap();
    assert!(storage.is_unfollowed("alpha").unwrap());

    // A lagging remote still lists alpha in following. The history must
    // keep it out of the candidate set regardless.
    sync_graph(&graph, &mut storage).await.unwrap();
    let next: Vec<_> = engine::eligible_candidates(&storage)
        .unwrap()
        .into_iter()
        .map(|a| a.login)
        .collect();
    assert_eq!(next, vec!["bravo"]);
}

#[tokio::test]
async fn eligibility_is_idempotent_across_repeated_derivations() {
    let mut storage = Storage::open_memory().unwrap();
    let graph = ScriptedGraph::new(&["alpha", "bravo", "charlie", "delta"], &["bravo"]);
    sync_graph(&graph, &mut storage).await.unwrap();

    let first = engine::eligible_candidates(&storage).unwrap();
    let second = engine::eligible_candidates(&storage).unwrap();
    assert_eq!(first, second);

    let followers: HashSet<_> = storage.followers_logins().unwrap().into_iter().collect();
    let following: HashSet<_> = storage.following_logins().unwrap().into_iter().collect();
    for candidate in &first {
        assert!(following.contains(&candidate.login));
        assert!(!followers.contains(&candidate.login));
    }
}

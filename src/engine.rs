//! Eligibility engine: which accounts may be unfollowed in this run.
//!
//! Pure over the stored snapshots. Candidates are derived from the state
//! store only; nothing here talks to the API.

use crate::error::Result;
use crate::model::{Account, RateLimit};
use crate::storage::Storage;

/// The ordered candidate list: Following minus Followers minus Unfollowed,
/// oldest unreciprocated follow first.
///
/// A store that has never completed a sync yields an empty list rather
/// than an error; there is simply nothing to do yet.
///
/// # Errors
///
/// Returns an error only when the store itself fails.
pub fn eligible_candidates(storage: &Storage) -> Result<Vec<Account>> {
    if storage.last_synced_at()?.is_none() {
        return Ok(Vec::new());
    }
    storage.candidates()
}

/// Size of the batch prefix actually processed this run:
/// `min(quota, candidates, what the remaining rate budget can afford)`.
///
/// The budget keeps `floor` requests in reserve and charges
/// `requests_per_action` per selected account, so a verify-then-delete
/// flow never runs the quota to zero mid-account.
#[must_use]
pub fn batch_limit(
    quota: usize,
    candidates: usize,
    rate: Option<RateLimit>,
    floor: u32,
    requests_per_action: u32,
) -> usize {
    let per_action = requests_per_action.max(1);
    let budget = rate.map_or(usize::MAX, |r| {
        (r.remaining.saturating_sub(floor) / per_action) as usize
    });
    quota.min(candidates).min(budget)
}

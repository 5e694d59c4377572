//! Graph sync: refresh the stored snapshots from the remote graph.
//!
//! Each set is fetched completely into memory before anything is written,
//! so a pagination failure can never leave a half-replaced snapshot. The
//! last-sync timestamp moves only when both sets replaced successfully.

use crate::error::{PruneError, Result};
use crate::github::SocialGraph;
use crate::storage::Storage;
use chrono::Utc;
use tracing::info;

/// Counts from one completed sync.
#[derive(Debug, Clone, Copy)]
pub struct SyncSummary {
    pub following: usize,
    pub followers: usize,
}

/// Pull both sides of the graph and replace the stored snapshots.
///
/// # Errors
///
/// Returns [`PruneError::SyncIncomplete`] naming the set whose fetch
/// failed; that set's previous snapshot is left untouched. Storage errors
/// propagate as-is.
pub async fn sync_graph<G: SocialGraph + ?Sized>(
    graph: &G,
    storage: &mut Storage,
) -> Result<SyncSummary> {
    let seen_at = Utc::now();

    let following = graph
        .list_following()
        .await
        .map_err(|e| PruneError::sync_incomplete("following", e))?;
    storage.replace_following(&following, seen_at)?;
    info!(count = following.len(), "following snapshot replaced");

    let followers = graph
        .list_followers()
        .await
        .map_err(|e| PruneError::sync_incomplete("followers", e))?;
    storage.replace_followers(&followers, seen_at)?;
    info!(count = followers.len(), "followers snapshot replaced");

    storage.set_last_synced_at(Utc::now())?;

    Ok(SyncSummary {
        following: following.len(),
        followers: followers.len(),
    })
}

//! Custom error types for ghprune.
//!
//! One taxonomy shared by every component, so the batch executor can make
//! policy decisions (halt, skip, retry next run) by matching variants
//! instead of string-sniffing messages.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for ghprune operations.
#[derive(Error, Debug)]
pub enum PruneError {
    // =========================================================================
    // Remote API Errors
    // =========================================================================
    /// Network-level failure talking to the GitHub API. Retryable on a
    /// future run.
    #[error("GitHub request failed while {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status we don't otherwise map.
    #[error("GitHub returned HTTP {status} while {context}: {body}")]
    Api {
        context: String,
        status: u16,
        body: String,
    },

    /// Rate limit budget exhausted. Aborts the remaining batch, never the
    /// process.
    #[error("GitHub API rate limit exhausted")]
    RateLimited { reset: Option<DateTime<Utc>> },

    /// Account deleted or renamed on the remote side.
    #[error("GitHub user '{login}' not found")]
    NotFound { login: String },

    // =========================================================================
    // Sync Errors
    // =========================================================================
    /// Pagination failed partway through one of the lists. The previous
    /// snapshot of that set is left untouched.
    #[error("sync of the {set} list failed partway; previous snapshot kept")]
    SyncIncomplete {
        set: &'static str,
        #[source]
        source: Box<PruneError>,
    },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Database is locked by another process. Fatal for the run.
    #[error(
        "Database is locked: {path}\nEnsure no other ghprune run is active against this store."
    )]
    DatabaseLocked { path: PathBuf },

    /// Database operation failed. Fatal for the run.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// No API token available from any configuration layer.
    #[error("No GitHub token configured")]
    MissingToken,

    /// No acting username available from any configuration layer.
    #[error("No GitHub username configured")]
    MissingUsername,

    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped anyhow error for the binary boundary.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for ghprune operations.
pub type Result<T> = std::result::Result<T, PruneError>;

impl PruneError {
    /// Create a transport error with request context.
    pub fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }

    /// Create an API error from a non-success response.
    pub fn api(context: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            context: context.into(),
            status,
            body: body.into(),
        }
    }

    /// Create a rate-limited error.
    #[must_use]
    pub const fn rate_limited(reset: Option<DateTime<Utc>>) -> Self {
        Self::RateLimited { reset }
    }

    /// Create a not-found error for a login.
    pub fn not_found(login: impl Into<String>) -> Self {
        Self::NotFound {
            login: login.into(),
        }
    }

    /// Wrap a fetch failure as an incomplete sync of the named set.
    #[must_use]
    pub fn sync_incomplete(set: &'static str, source: Self) -> Self {
        Self::SyncIncomplete {
            set,
            source: Box::new(source),
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the batch executor should halt the remaining batch.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether this failure is worth retrying on a future run.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error must abort the whole run rather than one account.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DatabaseLocked { .. }
                | Self::Database(_)
                | Self::MissingToken
                | Self::MissingUsername
                | Self::Config { .. }
                | Self::Io(_)
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingToken => {
                Some("Set GITHUB_TOKEN, or add 'token' under [github] in the config file.")
            }
            Self::MissingUsername => {
                Some("Set GHPRUNE_USERNAME, or add 'username' under [github] in the config file.")
            }
            Self::RateLimited { .. } => {
                Some("Re-run after the rate limit window resets; progress so far is saved.")
            }
            Self::DatabaseLocked { .. } => {
                Some("Wait for the other run to finish, or remove stale -wal/-shm lock files.")
            }
            Self::SyncIncomplete { .. } => {
                Some("Re-run 'ghprune sync'; the stored snapshots are still consistent.")
            }
            _ => None,
        }
    }
}

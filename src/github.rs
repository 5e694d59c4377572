//! GitHub REST capability.
//!
//! [`SocialGraph`] is the boundary the core components consume: list the
//! two sides of the graph, drop a follow edge, and answer reciprocity
//! probes, with remaining-quota metadata reported alongside. Raw response
//! shapes are mapped into [`Account`] here and nowhere else.

use crate::config::Config;
use crate::error::{PruneError, Result};
use crate::model::{Account, RateLimit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::sync::Mutex;
use tracing::debug;

/// Default API base; overridable for GitHub Enterprise.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";
const USER_AGENT_HEADER: &str = concat!("ghprune/", env!("CARGO_PKG_VERSION"));

/// Wire shape of a user entry in the list endpoints.
#[derive(Debug, Clone, Deserialize)]
struct UserRecord {
    login: String,
    id: i64,
}

/// The remote social-graph capability consumed by sync and the executor.
#[async_trait]
pub trait SocialGraph: Send + Sync {
    /// Every account the acting user follows, paginated to exhaustion.
    async fn list_following(&self) -> Result<Vec<Account>>;

    /// Every account following the acting user, paginated to exhaustion.
    async fn list_followers(&self) -> Result<Vec<Account>>;

    /// Drop the follow edge to `login`.
    async fn unfollow(&self, login: &str) -> Result<()>;

    /// Does `login` currently follow the acting user?
    async fn is_following_me(&self, login: &str) -> Result<bool>;

    /// Does the acting user currently follow `login`?
    async fn is_followed_by_me(&self, login: &str) -> Result<bool>;

    /// Remaining-quota metadata from the most recent response, if any.
    fn rate_limit(&self) -> Option<RateLimit>;
}

/// `reqwest`-backed [`SocialGraph`] implementation.
pub struct GithubClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    per_page: u32,
    rate_limit: Mutex<Option<RateLimit>>,
}

impl GithubClient {
    /// Build a client from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Fails when the token or username is missing, or the HTTP client
    /// cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let token = config.token()?;
        let username = config.username()?.to_string();

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("token {token}")).map_err(|_| {
            PruneError::config("github.token", "token contains invalid header characters")
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_HEADER));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| PruneError::transport("constructing HTTP client", e))?;

        Ok(Self {
            client,
            base_url: config.github.api_base.trim_end_matches('/').to_string(),
            username,
            per_page: config.github.per_page,
            rate_limit: Mutex::new(None),
        })
    }

    /// Fetch one user-list endpoint, paginating until an empty page.
    async fn paged_users(&self, path: &str, context: &'static str) -> Result<Vec<Account>> {
        let mut users: Vec<Account> = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "{}{}?page={}&per_page={}",
                self.base_url, path, page, self.per_page
            );
            let resp = self.send(self.client.get(&url), context).await?;
            if !resp.status().is_success() {
                return Err(self.fail_for_status(resp, context).await);
            }

            let batch: Vec<UserRecord> = resp
                .json()
                .await
                .map_err(|e| PruneError::transport(context, e))?;
            if batch.is_empty() {
                break;
            }

            let fetched_at = Utc::now();
            users.extend(
                batch
                    .into_iter()
                    .map(|u| Account::observed(u.login, u.id, fetched_at)),
            );
            debug!(collected = users.len(), page, "fetched graph page");
            page += 1;
        }

        Ok(users)
    }

    /// A GET that answers a yes/no question via 204 / 404.
    async fn probe(&self, url: &str, context: &'static str) -> Result<bool> {
        let resp = self.send(self.client.get(url), context).await?;
        match resp.status().as_u16() {
            204 => Ok(true),
            404 => Ok(false),
            _ => Err(self.fail_for_status(resp, context).await),
        }
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<reqwest::Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| PruneError::transport(context, e))?;
        self.note_rate_limit(&resp);
        Ok(resp)
    }

    /// Turn a non-success response into the right error variant, consuming
    /// the body for context.
    async fn fail_for_status(&self, resp: reqwest::Response, context: &str) -> PruneError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let remaining = self.rate_limit().map(|r| r.remaining);

        if is_rate_limit_response(status, &body, remaining) {
            PruneError::rate_limited(self.rate_limit().map(|r| r.reset))
        } else {
            PruneError::api(context, status, body)
        }
    }

    /// Update remaining-quota metadata from response headers.
    fn note_rate_limit(&self, resp: &reqwest::Response) {
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
        };

        if let (Some(remaining), Some(reset)) =
            (header("x-ratelimit-remaining"), header("x-ratelimit-reset"))
        {
            if let Some(reset) = DateTime::<Utc>::from_timestamp(reset, 0) {
                if let Ok(mut slot) = self.rate_limit.lock() {
                    *slot = Some(RateLimit {
                        remaining: u32::try_from(remaining).unwrap_or(0),
                        reset,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl SocialGraph for GithubClient {
    async fn list_following(&self) -> Result<Vec<Account>> {
        let path = format!("/users/{}/following", self.username);
        self.paged_users(&path, "listing following").await
    }

    async fn list_followers(&self) -> Result<Vec<Account>> {
        let path = format!("/users/{}/followers", self.username);
        self.paged_users(&path, "listing followers").await
    }

    async fn unfollow(&self, login: &str) -> Result<()> {
        let url = format!("{}/user/following/{}", self.base_url, login);
        let resp = self.send(self.client.delete(&url), "unfollowing").await?;

        match resp.status().as_u16() {
            status if resp.status().is_success() => {
                debug!(login, status, "unfollowed");
                Ok(())
            }
            404 => Err(PruneError::not_found(login)),
            _ => Err(self.fail_for_status(resp, "unfollowing").await),
        }
    }

    async fn is_following_me(&self, login: &str) -> Result<bool> {
        let url = format!(
            "{}/users/{}/following/{}",
            self.base_url, login, self.username
        );
        self.probe(&url, "checking follow-back").await
    }

    async fn is_followed_by_me(&self, login: &str) -> Result<bool> {
        let url = format!("{}/user/following/{}", self.base_url, login);
        self.probe(&url, "checking follow edge").await
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit.lock().ok().and_then(|slot| *slot)
    }
}

/// Whether a failed response means the quota is gone rather than a plain
/// API error. GitHub signals it as 403 with a rate-limit message (or an
/// exhausted remaining count), newer endpoints as 429.
fn is_rate_limit_response(status: u16, body: &str, remaining: Option<u32>) -> bool {
    match status {
        429 => true,
        403 => body.to_lowercase().contains("rate limit") || remaining == Some(0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_classification() {
        assert!(is_rate_limit_response(429, "", None));
        assert!(is_rate_limit_response(
            403,
            "API rate limit exceeded for user",
            Some(40)
        ));
        assert!(is_rate_limit_response(403, "forbidden", Some(0)));
        assert!(!is_rate_limit_response(403, "forbidden", Some(10)));
        assert!(!is_rate_limit_response(500, "rate limit", Some(0)));
    }

    #[test]
    fn user_record_maps_to_account() {
        let raw = r#"[{"login": "octocat", "id": 583231, "node_id": "MDQ6VXNlcjU4MzIzMQ=="}]"#;
        let records: Vec<UserRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(records.len(), 1);

        let now = Utc::now();
        let account = Account::observed(records[0].login.clone(), records[0].id, now);
        assert_eq!(account.login, "octocat");
        assert_eq!(account.user_id, 583_231);
        assert_eq!(account.first_seen, now);
    }

    #[test]
    fn client_requires_credentials() {
        let config = Config::default();
        assert!(matches!(
            GithubClient::new(&config),
            Err(PruneError::MissingToken)
        ));

        let mut config = Config::default();
        config.github.token = Some("ghp_abc".to_string());
        assert!(matches!(
            GithubClient::new(&config),
            Err(PruneError::MissingUsername)
        ));
    }

    #[test]
    fn base_url_is_trimmed() {
        let mut config = Config::default();
        config.github.token = Some("ghp_abc".to_string());
        config.github.username = Some("octocat".to_string());
        config.github.api_base = "https://ghe.example.com/api/v3/".to_string();

        let client = GithubClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://ghe.example.com/api/v3");
        assert!(client.rate_limit().is_none());
    }
}

// src/sources/wordpress.rs
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ContactRecord, ContactSource};
use crate::error::{HarvestError, Result};
use crate::fetch::backoff_delay;

const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Deserialize)]
struct WpUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: Option<String>,
}

/// `GET {site}/wp-json/wp/v2/users` with an application password.
/// WAF-style 403s are retried with exponential backoff.
pub struct WordPress {
    client: Client,
    site_url: String,
    username: String,
    app_password: String,
    backoff_base_ms: u64,
}

impl WordPress {
    pub fn new(client: Client, site_url: &str, username: &str, app_password: &str) -> Self {
        Self {
            client,
            site_url: site_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            app_password: app_password.to_string(),
            backoff_base_ms: 1000,
        }
    }

    pub fn with_backoff_base_ms(mut self, ms: u64) -> Self {
        self.backoff_base_ms = ms;
        self
    }

    fn users_url(&self) -> String {
        format!("{}/wp-json/wp/v2/users", self.site_url)
    }
}

#[async_trait]
impl ContactSource for WordPress {
    async fn fetch_contacts(&self) -> Result<Vec<ContactRecord>> {
        let url = self.users_url();
        for attempt in 1..=MAX_ATTEMPTS {
            let resp = self
                .client
                .get(&url)
                .basic_auth(&self.username, Some(&self.app_password))
                .send()
                .await
                .map_err(|e| HarvestError::Fetch {
                    url: url.clone(),
                    attempts: attempt,
                    reason: e.to_string(),
                })?;

            let status = resp.status();
            if status == StatusCode::FORBIDDEN {
                warn!(url = %url, attempt, "wordpress answered 403; backing off");
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(backoff_delay(self.backoff_base_ms, attempt)).await;
                }
                continue;
            }
            if !status.is_success() {
                return Err(HarvestError::Fetch {
                    url,
                    attempts: attempt,
                    reason: format!("HTTP {status}"),
                });
            }

            let users: Vec<WpUser> = resp
                .json()
                .await
                .map_err(|e| HarvestError::parse("wordpress users", e))?;
            debug!(count = users.len(), "wordpress users fetched");
            return Ok(users
                .into_iter()
                .map(|u| ContactRecord {
                    name: u.name,
                    emails: u.email.into_iter().filter(|e| !e.is_empty()).collect(),
                    ..Default::default()
                })
                .collect());
        }
        Err(HarvestError::Fetch {
            url,
            attempts: MAX_ATTEMPTS,
            reason: "HTTP 403 Forbidden".into(),
        })
    }

    fn name(&self) -> &'static str {
        "wordpress"
    }
}

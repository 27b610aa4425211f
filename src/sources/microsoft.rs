// src/sources/microsoft.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{ContactRecord, ContactSource};
use crate::error::{HarvestError, Result};

pub const ENV_TOKEN: &str = "MS_GRAPH_TOKEN";
pub const ENV_TENANT: &str = "MS_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "MS_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "MS_CLIENT_SECRET";
pub const ENV_USER: &str = "MS_USER_ID";

/// Base URLs, overridable for tests.
#[derive(Debug, Clone)]
pub struct GraphEndpoints {
    pub graph_base: String,
    pub login_base: String,
}

impl Default for GraphEndpoints {
    fn default() -> Self {
        Self {
            graph_base: "https://graph.microsoft.com".into(),
            login_base: "https://login.microsoftonline.com".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ContactsPage {
    #[serde(default)]
    value: Vec<GraphContact>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphContact {
    display_name: Option<String>,
    #[serde(default)]
    email_addresses: Vec<GraphEmail>,
    #[serde(default)]
    business_phones: Vec<String>,
    #[serde(default)]
    home_phones: Vec<String>,
    mobile_phone: Option<String>,
    home_address: Option<GraphAddress>,
    business_address: Option<GraphAddress>,
}

#[derive(Debug, Deserialize)]
struct GraphEmail {
    address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAddress {
    street: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
}

impl GraphAddress {
    /// `street, city, ST zip`; empty when Graph returned an empty object.
    fn formatted(&self) -> Option<String> {
        let region = [self.state.as_deref(), self.postal_code.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let parts: Vec<&str> = [self.street.as_deref(), self.city.as_deref(), Some(region.as_str())]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

impl From<GraphContact> for ContactRecord {
    fn from(c: GraphContact) -> Self {
        let mut phones = c.business_phones;
        phones.extend(c.home_phones);
        phones.extend(c.mobile_phone);
        let addresses = [c.business_address, c.home_address]
            .into_iter()
            .flatten()
            .filter_map(|a| a.formatted())
            .collect();
        ContactRecord {
            name: c.display_name.unwrap_or_default(),
            emails: c.email_addresses.into_iter().filter_map(|e| e.address).collect(),
            phones,
            addresses,
        }
    }
}

/// Outlook contacts through Microsoft Graph: `/v1.0/me/contacts` for a delegated
/// token, `/v1.0/users/{id}/contacts` when a user is named.
pub struct MicrosoftGraph {
    client: Client,
    token: String,
    user: Option<String>,
    endpoints: GraphEndpoints,
}

impl MicrosoftGraph {
    pub fn with_token(client: Client, token: impl Into<String>, endpoints: GraphEndpoints) -> Self {
        Self {
            client,
            token: token.into(),
            user: None,
            endpoints,
        }
    }

    /// Read the contacts of this user (id or principal name) instead of `/me`.
    pub fn for_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    fn contacts_url(&self) -> String {
        let base = self.endpoints.graph_base.trim_end_matches('/');
        match &self.user {
            Some(u) => format!("{base}/v1.0/users/{u}/contacts"),
            None => format!("{base}/v1.0/me/contacts"),
        }
    }

    /// Token from the argument, then `MS_GRAPH_TOKEN`, then the client-credentials
    /// grant with `MS_TENANT_ID`/`MS_CLIENT_ID`/`MS_CLIENT_SECRET`. Nothing usable
    /// is a configuration error. `user` falls back to `MS_USER_ID`; an app-only token
    /// has no `/me`, so the client-credentials grant requires one.
    pub async fn connect(
        client: Client,
        token: Option<String>,
        user: Option<String>,
        endpoints: GraphEndpoints,
    ) -> Result<Self> {
        let env = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        let user = user.filter(|u| !u.trim().is_empty()).or_else(|| env(ENV_USER));
        let with_user = |graph: Self| match &user {
            Some(u) => graph.for_user(u.trim()),
            None => graph,
        };
        if let Some(t) = token.filter(|t| !t.trim().is_empty()).or_else(|| env(ENV_TOKEN)) {
            return Ok(with_user(Self::with_token(client, t, endpoints)));
        }
        let (Some(tenant), Some(id), Some(secret)) = (env(ENV_TENANT), env(ENV_CLIENT_ID), env(ENV_CLIENT_SECRET)) else {
            return Err(HarvestError::Config(
                "no Microsoft Graph access token or client credentials provided".into(),
            ));
        };
        if user.is_none() {
            return Err(HarvestError::Config(format!(
                "client credentials yield an app-only token; set {ENV_USER} to the mailbox to read"
            )));
        }

        let token_url = format!("{}/{tenant}/oauth2/v2.0/token", endpoints.login_base.trim_end_matches('/'));
        let scope = format!("{}/.default", endpoints.graph_base.trim_end_matches('/'));
        let resp = client
            .post(&token_url)
            .form(&[
                ("client_id", id.as_str()),
                ("scope", scope.as_str()),
                ("client_secret", secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(HarvestError::Fetch {
                url: token_url,
                attempts: 1,
                reason: format!("token request: HTTP {}", resp.status()),
            });
        }
        let tok: TokenResponse = resp
            .json()
            .await
            .map_err(|e| HarvestError::parse("graph token response", e))?;
        info!("microsoft graph token obtained via client credentials");
        Ok(with_user(Self::with_token(client, tok.access_token, endpoints)))
    }
}

#[async_trait]
impl ContactSource for MicrosoftGraph {
    async fn fetch_contacts(&self) -> Result<Vec<ContactRecord>> {
        let mut next = Some(self.contacts_url());
        let mut out = Vec::new();

        while let Some(url) = next.take() {
            let resp = self.client.get(&url).bearer_auth(&self.token).send().await?;
            if !resp.status().is_success() {
                return Err(HarvestError::Fetch {
                    url,
                    attempts: 1,
                    reason: format!("HTTP {}", resp.status()),
                });
            }
            let page: ContactsPage = resp
                .json()
                .await
                .map_err(|e| HarvestError::parse("graph contacts page", e))?;
            debug!(count = page.value.len(), "graph contacts page");
            out.extend(page.value.into_iter().map(ContactRecord::from));
            next = page.next_link;
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "outlook"
    }
}

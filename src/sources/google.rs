// src/sources/google.rs
use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ContactRecord, ContactSource};
use crate::error::{HarvestError, Result};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_API_BASE: &str = "https://people.googleapis.com";
const PERSON_FIELDS: &str = "names,emailAddresses,phoneNumbers,addresses";

/// Authorized-user credentials file, as written by Google's OAuth tooling.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionsPage {
    #[serde(default)]
    connections: Vec<Person>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    #[serde(default)]
    names: Vec<PersonName>,
    #[serde(default)]
    email_addresses: Vec<ValueField>,
    #[serde(default)]
    phone_numbers: Vec<ValueField>,
    #[serde(default)]
    addresses: Vec<AddressField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonName {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressField {
    formatted_value: Option<String>,
}

impl From<Person> for ContactRecord {
    fn from(p: Person) -> Self {
        ContactRecord {
            name: p
                .names
                .into_iter()
                .find_map(|n| n.display_name)
                .unwrap_or_default(),
            emails: p.email_addresses.into_iter().filter_map(|v| v.value).collect(),
            phones: p.phone_numbers.into_iter().filter_map(|v| v.value).collect(),
            addresses: p.addresses.into_iter().filter_map(|a| a.formatted_value).collect(),
        }
    }
}

/// Google People API `people/me/connections`, paged through `nextPageToken`.
pub struct GooglePeople {
    client: Client,
    creds: AuthorizedUser,
    api_base: String,
}

impl GooglePeople {
    pub fn new(client: Client, creds: AuthorizedUser) -> Self {
        Self {
            client,
            creds,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// A missing or malformed credentials file is a configuration error.
    pub fn from_credentials_file(client: Client, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HarvestError::Config(format!("google credentials {}: {e}", path.display())))?;
        let creds: AuthorizedUser = serde_json::from_str(&raw)
            .map_err(|e| HarvestError::Config(format!("google credentials {}: {e}", path.display())))?;
        Ok(Self::new(client, creds))
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    async fn access_token(&self) -> Result<String> {
        let uri = self.creds.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let resp = self
            .client
            .post(uri)
            .form(&[
                ("client_id", self.creds.client_id.as_str()),
                ("client_secret", self.creds.client_secret.as_str()),
                ("refresh_token", self.creds.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(HarvestError::Fetch {
                url: uri.to_string(),
                attempts: 1,
                reason: format!("token exchange: HTTP {}", resp.status()),
            });
        }
        let tok: TokenResponse = resp
            .json()
            .await
            .map_err(|e| HarvestError::parse("google token response", e))?;
        Ok(tok.access_token)
    }
}

#[async_trait]
impl ContactSource for GooglePeople {
    async fn fetch_contacts(&self) -> Result<Vec<ContactRecord>> {
        let token = self.access_token().await?;
        let url = format!("{}/v1/people/me/connections", self.api_base);
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .query(&[("pageSize", "1000"), ("personFields", PERSON_FIELDS)]);
            if let Some(t) = &page_token {
                req = req.query(&[("pageToken", t.as_str())]);
            }
            let resp = req.send().await?;
            if !resp.status().is_success() {
                return Err(HarvestError::Fetch {
                    url,
                    attempts: 1,
                    reason: format!("HTTP {}", resp.status()),
                });
            }
            let page: ConnectionsPage = resp
                .json()
                .await
                .map_err(|e| HarvestError::parse("google connections page", e))?;
            debug!(count = page.connections.len(), "google connections page");
            out.extend(page.connections.into_iter().map(ContactRecord::from));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

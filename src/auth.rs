// src/auth.rs
//! Form login. The session cookies land in the fetcher's shared jar and are
//! persisted as a flat `{name: value}` JSON object.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reqwest::cookie::{CookieStore, Jar};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::error::{HarvestError, Result};
use crate::fetch::Fetcher;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub login_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_username_field")]
    pub username_field: String,
    #[serde(default = "default_password_field")]
    pub password_field: String,
}

fn default_username_field() -> String {
    "username".into()
}

fn default_password_field() -> String {
    "password".into()
}

pub struct Authenticator<'a> {
    fetcher: &'a Fetcher,
    cookies_file: PathBuf,
}

impl<'a> Authenticator<'a> {
    pub fn new(fetcher: &'a Fetcher, cookies_file: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            cookies_file: cookies_file.into(),
        }
    }

    pub fn cookies_file(&self) -> &Path {
        &self.cookies_file
    }

    /// Load the login page (for pre-session cookies), post the form, and on a
    /// 2xx answer save the jar's cookies for the login URL. Returns whether the
    /// login succeeded.
    pub async fn login(&self, form: &LoginForm) -> Result<bool> {
        let url = Url::parse(&form.login_url)
            .map_err(|e| HarvestError::parse(format!("login url {}", form.login_url), e))?;
        let client = self.fetcher.client();

        if let Err(e) = client.get(url.clone()).send().await {
            warn!(url = %url, error = %e, "login page not reachable; posting anyway");
        }
        let resp = client
            .post(url.clone())
            .form(&[
                (form.username_field.as_str(), form.username.as_str()),
                (form.password_field.as_str(), form.password.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!(url = %url, %status, "authentication failed");
            return Ok(false);
        }
        let n = save_cookies(&self.fetcher.jar(), &url, &self.cookies_file)?;
        info!(url = %url, cookies = n, file = %self.cookies_file.display(), "authenticated");
        Ok(true)
    }
}

/// Write the cookies the jar would send to `url`. Returns how many were written.
pub fn save_cookies(jar: &Jar, url: &Url, path: &Path) -> Result<usize> {
    let mut map = BTreeMap::new();
    if let Some(header) = jar.cookies(url) {
        let header = header
            .to_str()
            .map_err(|e| HarvestError::parse("cookie header", e))?;
        for pair in header.split(';') {
            if let Some((k, v)) = pair.trim().split_once('=') {
                map.insert(k.to_string(), v.to_string());
            }
        }
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&map)?)?;
    Ok(map.len())
}

/// Load cookies saved by [`save_cookies`] (a `{name: value}` object) or a browser
/// export (a list of `{name, value}` objects) into `jar`, scoped to `url`.
pub fn load_cookies(jar: &Jar, url: &Url, path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(path)?;
    let pairs: Vec<(String, String)> = match serde_json::from_str::<Value>(&raw)? {
        Value::Object(m) => m
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|c| Some((c.get("name")?.as_str()?.to_string(), c.get("value")?.as_str()?.to_string())))
            .collect(),
        _ => return Err(HarvestError::parse("cookies file", "expected an object or a list")),
    };
    for (k, v) in &pairs {
        jar.add_cookie_str(&format!("{k}={v}"), url);
    }
    Ok(pairs.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookies_survive_a_save_load_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        let url = Url::parse("https://members.fund.org/login").unwrap();

        let jar = Jar::default();
        jar.add_cookie_str("session=abc123; Path=/", &url);
        jar.add_cookie_str("csrftoken=zz; Path=/", &url);
        assert_eq!(save_cookies(&jar, &url, &path).unwrap(), 2);

        let fresh = Jar::default();
        assert_eq!(load_cookies(&fresh, &url, &path).unwrap(), 2);
        let header = fresh.cookies(&url).unwrap();
        let header = header.to_str().unwrap();
        assert!(header.contains("session=abc123"));
        assert!(header.contains("csrftoken=zz"));
    }

    #[test]
    fn browser_export_lists_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, r#"[{"name": "sid", "value": "1", "domain": ".fund.org"}, {"bad": true}]"#).unwrap();
        let url = Url::parse("https://fund.org/").unwrap();
        let jar = Jar::default();
        assert_eq!(load_cookies(&jar, &url, &path).unwrap(), 1);
    }
}

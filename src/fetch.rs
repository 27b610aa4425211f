// src/fetch.rs
//! HTTP fetcher: proxy route first (when configured), then direct, each with
//! exponential backoff up to `http.max_retries` attempts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::HttpConfig;
use crate::error::{HarvestError, Result};

/// `base * 2^(attempt-1)`; attempt is 1-based.
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT
}

enum Attempt {
    Done(Vec<u8>),
    Retry(String),
    GiveUp(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Proxy,
    Direct,
}

impl Route {
    fn as_str(self) -> &'static str {
        match self {
            Route::Proxy => "proxy",
            Route::Direct => "direct",
        }
    }
}

pub struct Fetcher {
    direct: Client,
    proxied: Option<Client>,
    jar: Arc<Jar>,
    cfg: HttpConfig,
    raw_html_dir: Option<PathBuf>,
}

impl Fetcher {
    /// Build clients sharing one cookie jar. A bad proxy URL is a configuration error.
    pub fn new(cfg: &HttpConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let builder = || {
            Client::builder()
                .cookie_provider(Arc::clone(&jar))
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .user_agent(cfg.user_agent.clone())
        };
        let direct = builder()
            .build()
            .map_err(|e| HarvestError::Config(format!("http client: {e}")))?;
        let proxied = match &cfg.proxy {
            Some(p) => {
                let proxy = reqwest::Proxy::all(p)
                    .map_err(|e| HarvestError::Config(format!("http.proxy {p}: {e}")))?;
                Some(
                    builder()
                        .proxy(proxy)
                        .build()
                        .map_err(|e| HarvestError::Config(format!("proxied http client: {e}")))?,
                )
            }
            None => None,
        };
        Ok(Self {
            direct,
            proxied,
            jar,
            cfg: cfg.clone(),
            raw_html_dir: None,
        })
    }

    /// Write every fetched HTML page under `dir/<domain>/raw_html_<ts>.html`.
    pub fn with_raw_html_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_html_dir = Some(dir.into());
        self
    }

    /// Direct client; shares the cookie jar with the fetch routes.
    pub fn client(&self) -> &Client {
        &self.direct
    }

    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let bytes = self.fetch_bytes(url).await?;
        let html = String::from_utf8_lossy(&bytes).into_owned();
        if let Some(dir) = &self.raw_html_dir {
            if let Err(e) = save_raw_html(dir, url, &html) {
                warn!(url, error = %e, "raw html snapshot not written");
            }
        }
        Ok(html)
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut last = String::new();
        let mut attempts = 0u32;
        let routes: Vec<(Route, &Client)> = match &self.proxied {
            Some(p) => vec![(Route::Proxy, p), (Route::Direct, &self.direct)],
            None => vec![(Route::Direct, &self.direct)],
        };

        for (route, client) in routes {
            match self.try_route(client, url, route, &mut attempts).await {
                Ok(bytes) => return Ok(bytes),
                Err(reason) => {
                    if route == Route::Proxy {
                        info!(url, reason = %reason, "proxy route failed; falling back to direct");
                    }
                    last = reason;
                }
            }
        }

        metrics::counter!("harvest_fetch_failures_total").increment(1);
        warn!(url, attempts, reason = %last, "giving up on url");
        Err(HarvestError::Fetch {
            url: url.to_string(),
            attempts,
            reason: last,
        })
    }

    async fn try_route(&self, client: &Client, url: &str, route: Route, attempts: &mut u32) -> std::result::Result<Vec<u8>, String> {
        let max = self.cfg.max_retries.max(1);
        let mut last = String::new();
        for attempt in 1..=max {
            *attempts += 1;
            debug!(url, route = route.as_str(), attempt, max, "fetching");
            match self.attempt(client, url).await {
                Attempt::Done(bytes) => return Ok(bytes),
                Attempt::GiveUp(reason) => return Err(reason),
                Attempt::Retry(reason) => {
                    warn!(url, route = route.as_str(), attempt, reason = %reason, "request failed");
                    last = reason;
                    if attempt < max {
                        tokio::time::sleep(backoff_delay(self.cfg.backoff_base_ms, attempt)).await;
                    }
                }
            }
        }
        Err(last)
    }

    async fn attempt(&self, client: &Client, url: &str) -> Attempt {
        let resp = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) if e.is_builder() => return Attempt::GiveUp(e.to_string()),
            Err(e) => return Attempt::Retry(e.to_string()),
        };
        let status = resp.status();
        if !status.is_success() {
            let reason = format!("HTTP {status}");
            return if is_transient(status) {
                Attempt::Retry(reason)
            } else {
                Attempt::GiveUp(reason)
            };
        }
        match read_capped(resp, self.cfg.max_body_bytes).await {
            Ok(bytes) => Attempt::Done(bytes),
            Err(e) => Attempt::Retry(e.to_string()),
        }
    }
}

/// Read at most `max` bytes of the body; the rest is dropped with a warning.
async fn read_capped(mut resp: reqwest::Response, max: usize) -> std::result::Result<Vec<u8>, reqwest::Error> {
    let mut out = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = max.saturating_sub(out.len());
        if chunk.len() > room {
            out.extend_from_slice(&chunk[..room]);
            warn!(url = %resp.url(), max, "body truncated at cap");
            break;
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// Debug snapshot of a fetched page.
pub fn save_raw_html(dir: &Path, url: &str, html: &str) -> Result<PathBuf> {
    let target = crate::export::domain_dir(dir, url);
    std::fs::create_dir_all(&target)?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    let path = target.join(format!("raw_html_{ts}.html"));
    std::fs::write(&path, html)?;
    debug!(path = %path.display(), "raw html saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(1000, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1000, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(1000, 4), Duration::from_millis(8000));
        assert_eq!(backoff_delay(0, 3), Duration::ZERO);
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient(StatusCode::NOT_FOUND));
    }

    #[test]
    fn bad_proxy_is_a_config_error() {
        let cfg = HttpConfig {
            proxy: Some("not a proxy url".into()),
            ..HttpConfig::default()
        };
        assert!(matches!(Fetcher::new(&cfg), Err(HarvestError::Config(_))));
    }

    #[test]
    fn raw_html_lands_in_domain_dir() {
        let dir = tempfile::tempdir().unwrap();
        let p = save_raw_html(dir.path(), "https://www.fund.org/a?b=1", "<html></html>").unwrap();
        assert!(p.starts_with(dir.path().join("www_fund_org")));
        assert_eq!(std::fs::read_to_string(p).unwrap(), "<html></html>");
    }
}

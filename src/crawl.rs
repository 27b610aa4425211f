// src/crawl.rs
//! Page parsing and same-site crawling.
//!
//! A `Crawler` owns its fetcher and the set of processed URLs; the caller owns
//! the `ContactBook` every page is merged into. Fetches are awaited one at a time.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth;
use crate::config::AppConfig;
use crate::error::{HarvestError, Result};
use crate::extract::{self, PageExtract};
use crate::fetch::Fetcher;
use crate::records::{ContactBook, DonationPolicy};

#[derive(Debug, Deserialize)]
struct Sitemap {
    #[serde(rename = "url", default)]
    urls: Vec<Loc>,
    #[serde(rename = "sitemap", default)]
    sitemaps: Vec<Loc>,
}

#[derive(Debug, Deserialize)]
struct Loc {
    loc: String,
}

/// Links a parsed page pointed at.
#[derive(Debug, Default)]
pub struct PageLinks {
    pub links: Vec<Url>,
    pub pdf_links: Vec<Url>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub pages: usize,
    pub failed: usize,
    pub pdfs: usize,
    pub pdfs_stored: usize,
}

/// `http(s)` with a host that is a dotted domain, `localhost`, or an IP literal.
pub fn is_valid_url(s: &str) -> bool {
    let Ok(u) = Url::parse(s.trim()) else {
        return false;
    };
    if !matches!(u.scheme(), "http" | "https") {
        return false;
    }
    match u.host() {
        Some(url::Host::Domain(d)) => {
            d == "localhost"
                || d.rsplit_once('.')
                    .is_some_and(|(_, tld)| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
        }
        Some(_) => true,
        None => false,
    }
}

fn same_site(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Keep URLs containing any keyword (case-insensitive). No keywords keeps everything.
pub fn filter_urls(urls: Vec<Url>, keywords: &[String]) -> Vec<Url> {
    if keywords.is_empty() {
        return urls;
    }
    let kws: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    urls.into_iter()
        .filter(|u| {
            let s = u.as_str().to_lowercase();
            kws.iter().any(|k| s.contains(k.as_str()))
        })
        .collect()
}

pub struct Crawler {
    fetcher: Fetcher,
    policy: DonationPolicy,
    follow_pdfs: bool,
    pdf_dir: PathBuf,
    processed: HashSet<String>,
    seen_pdfs: HashSet<String>,
    cookies_file: Option<PathBuf>,
    cookie_hosts: HashSet<String>,
}

impl Crawler {
    pub fn new(fetcher: Fetcher, cfg: &AppConfig) -> Self {
        Self {
            fetcher,
            policy: cfg.merge.donation_policy,
            follow_pdfs: cfg.crawl.follow_pdfs,
            pdf_dir: cfg.crawl.pdf_dir.clone(),
            processed: HashSet::new(),
            seen_pdfs: HashSet::new(),
            cookies_file: Some(cfg.auth.cookies_file.clone()),
            cookie_hosts: HashSet::new(),
        }
    }

    /// Build a crawler (and its fetcher) straight from config.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let mut fetcher = Fetcher::new(&cfg.http)?;
        if cfg.output.save_raw_html {
            fetcher = fetcher.with_raw_html_dir(cfg.output.data_dir.clone());
        }
        Ok(Self::new(fetcher, cfg))
    }

    /// Load the saved login cookies (if the file exists) the first time a host is visited.
    fn load_saved_cookies(&mut self, url: &Url) {
        let Some(file) = self.cookies_file.as_deref().filter(|f| f.exists()) else {
            return;
        };
        let Some(host) = url.host_str() else {
            return;
        };
        if !self.cookie_hosts.insert(host.to_string()) {
            return;
        }
        match auth::load_cookies(&self.fetcher.jar(), url, file) {
            Ok(n) => debug!(host, cookies = n, "saved cookies loaded"),
            Err(e) => warn!(host, error = %e, file = %file.display(), "saved cookies not loaded"),
        }
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.processed.contains(url)
    }

    /// Fetch and parse one page into `book`. Returns `Ok(None)` when the URL was
    /// already processed by this crawler.
    pub async fn parse_page(&mut self, url: &str, book: &mut ContactBook) -> Result<Option<PageLinks>> {
        if self.processed.contains(url) {
            debug!(url, "already processed");
            return Ok(None);
        }
        let page_url = Url::parse(url).map_err(|e| HarvestError::parse(format!("url {url}"), e))?;
        self.load_saved_cookies(&page_url);
        let html = self.fetcher.fetch_text(url).await?;
        self.processed.insert(url.to_string());
        metrics::counter!("harvest_pages_total").increment(1);

        let PageExtract { book: batch, links, pdf_links } = extract::extract_page(&html, &page_url, self.policy);
        let summary = book.merge(batch, self.policy);
        info!(url, inserted = summary.inserted, merged = summary.merged, "page merged");
        Ok(Some(PageLinks { links, pdf_links }))
    }

    /// Fetch a PDF, extract it into `book`, and store it when it has key data.
    /// Each PDF URL is handled once per crawler. Returns whether a file was written.
    pub async fn process_pdf(&mut self, url: &str, book: &mut ContactBook) -> Result<bool> {
        if !self.seen_pdfs.insert(url.to_string()) {
            return Ok(false);
        }
        let bytes = self.fetcher.fetch_bytes(url).await?;
        match extract::extract_pdf(&bytes, url, self.policy) {
            Ok(batch) => {
                book.merge(batch, self.policy);
            }
            Err(e) => {
                warn!(url, error = %e, "pdf skipped");
                book.add_pdf_link(url);
                return Ok(false);
            }
        }
        Ok(extract::store_pdf(&bytes, url, &self.pdf_dir)?.is_some())
    }

    /// `<loc>` entries of `/sitemap.xml` on the site of `base`, following one
    /// level of sitemap index. Missing or malformed sitemaps yield nothing.
    pub async fn fetch_sitemap(&self, base: &Url) -> Vec<Url> {
        let Ok(root) = base.join("/sitemap.xml") else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut pending = vec![(root, 0u8)];
        while let Some((sm_url, level)) = pending.pop() {
            let body = match self.fetcher.fetch_text(sm_url.as_str()).await {
                Ok(b) => b,
                Err(e) => {
                    debug!(url = %sm_url, error = %e, "no sitemap");
                    continue;
                }
            };
            let parsed: Sitemap = match from_str(&body) {
                Ok(s) => s,
                Err(e) => {
                    warn!(url = %sm_url, error = %e, "sitemap not parseable");
                    continue;
                }
            };
            for loc in parsed.urls {
                if let Ok(u) = Url::parse(loc.loc.trim()) {
                    if same_site(&u, base) && !out.contains(&u) {
                        out.push(u);
                    }
                }
            }
            if level == 0 {
                for loc in parsed.sitemaps {
                    if let Ok(u) = Url::parse(loc.loc.trim()) {
                        pending.push((u, 1));
                    }
                }
            }
        }
        info!(site = %base, urls = out.len(), "sitemap read");
        out
    }

    /// Breadth-first crawl of `start`'s site. Links are followed while
    /// `depth < max_depth` and when they match `keywords`. Failed pages are
    /// logged and skipped.
    pub async fn crawl_site(
        &mut self,
        start: &str,
        max_depth: u32,
        keywords: &[String],
        use_sitemap: bool,
        book: &mut ContactBook,
    ) -> Result<CrawlStats> {
        let start_url = Url::parse(start).map_err(|e| HarvestError::parse(format!("url {start}"), e))?;
        let mut stats = CrawlStats::default();
        let mut queue: VecDeque<(Url, u32)> = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();

        queued.insert(start_url.to_string());
        queue.push_back((start_url.clone(), 0));
        if use_sitemap {
            for u in filter_urls(self.fetch_sitemap(&start_url).await, keywords) {
                if queued.insert(u.to_string()) {
                    queue.push_back((u, 1));
                }
            }
        }

        while let Some((url, depth)) = queue.pop_front() {
            let links = match self.parse_page(url.as_str(), book).await {
                Ok(Some(l)) => l,
                Ok(None) => continue,
                Err(e) => {
                    warn!(url = %url, depth, error = %e, "page skipped");
                    stats.failed += 1;
                    continue;
                }
            };
            stats.pages += 1;

            if self.follow_pdfs {
                for pdf in links.pdf_links {
                    stats.pdfs += 1;
                    match self.process_pdf(pdf.as_str(), book).await {
                        Ok(true) => stats.pdfs_stored += 1,
                        Ok(false) => {}
                        Err(e) => warn!(url = %pdf, error = %e, "pdf skipped"),
                    }
                }
            }

            if depth >= max_depth {
                continue;
            }
            let next: Vec<Url> = links.links.into_iter().filter(|l| same_site(l, &start_url)).collect();
            for l in filter_urls(next, keywords) {
                if queued.insert(l.to_string()) {
                    queue.push_back((l, depth + 1));
                }
            }
        }

        info!(
            start,
            pages = stats.pages,
            failed = stats.failed,
            pdfs = stats.pdfs,
            profiles = book.profiles.len(),
            "crawl finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validity() {
        assert!(is_valid_url("https://fund.example.org/donors"));
        assert!(is_valid_url("http://127.0.0.1:8080/"));
        assert!(is_valid_url("http://localhost:5001"));
        assert!(!is_valid_url("ftp://example.org"));
        assert!(!is_valid_url("not a url"));
        assert!(!is_valid_url("http://intranet"));
    }

    #[test]
    fn keyword_filter_is_case_insensitive() {
        let urls = vec![
            Url::parse("https://a.org/Donors/2024").unwrap(),
            Url::parse("https://a.org/blog").unwrap(),
        ];
        let kept = filter_urls(urls.clone(), &["donor".into()]);
        assert_eq!(kept, vec![urls[0].clone()]);
        assert_eq!(filter_urls(urls.clone(), &[]).len(), 2);
    }

    #[test]
    fn sitemap_shapes_deserialize() {
        let set: Sitemap = from_str(
            r#"<?xml version="1.0"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
               <url><loc>https://a.org/one</loc></url><url><loc>https://a.org/two</loc><lastmod>2024-01-01</lastmod></url>
               </urlset>"#,
        )
        .unwrap();
        assert_eq!(set.urls.len(), 2);
        let idx: Sitemap = from_str(
            r#"<sitemapindex><sitemap><loc>https://a.org/s1.xml</loc></sitemap></sitemapindex>"#,
        )
        .unwrap();
        assert_eq!(idx.sitemaps[0].loc, "https://a.org/s1.xml");
    }

    #[test]
    fn same_site_compares_host_and_port() {
        let a = Url::parse("http://127.0.0.1:8000/x").unwrap();
        assert!(same_site(&a, &Url::parse("http://127.0.0.1:8000/y").unwrap()));
        assert!(!same_site(&a, &Url::parse("http://127.0.0.1:9000/x").unwrap()));
    }
}

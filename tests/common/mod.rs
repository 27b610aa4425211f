// tests/common/mod.rs
#![allow(dead_code)]

use std::path::Path;

use donor_harvest::config::AppConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config that writes everything under `dir` and retries fast.
pub fn test_config(dir: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.http.max_retries = 2;
    cfg.http.backoff_base_ms = 1;
    cfg.http.timeout_secs = 5;
    cfg.output.data_dir = dir.join("data");
    cfg.output.csv_dir = dir.join("csv");
    cfg.crawl.pdf_dir = dir.join("pdfs");
    cfg.auth.cookies_file = dir.join("cookies.json");
    cfg
}

/// Serve `html` at `url_path` on `server`.
pub async fn mount_html(server: &MockServer, url_path: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html.to_string())
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

pub const BOARD_PAGE: &str = r#"
<html><body>
  <h1>Board of Directors</h1>
  <ul>
    <li>Jane Doe, Chair. jane@fund.org (919) 555-0100</li>
    <li>Carl Mills, Treasurer. carl@fund.org</li>
  </ul>
  <a href="/donors">Donors</a>
  <a href="/blog">Blog</a>
  <a href="https://elsewhere.example.com/">Partner</a>
</body></html>"#;

pub const DONORS_PAGE: &str = r#"
<html><body>
  <table>
    <tr><td>Jane Doe</td><td>jane.doe@home.net</td><td>gave $5,000 in a monthly pledge</td></tr>
  </table>
  <p>Office: 100 Main Street, Durham, NC 27701</p>
</body></html>"#;

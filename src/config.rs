// src/config.rs
//! Runtime configuration.
//!
//! Resolution order: `--config PATH` > `$HARVEST_CONFIG_PATH` > `config/harvest.toml`.
//! A missing default file yields defaults; an explicitly named file must exist.
//! `HARVEST_PROXY` and `HARVEST_DATA_DIR` override the file afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::records::DonationPolicy;

pub const ENV_CONFIG_PATH: &str = "HARVEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/harvest.toml";
const ENV_PROXY: &str = "HARVEST_PROXY";
const ENV_DATA_DIR: &str = "HARVEST_DATA_DIR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub output: OutputConfig,
    pub crawl: CrawlConfig,
    pub merge: MergeConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Attempts per route (proxy, then direct).
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// e.g. `socks5h://127.0.0.1:9050`
    pub proxy: Option<String>,
    pub user_agent: String,
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 5,
            backoff_base_ms: 1000,
            proxy: None,
            user_agent: concat!("donor-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where `extracted_data.json` and raw HTML snapshots go.
    pub data_dir: PathBuf,
    /// Base for `<domain>/<domain>_donor_data_<ts>.csv`.
    pub csv_dir: PathBuf,
    pub save_raw_html: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("DATA"),
            csv_dir: PathBuf::from("DATA"),
            save_raw_html: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_depth: u32,
    /// Only follow links whose URL contains one of these (case-insensitive). Empty = all.
    pub keywords: Vec<String>,
    pub follow_pdfs: bool,
    pub pdf_dir: PathBuf,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            keywords: Vec::new(),
            follow_pdfs: true,
            pdf_dir: PathBuf::from("DATA/pdfs"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub donation_policy: DonationPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub cookies_file: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookies_file: PathBuf::from("cookies.json"),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s).context("parsing harvest config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading harvest config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Resolve the config file, then apply env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = if let Some(p) = explicit {
            Self::load_from(p)?
        } else if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display()));
            }
            Self::load_from(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from(&default)?
            } else {
                tracing::debug!("no config file found; using defaults");
                Self::default()
            }
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(p) = std::env::var(ENV_PROXY) {
            let p = p.trim();
            self.http.proxy = (!p.is_empty()).then(|| p.to_string());
        }
        if let Ok(d) = std::env::var(ENV_DATA_DIR) {
            if !d.trim().is_empty() {
                self.output.data_dir = PathBuf::from(d.trim());
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.http.max_retries == 0 {
            return Err(anyhow!("http.max_retries must be at least 1"));
        }
        if self.http.timeout_secs == 0 {
            return Err(anyhow!("http.timeout_secs must be positive"));
        }
        if let Some(p) = &self.http.proxy {
            url::Url::parse(p).with_context(|| format!("http.proxy is not a URL: {p}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.server.port, 5001);
        assert_eq!(cfg.merge.donation_policy, DonationPolicy::FullRecord);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [http]
            max_retries = 2
            proxy = "socks5h://127.0.0.1:9050"

            [merge]
            donation_policy = "amount_and_source"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.http.max_retries, 2);
        assert_eq!(cfg.http.timeout_secs, 10);
        assert_eq!(cfg.merge.donation_policy, DonationPolicy::AmountAndSource);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let cfg = AppConfig::from_toml_str(include_str!("../config/harvest.toml")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn zero_retries_is_rejected() {
        assert!(AppConfig::from_toml_str("[http]\nmax_retries = 0\n").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn env_path_then_default_then_builtin() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_PROXY);
        env::remove_var(ENV_DATA_DIR);

        assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());

        fs::create_dir_all("config").unwrap();
        fs::write(DEFAULT_CONFIG_PATH, "[server]\nport = 6000\n").unwrap();
        assert_eq!(AppConfig::load(None).unwrap().server.port, 6000);

        fs::write("other.toml", "[server]\nport = 7000\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, "other.toml");
        assert_eq!(AppConfig::load(None).unwrap().server.port, 7000);

        env::set_var(ENV_CONFIG_PATH, "missing.toml");
        assert!(AppConfig::load(None).is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_var(ENV_DATA_DIR, "/tmp/harvest-out");
        env::set_var(ENV_PROXY, "");
        let cfg = AppConfig::load(None).unwrap();
        assert_eq!(cfg.output.data_dir, PathBuf::from("/tmp/harvest-out"));
        assert!(cfg.http.proxy.is_none());
        env::remove_var(ENV_DATA_DIR);
        env::remove_var(ENV_PROXY);

        env::set_current_dir(old).unwrap();
    }
}

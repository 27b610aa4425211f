// src/cli.rs
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::crawl::{is_valid_url, Crawler};
use crate::error::{HarvestError, Result};
use crate::export::{self, ExportContext};
use crate::extract;
use crate::fetch::Fetcher;
use crate::records::ContactBook;
use crate::sources::{import_contacts, ContactSource, GooglePeople, GraphEndpoints, MicrosoftGraph, WordPress};
use crate::telemetry::{describe_metrics, Metrics};

#[derive(Parser, Debug)]
#[command(name = "donor-harvest")]
#[command(about = "Collect donor and contact details from sites, PDFs, mailboxes and contact APIs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose logging (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Config file (default: $HARVEST_CONFIG_PATH, then config/harvest.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Crawl a site breadth-first and save everything found
    Scan {
        #[arg(long)]
        url: String,
        #[arg(long, value_name = "N")]
        max_depth: Option<u32>,
        /// Only follow links containing one of these words
        #[arg(long, num_args = 1..)]
        keywords: Vec<String>,
        /// Seed the crawl from /sitemap.xml
        #[arg(long)]
        sitemap: bool,
    },
    /// Parse single pages (no link following)
    Search {
        #[arg(long = "url", required = true, num_args = 1..)]
        urls: Vec<String>,
    },
    /// Import contacts from an external system
    Contacts {
        #[command(subcommand)]
        source: ContactsCommand,
    },
    /// Extract a remote PDF
    Pdf {
        #[arg(long)]
        url: String,
    },
    /// Parse .eml and .mbox files under a directory
    Emails {
        #[arg(long)]
        dir: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ContactsCommand {
    /// WordPress users via the REST API and an application password
    Wordpress {
        #[arg(long)]
        site: String,
        #[arg(long)]
        user: String,
        #[arg(long, env = "WP_APP_PASSWORD", hide_env_values = true)]
        app_password: String,
    },
    /// Google People connections
    Google {
        /// Authorized-user credentials JSON
        #[arg(long, value_name = "FILE")]
        credentials: PathBuf,
    },
    /// Outlook contacts through Microsoft Graph
    Microsoft {
        #[arg(long, env = "MS_GRAPH_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Mailbox to read (id or principal name); required with client credentials
        #[arg(long, env = "MS_USER_ID")]
        user: Option<String>,
    },
}

/// Run one command. Only configuration errors fail the process; anything else
/// is logged and the run ends normally.
pub async fn run(cli: Cli, cfg: AppConfig) -> anyhow::Result<()> {
    let outcome = match cli.command {
        Command::Serve { host, port } => return serve(cfg, host, port).await,
        Command::Scan { url, max_depth, keywords, sitemap } => scan(&cfg, &url, max_depth, keywords, sitemap).await,
        Command::Search { urls } => search(&cfg, &urls).await,
        Command::Contacts { source } => contacts(&cfg, source).await,
        Command::Pdf { url } => pdf(&cfg, &url).await,
        Command::Emails { dir } => emails(&cfg, &dir),
    };
    match outcome {
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            error!(error = %e, "run ended with an error");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

async fn serve(cfg: AppConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| cfg.server.host.clone());
    let port = port.unwrap_or(cfg.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let mut router = api::create_router(AppState::new(cfg));
    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            describe_metrics();
        }
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, router).await.context("http server")?;
    Ok(())
}

/// Write `extracted_data.json` and the CSV for `url`, then print the counts.
fn save_outputs(cfg: &AppConfig, book: &ContactBook, url: &str) -> Result<()> {
    let (json_path, _) = export::save_json(book, &cfg.output.data_dir, cfg.merge.donation_policy)?;
    let csv_path = export::export_csv(book, url, &cfg.output.csv_dir)?;
    print_summary(book, &json_path, &csv_path)
}

/// Same as [`save_outputs`] for sources without a web address.
fn save_labeled_outputs(cfg: &AppConfig, book: &ContactBook, label: &str, source: &str) -> Result<()> {
    let (json_path, _) = export::save_json(book, &cfg.output.data_dir, cfg.merge.donation_policy)?;
    let csv_path = export::labeled_csv_path(&cfg.output.csv_dir, label, chrono::Local::now().naive_local());
    let rows = export::to_rows(book, &ExportContext::now(Some(source)));
    export::write_csv(&rows, &csv_path)?;
    print_summary(book, &json_path, &csv_path)
}

fn print_summary(book: &ContactBook, json_path: &Path, csv_path: &Path) -> Result<()> {
    if book.is_empty() {
        warn!("no contact data found");
    }
    let out = json!({
        "summary": book.summary(),
        "json": json_path.display().to_string(),
        "csv": csv_path.display().to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn scan(cfg: &AppConfig, url: &str, max_depth: Option<u32>, keywords: Vec<String>, sitemap: bool) -> Result<()> {
    if !is_valid_url(url) {
        return Err(HarvestError::parse(format!("url {url}"), "not an http(s) address"));
    }
    let keywords = if keywords.is_empty() { cfg.crawl.keywords.clone() } else { keywords };
    let mut crawler = Crawler::from_config(cfg)?;
    let mut book = ContactBook::new();
    let stats = crawler
        .crawl_site(url, max_depth.unwrap_or(cfg.crawl.max_depth), &keywords, sitemap, &mut book)
        .await?;
    info!(pages = stats.pages, failed = stats.failed, pdfs_stored = stats.pdfs_stored, "scan done");
    save_outputs(cfg, &book, url)
}

async fn search(cfg: &AppConfig, urls: &[String]) -> Result<()> {
    let mut crawler = Crawler::from_config(cfg)?;
    let mut book = ContactBook::new();
    let mut last_ok = None;
    for url in urls {
        if !is_valid_url(url) {
            warn!(url, "invalid url");
            continue;
        }
        match crawler.parse_page(url, &mut book).await {
            Ok(links) => {
                if let Some(links) = links.filter(|_| cfg.crawl.follow_pdfs) {
                    for pdf in links.pdf_links {
                        if let Err(e) = crawler.process_pdf(pdf.as_str(), &mut book).await {
                            warn!(url = %pdf, error = %e, "pdf skipped");
                        }
                    }
                }
                last_ok = Some(url.as_str());
            }
            Err(e) => warn!(url, error = %e, "page skipped"),
        }
    }
    match last_ok {
        Some(url) => save_outputs(cfg, &book, url),
        None => {
            warn!("no page could be parsed");
            Ok(())
        }
    }
}

async fn contacts(cfg: &AppConfig, cmd: ContactsCommand) -> Result<()> {
    let client = Fetcher::new(&cfg.http)?.client().clone();
    let (source, origin): (Box<dyn ContactSource>, String) = match cmd {
        ContactsCommand::Wordpress { site, user, app_password } => {
            (Box::new(WordPress::new(client, &site, &user, &app_password)), site)
        }
        ContactsCommand::Google { credentials } => (
            Box::new(GooglePeople::from_credentials_file(client, &credentials)?),
            "google".to_string(),
        ),
        ContactsCommand::Microsoft { token, user } => (
            Box::new(MicrosoftGraph::connect(client, token, user, GraphEndpoints::default()).await?),
            "outlook".to_string(),
        ),
    };

    let mut book = ContactBook::new();
    let summary = import_contacts(source.as_ref(), &mut book, cfg.merge.donation_policy).await?;
    info!(source = source.name(), inserted = summary.inserted, merged = summary.merged, "contacts imported");
    if is_valid_url(&origin) {
        save_outputs(cfg, &book, &origin)
    } else {
        save_labeled_outputs(cfg, &book, source.name(), &origin)
    }
}

async fn pdf(cfg: &AppConfig, url: &str) -> Result<()> {
    let fetcher = Fetcher::new(&cfg.http)?;
    let bytes = fetcher.fetch_bytes(url).await?;
    let book = extract::extract_pdf(&bytes, url, cfg.merge.donation_policy)?;
    if let Some(path) = extract::store_pdf(&bytes, url, &cfg.crawl.pdf_dir)? {
        info!(path = %path.display(), "pdf stored");
    }
    save_outputs(cfg, &book, url)
}

fn emails(cfg: &AppConfig, dir: &Path) -> Result<()> {
    let book = extract::email::parse_mail_dir(dir, cfg.merge.donation_policy)?;
    save_labeled_outputs(cfg, &book, "mail", &dir.display().to_string())
}

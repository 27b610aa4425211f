// src/api.rs
//! HTTP surface. Every request builds its own crawler and book; `/crawl`
//! hands its work to a spawned task and answers immediately.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::auth::{Authenticator, LoginForm};
use crate::config::AppConfig;
use crate::crawl::{is_valid_url, Crawler};
use crate::error::HarvestError;
use crate::export;
use crate::fetch::Fetcher;
use crate::records::{BookSummary, ContactBook};
use crate::sources::{import_contacts, GraphEndpoints, MicrosoftGraph};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub graph: GraphEndpoints,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            graph: GraphEndpoints::default(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search))
        .route("/crawl", post(crawl))
        .route("/authenticate", post(authenticate))
        .route("/extract/microsoft", post(extract_microsoft))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// `{"error": ...}` with a status code.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum SearchResult {
    Ok {
        url: String,
        data: ContactBook,
        summary: BookSummary,
    },
    Failed {
        url: String,
        error: String,
    },
}

/// `?url=a&urls=b&urls=c`: every `url`/`urls` value, in order.
fn requested_urls(params: Vec<(String, String)>) -> Vec<String> {
    params
        .into_iter()
        .filter(|(k, v)| (k == "url" || k == "urls") && !v.trim().is_empty())
        .map(|(_, v)| v.trim().to_string())
        .collect()
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let urls = requested_urls(params);
    if urls.is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "No URLs provided".into()));
    }

    let cfg = &state.config;
    let mut crawler = Crawler::from_config(cfg).map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let mut book = ContactBook::new();
    let mut results = Vec::with_capacity(urls.len());

    for url in urls {
        if !is_valid_url(&url) {
            warn!(url, "invalid url");
            results.push(SearchResult::Failed { url, error: "Invalid URL".into() });
            continue;
        }
        match crawler.parse_page(&url, &mut book).await {
            Ok(links) => {
                if let Some(links) = links.filter(|_| cfg.crawl.follow_pdfs) {
                    for pdf in links.pdf_links {
                        if let Err(e) = crawler.process_pdf(pdf.as_str(), &mut book).await {
                            warn!(url = %pdf, error = %e, "pdf skipped");
                        }
                    }
                }
                if let Err(e) = export::export_csv(&book, &url, &cfg.output.csv_dir) {
                    warn!(url, error = %e, "csv export failed");
                }
                results.push(SearchResult::Ok {
                    url,
                    summary: book.summary(),
                    data: book.clone(),
                });
            }
            Err(e) => {
                error!(url, error = %e, "search failed");
                results.push(SearchResult::Failed { url, error: e.to_string() });
            }
        }
    }
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
struct CrawlReq {
    url: String,
    max_depth: Option<u32>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    sitemap: bool,
}

async fn crawl(State(state): State<AppState>, Json(req): Json<CrawlReq>) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !is_valid_url(&req.url) {
        return Err(ApiError(StatusCode::BAD_REQUEST, "Invalid URL".into()));
    }
    let cfg = state.config.clone();
    let max_depth = req.max_depth.unwrap_or(cfg.crawl.max_depth);
    let keywords = if req.keywords.is_empty() { cfg.crawl.keywords.clone() } else { req.keywords };
    let url = req.url.clone();
    let sitemap = req.sitemap;

    tokio::spawn(async move {
        metrics::gauge!("harvest_crawls_running").increment(1.0);
        if let Err(e) = run_crawl(&cfg, &url, max_depth, &keywords, sitemap).await {
            error!(url, error = %e, "background crawl failed");
        }
        metrics::gauge!("harvest_crawls_running").decrement(1.0);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "started", "url": req.url, "max_depth": max_depth })),
    ))
}

async fn run_crawl(cfg: &AppConfig, url: &str, max_depth: u32, keywords: &[String], sitemap: bool) -> crate::error::Result<()> {
    let mut crawler = Crawler::from_config(cfg)?;
    let mut book = ContactBook::new();
    let stats = crawler.crawl_site(url, max_depth, keywords, sitemap, &mut book).await?;
    let (json_path, _) = export::save_json(&book, &cfg.output.data_dir, cfg.merge.donation_policy)?;
    let csv_path = export::export_csv(&book, url, &cfg.output.csv_dir)?;
    info!(
        url,
        pages = stats.pages,
        json = %json_path.display(),
        csv = %csv_path.display(),
        "background crawl saved"
    );
    Ok(())
}

async fn authenticate(State(state): State<AppState>, Json(form): Json<LoginForm>) -> Response {
    let cfg = &state.config;
    let fetcher = match Fetcher::new(&cfg.http) {
        Ok(f) => f,
        Err(e) => return ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    let auth = Authenticator::new(&fetcher, cfg.auth.cookies_file.clone());
    match auth.login(&form).await {
        Ok(true) => Json(json!({
            "authenticated": true,
            "cookies_file": auth.cookies_file().display().to_string(),
        }))
        .into_response(),
        Ok(false) => (StatusCode::UNAUTHORIZED, Json(json!({ "authenticated": false }))).into_response(),
        Err(e) => {
            warn!(login_url = %form.login_url, error = %e, "login error");
            (StatusCode::UNAUTHORIZED, Json(json!({ "authenticated": false, "error": e.to_string() }))).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct MicrosoftReq {
    access_token: Option<String>,
    user_id: Option<String>,
}

async fn extract_microsoft(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ContactBook>, ApiError> {
    let req: MicrosoftReq = if body.iter().all(u8::is_ascii_whitespace) {
        MicrosoftReq::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?
    };
    let cfg = &state.config;
    let status_for = |e: &HarvestError| {
        if e.is_fatal() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::BAD_GATEWAY
        }
    };
    let fetcher = Fetcher::new(&cfg.http).map_err(|e| ApiError(status_for(&e), e.to_string()))?;
    let source = MicrosoftGraph::connect(fetcher.client().clone(), req.access_token, req.user_id, state.graph.clone())
        .await
        .map_err(|e| ApiError(status_for(&e), e.to_string()))?;
    let mut book = ContactBook::new();
    import_contacts(&source, &mut book, cfg.merge.donation_policy)
        .await
        .map_err(|e| ApiError(status_for(&e), e.to_string()))?;
    Ok(Json(book))
}

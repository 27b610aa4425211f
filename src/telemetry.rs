// src/telemetry.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("harvest_pages_total", "HTML pages fetched and parsed.");
        describe_counter!("harvest_pdfs_total", "PDF documents whose text was extracted.");
        describe_counter!(
            "harvest_fetch_failures_total",
            "Fetches that failed on every route after all retries."
        );
        describe_counter!(
            "harvest_validation_rejections_total",
            "Values dropped by the strict validators, by field."
        );
        describe_counter!(
            "harvest_merge_failures_total",
            "Timestamps that could not be parsed while merging profiles."
        );
        describe_counter!("harvest_profiles_merged_total", "Profiles folded into an existing one.");
        describe_counter!("harvest_profiles_inserted_total", "Profiles appended as new.");
        describe_gauge!("harvest_crawls_running", "Background crawls started over HTTP and not finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_metrics();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

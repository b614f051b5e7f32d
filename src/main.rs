//! hf-papers-feed: Binary Entrypoint
//! One run per invocation: refresh the feed state and rewrite the RSS document.
//! Meant to be triggered by an external scheduler (cron, CI).

use chrono::Utc;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hf_papers_feed::config::FeedConfig;
use hf_papers_feed::ingest::pages::HttpPageSource;
use hf_papers_feed::ingest::providers::hf_papers::HfPapersProvider;
use hf_papers_feed::metrics::Metrics;
use hf_papers_feed::translate::google::GoogleTranslator;

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn run(config: FeedConfig) -> anyhow::Result<()> {
    let metrics = match &config.metrics_textfile {
        Some(path) => Some(Metrics::init(path)?),
        None => None,
    };

    let pages = HttpPageSource::new(config.request_timeout_secs)?
        .with_retries(config.max_retries)
        .with_retry_base(Duration::from_millis(config.retry_base_ms));
    let provider = HfPapersProvider::new(&config.base_url, Arc::new(pages))
        .with_max_papers(config.max_papers)
        .with_max_workers(config.max_workers);
    let translator = GoogleTranslator::new(
        config.translate_endpoint.as_deref(),
        config.request_timeout_secs,
    )?;

    let result = hf_papers_feed::run(&config, &provider, Arc::new(translator), Utc::now()).await;

    // Failed runs still leave their counters behind.
    if let Some(m) = &metrics {
        if let Err(e) = m.flush() {
            tracing::warn!(error = %e, "metrics textfile not written");
        }
    }
    result?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = match FeedConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        source = %config.base_url,
        languages = ?config.target_languages,
        max_items = config.max_items,
        "starting feed run"
    );

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "feed run aborted");
            ExitCode::FAILURE
        }
    }
}

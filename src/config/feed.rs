// src/config/feed.rs
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::feed::FeedMeta;
use crate::translate::RetryPolicy;

// --- env defaults & names ---
pub const ENV_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/feed.toml";
pub const DEFAULT_LANGUAGE: &str = "zh-CN";

static RE_LANG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").unwrap());

/// Everything a run needs, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_papers: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub max_workers: usize,
    pub state_file: PathBuf,
    /// `N_max`: feed state size cap.
    pub max_items: usize,
    pub target_languages: Vec<String>,
    pub feed_url: String,
    pub title: String,
    pub description: String,
    pub output_path: PathBuf,
    pub translate_endpoint: Option<String>,
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://huggingface.co/papers".to_string(),
            request_timeout_secs: 30,
            max_papers: 100,
            max_retries: 3,
            retry_base_ms: 500,
            max_workers: 5,
            state_file: PathBuf::from(".processed_papers.json"),
            max_items: 500,
            target_languages: vec![DEFAULT_LANGUAGE.to_string()],
            feed_url: "https://your-username.github.io/hf-papers-rss/feed.xml".to_string(),
            title: "Hugging Face Papers RSS".to_string(),
            description: "Latest AI research papers from Hugging Face".to_string(),
            output_path: PathBuf::from("docs/feed.xml"),
            translate_endpoint: None,
            metrics_textfile: None,
        }
    }
}

/// TOML shape; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    max_papers: Option<usize>,
    max_retries: Option<u32>,
    retry_base_ms: Option<u64>,
    max_workers: Option<usize>,
    state_file: Option<PathBuf>,
    max_items: Option<usize>,
    target_languages: Option<Vec<String>>,
    feed_url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    output_path: Option<PathBuf>,
    translate_endpoint: Option<String>,
    metrics_textfile: Option<PathBuf>,
}

impl FeedConfig {
    /// Defaults, then the TOML file, then process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|k| std::env::var(k).ok())
    }

    /// Same as `load` with an injectable environment lookup.
    pub fn load_with<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(path) = config_path(&env)? {
            cfg.apply_file(&path)?;
            tracing::info!(path = %path.display(), "config file loaded");
        }
        cfg.apply_env(&env)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let f: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;

        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $( if let Some(v) = f.$field { self.$field = v; } )*
            };
        }
        take!(
            base_url,
            request_timeout_secs,
            max_papers,
            max_retries,
            retry_base_ms,
            max_workers,
            state_file,
            max_items,
            target_languages,
            feed_url,
            title,
            description,
            output_path,
        );
        if f.translate_endpoint.is_some() {
            self.translate_endpoint = f.translate_endpoint;
        }
        if f.metrics_textfile.is_some() {
            self.metrics_textfile = f.metrics_textfile;
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, env: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| env(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("REQUEST_TIMEOUT") {
            self.request_timeout_secs = parse_num("REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = get("MAX_PAPERS") {
            self.max_papers = parse_num("MAX_PAPERS", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            self.max_retries = parse_num("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_BASE_MS") {
            self.retry_base_ms = parse_num("RETRY_BASE_MS", &v)?;
        }
        if let Some(v) = get("MAX_WORKERS") {
            self.max_workers = parse_num("MAX_WORKERS", &v)?;
        }
        if let Some(v) = get("STATE_FILE") {
            self.state_file = PathBuf::from(v);
        }
        if let Some(v) = get("MAX_PROCESSED_RECORDS") {
            self.max_items = parse_num("MAX_PROCESSED_RECORDS", &v)?;
        }
        if let Some(v) = get("TARGET_LANGUAGES") {
            self.target_languages = v.split(',').map(str::to_string).collect();
        }
        if let Some(v) = get("RSS_FEED_URL") {
            self.feed_url = v;
        }
        if let Some(v) = get("RSS_TITLE") {
            self.title = v;
        }
        if let Some(v) = get("RSS_DESCRIPTION") {
            self.description = v;
        }
        if let Some(v) = get("FEED_OUTPUT") {
            self.output_path = PathBuf::from(v);
        }
        if let Some(v) = get("TRANSLATE_ENDPOINT") {
            self.translate_endpoint = Some(v);
        }
        if let Some(v) = get("METRICS_TEXTFILE") {
            self.metrics_textfile = Some(PathBuf::from(v));
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        check_http_url("BASE_URL", &self.base_url)?;
        check_http_url("RSS_FEED_URL", &self.feed_url)?;
        if let Some(ep) = &self.translate_endpoint {
            check_http_url("TRANSLATE_ENDPOINT", ep)?;
        }
        check_positive("REQUEST_TIMEOUT", self.request_timeout_secs as usize)?;
        check_positive("MAX_PAPERS", self.max_papers)?;
        check_positive("MAX_RETRIES", self.max_retries as usize)?;
        check_positive("MAX_WORKERS", self.max_workers)?;
        check_positive("MAX_PROCESSED_RECORDS", self.max_items)?;
        self.target_languages = normalize_languages(&self.target_languages);
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base: Duration::from_millis(self.retry_base_ms),
        }
    }

    pub fn feed_meta(&self) -> FeedMeta {
        FeedMeta {
            title: self.title.clone(),
            description: self.description.clone(),
            site_link: self.base_url.clone(),
            self_url: self.feed_url.clone(),
            languages: self.target_languages.clone(),
        }
    }
}

/// Config file location: `$FEED_CONFIG_PATH` (must exist), else `config/feed.toml`
/// when present, else none.
fn config_path<F>(env: &F) -> Result<Option<PathBuf>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(p) = env(ENV_CONFIG_PATH).filter(|p| !p.trim().is_empty()) {
        let pb = PathBuf::from(p.trim());
        if !pb.exists() {
            return Err(ConfigError::Invalid {
                key: ENV_CONFIG_PATH,
                value: p,
                reason: "points to a non-existent path",
            });
        }
        return Ok(Some(pb));
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(fallback.exists().then_some(fallback))
}

fn parse_num<T: std::str::FromStr>(key: &'static str, v: &str) -> Result<T, ConfigError> {
    v.parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: v.to_string(),
        reason: "not a non-negative integer",
    })
}

fn check_positive(key: &'static str, v: usize) -> Result<(), ConfigError> {
    if v == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be at least 1",
        });
    }
    Ok(())
}

fn check_http_url(key: &'static str, v: &str) -> Result<(), ConfigError> {
    match reqwest::Url::parse(v) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::Invalid {
            key,
            value: v.to_string(),
            reason: "not an http(s) URL",
        }),
    }
}

/// Trim, drop malformed tags, dedup (first wins). Empty result falls back to the
/// default language.
pub fn normalize_languages(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for l in raw {
        let t = l.trim();
        if t.is_empty() {
            continue;
        }
        if !RE_LANG.is_match(t) {
            tracing::warn!(lang = t, "ignoring malformed language tag");
            continue;
        }
        if !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    if out.is_empty() {
        tracing::warn!(fallback = DEFAULT_LANGUAGE, "no usable target language configured");
        out.push(DEFAULT_LANGUAGE.to_string());
    }
    out
}

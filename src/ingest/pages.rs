// src/ingest/pages.rs
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::FetchError;
use crate::ingest::types::PageSource;

const USER_AGENT: &str = "hf-papers-feed/0.1 (+https://huggingface.co/papers)";

/// HTTP page access with bounded retry and exponential backoff.
#[derive(Clone)]
pub struct HttpPageSource {
    client: Client,
    max_retries: u32,
    retry_base: Duration,
}

impl HttpPageSource {
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|source| FetchError::Http {
                url: "<client>".to_string(),
                source,
            })?;
        Ok(Self {
            client,
            max_retries: 3,
            retry_base: Duration::from_millis(500),
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base.saturating_mul(1u32 << (attempt - 1).min(10))
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let res = self.client.get(url).send().await;
            let err = match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        match rsp.text().await {
                            Ok(body) => {
                                tracing::debug!(url, bytes = body.len(), "fetched page");
                                return Ok(body);
                            }
                            Err(source) => FetchError::Http {
                                url: url.to_string(),
                                source,
                            },
                        }
                    } else {
                        let e = FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        };
                        // Client errors will not fix themselves.
                        if status.is_client_error() && status.as_u16() != 429 {
                            return Err(e);
                        }
                        e
                    }
                }
                Err(source) => FetchError::Http {
                    url: url.to_string(),
                    source,
                },
            };

            tracing::warn!(url, attempt, max = self.max_retries, error = %err, "page fetch attempt failed");
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(self.backoff(attempt)).await;
        }
    }
}

/// In-memory pages keyed by URL; unknown URLs answer `FetchError::Missing`.
#[derive(Debug, Clone, Default)]
pub struct FixturePages {
    pages: HashMap<String, String>,
}

impl FixturePages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }
}

#[async_trait]
impl PageSource for FixturePages {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Missing {
                url: url.to_string(),
            })
    }
}

use crate::app::ports::{HttpClientPort, HttpFailure, SourcePayload, SourcePort};
use crate::calendar::file_name;
use crate::error::IngestError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Downloads the day's workbook from the publisher.
pub struct HttpSource {
    client: Arc<dyn HttpClientPort>,
    base_url: String,
    suffix: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpSource {
    pub fn new(
        client: Arc<dyn HttpClientPort>,
        base_url: impl Into<String>,
        suffix: impl Into<String>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            suffix: suffix.into(),
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    pub fn url_for(&self, target: NaiveDate) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/{}", file_name(target, &self.suffix))
    }

    /// One GET. The flag says whether another attempt could succeed.
    async fn attempt(&self, url: &str, name: &str) -> Result<SourcePayload, (IngestError, bool)> {
        let resp = self.client.get(url).await.map_err(|e| match e {
            HttpFailure::Connect(msg) => (IngestError::SourceUnavailable(format!("{url}: {msg}")), true),
            HttpFailure::Transport(msg) => (IngestError::SourceTransport(format!("{url}: {msg}")), true),
        })?;
        match resp.status {
            200..=299 => {
                debug!(
                    bytes = resp.bytes.len(),
                    content_type = %resp.content_type,
                    last_modified = ?resp.last_modified,
                    "downloaded workbook"
                );
                Ok(SourcePayload::new(name, resp.bytes))
            }
            // Not published yet; it will not appear within one run.
            404 => Err((
                IngestError::SourceNotFound(format!("{url} is not published (HTTP 404)")),
                false,
            )),
            status => Err((
                IngestError::SourceTransport(format!("{url}: HTTP {status}")),
                status >= 500,
            )),
        }
    }
}

#[async_trait]
impl SourcePort for HttpSource {
    fn name_for(&self, target: NaiveDate) -> String {
        file_name(target, &self.suffix)
    }

    async fn fetch(&self, target: NaiveDate) -> Result<SourcePayload, IngestError> {
        let url = self.url_for(target);
        let name = self.name_for(target);
        info!(%url, "fetching workbook");

        let mut attempt = 1;
        loop {
            match self.attempt(&url, &name).await {
                Ok(payload) => return Ok(payload),
                Err((e, true)) if attempt < self.max_retries => {
                    let delay = self.retry_delay * attempt;
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err((e, _)) => return Err(e),
            }
        }
    }
}

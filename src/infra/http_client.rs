use crate::app::ports::{HttpClientPort, HttpFailure, HttpGetResult};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LAST_MODIFIED};
use std::time::Duration;

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self, HttpFailure> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("medsupply/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpFailure::Connect(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpGetResult, HttpFailure> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                HttpFailure::Connect(e.to_string())
            } else {
                HttpFailure::Transport(e.to_string())
            }
        })?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| HttpFailure::Transport(e.to_string()))?
            .to_vec();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        Ok(HttpGetResult {
            status,
            bytes,
            content_type,
            last_modified,
        })
    }
}

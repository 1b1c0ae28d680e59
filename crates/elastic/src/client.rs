//! Elasticsearch document sink.

use crate::config::ElasticConfig;
use async_trait::async_trait;
use flow_core::{Error, FlowRecord, RecordSink, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Writes one document per flow record through the index API.
#[derive(Clone)]
pub struct ElasticSink {
    http: reqwest::Client,
    document_url: Url,
    config: ElasticConfig,
    /// Outcome of the most recent index request
    last_write_ok: Arc<AtomicBool>,
}

impl ElasticSink {
    pub fn new(config: ElasticConfig) -> Result<Self> {
        let document_url = config.document_url()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::connection(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            url = %config.url,
            index = %config.index,
            "Created Elasticsearch sink"
        );

        Ok(Self {
            http,
            document_url,
            config,
            last_write_ok: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn config(&self) -> &ElasticConfig {
        &self.config
    }

    pub(crate) fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.http.request(method, url);
        match self.config.credentials() {
            Some((username, password)) => request.basic_auth(username, password),
            None => request,
        }
    }
}

#[async_trait]
impl RecordSink for ElasticSink {
    async fn index(&self, record: &FlowRecord) -> Result<()> {
        let result = self.post_document(record).await;
        self.last_write_ok.store(result.is_ok(), Ordering::Relaxed);
        result
    }

    /// False while the latest index request failed.
    fn is_healthy(&self) -> bool {
        self.last_write_ok.load(Ordering::Relaxed)
    }
}

impl ElasticSink {
    async fn post_document(&self, record: &FlowRecord) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, self.document_url.clone())
            .json(record)
            .send()
            .await
            .map_err(|e| Error::sink(format!("index request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::sink(format!("index returned {}: {}", status, body)));
        }

        debug!(index = %self.config.index, "Document indexed");
        Ok(())
    }
}

//! Elasticsearch configuration.

use flow_core::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Elasticsearch sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticConfig {
    /// Cluster base URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Index the flow documents are written to
    #[serde(default = "default_index")]
    pub index: String,
    /// Username (optional)
    #[serde(default)]
    pub username: Option<String>,
    /// Password (optional)
    #[serde(default)]
    pub password: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index() -> String {
    "flows".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            index: default_index(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ElasticConfig {
    /// Parsed base URL, always ending in `/` so joins append.
    pub fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| Error::config(format!("invalid elastic url {:?}: {}", self.url, e)))?;

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// `{url}/{index}/_doc`
    pub fn document_url(&self) -> Result<Url> {
        if self.index.is_empty() || self.index.contains('/') {
            return Err(Error::config(format!("invalid index name {:?}", self.index)));
        }

        self.base_url()?
            .join(&format!("{}/_doc", self.index))
            .map_err(|e| Error::config(format!("invalid document url: {}", e)))
    }

    /// Basic auth credentials, when a username is configured.
    pub fn credentials(&self) -> Option<(&str, Option<&str>)> {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| (u, self.password.as_deref()))
    }
}

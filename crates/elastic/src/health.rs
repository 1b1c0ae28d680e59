//! Elasticsearch health checks.

use crate::client::ElasticSink;
use tracing::{debug, error};

/// Checks that the cluster root endpoint answers with a success status.
pub async fn check_connection(sink: &ElasticSink) -> bool {
    let url = match sink.config().base_url() {
        Ok(url) => url,
        Err(e) => {
            error!("Elasticsearch health check failed: {}", e);
            return false;
        }
    };

    match sink.request(reqwest::Method::GET, url).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("Elasticsearch connection healthy");
            true
        }
        Ok(response) => {
            error!(
                "Elasticsearch health check failed: status {}",
                response.status()
            );
            false
        }
        Err(e) => {
            error!("Elasticsearch health check failed: {}", e);
            false
        }
    }
}

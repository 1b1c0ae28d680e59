//! Kafka health checks.

use crate::config::KafkaConfig;
use crate::consumer::client_builder;
use tracing::{debug, error};

/// Checks that the brokers answer and the configured topic exists.
pub async fn check_connection(config: &KafkaConfig) -> bool {
    let client = match client_builder(config).build().await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to Kafka: {}", e);
            return false;
        }
    };

    match client.list_topics().await {
        Ok(topics) => match topics.iter().find(|t| t.name == config.topic) {
            Some(topic) => {
                debug!(
                    topic = %topic.name,
                    partitions = topic.partitions.len(),
                    "Kafka connection healthy"
                );
                true
            }
            None => {
                error!(topic = %config.topic, "Kafka topic does not exist");
                false
            }
        },
        Err(e) => {
            error!("Failed to list Kafka topics: {}", e);
            false
        }
    }
}

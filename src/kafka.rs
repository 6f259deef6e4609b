use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::time::Duration;

use crate::sink::SinkError;
use crate::stream::Publisher;

/// Kafka transport for the stream sink: each encoded line becomes one
/// message on the configured topic.
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    /// Create a producer and make sure the cluster answers a metadata
    /// request for `topic` within `timeout`.
    ///
    /// `brokers` is a comma-separated list of broker addresses.
    pub async fn connect(brokers: &str, topic: &str, timeout: Duration) -> Result<Self, SinkError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .create()
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        // Blocking call; fine on the stream sink's dedicated worker thread.
        producer
            .client()
            .fetch_metadata(Some(topic), timeout)
            .map_err(|e| SinkError::Connection(format!("{}: {}", brokers, e)))?;

        Ok(KafkaPublisher { producer, timeout })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), SinkError> {
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);
        // Wait for the delivery report with a bounded timeout.
        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| SinkError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.producer
            .flush(self.timeout)
            .map_err(|e| SinkError::Publish(e.to_string()))
    }
}

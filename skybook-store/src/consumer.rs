use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use skybook_core::bus::{BusError, InboundMessage, MessageSource};
use std::time::Duration;
use tracing::info;

/// Kafka consumer with manual offset commits, meant to be driven by a
/// [`crate::Subscription`] poll thread.
pub struct KafkaSource {
    consumer: BaseConsumer,
    topic: String,
}

impl KafkaSource {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, BusError> {
        let subscription_failed = |reason: String| BusError::SubscriptionFailed {
            topic: topic.to_string(),
            reason,
        };

        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| subscription_failed(format!("consumer creation failed: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| subscription_failed(e.to_string()))?;

        info!(topic, group_id, "Kafka consumer subscribed, manual commit enabled");

        Ok(Self {
            consumer,
            topic: topic.to_string(),
        })
    }
}

impl MessageSource for KafkaSource {
    fn poll(&mut self, timeout: Duration) -> Option<Result<InboundMessage, BusError>> {
        let result = self.consumer.poll(timeout)?;

        Some(
            result
                .map(|m| InboundMessage {
                    topic: m.topic().to_string(),
                    partition: m.partition(),
                    offset: m.offset(),
                    key: m.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                    payload: m.payload().map(<[u8]>::to_vec),
                })
                .map_err(|e| BusError::Transport(e.to_string())),
        )
    }

    fn commit(&mut self, message: &InboundMessage) -> Result<(), BusError> {
        // Kafka commits the offset of the next message to read
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| BusError::Commit(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| BusError::Commit(e.to_string()))
    }

    fn rewind(&mut self, message: &InboundMessage) -> Result<(), BusError> {
        self.consumer
            .seek(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset),
                Duration::from_secs(1),
            )
            .map_err(|e| BusError::Transport(format!("seek failed: {}", e)))
    }

    fn close(&mut self) {
        info!(topic = %self.topic, "Closing Kafka consumer");
        self.consumer.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_source_can_move_to_poll_thread() {
        fn assert_source<T: MessageSource>() {}
        assert_source::<KafkaSource>();
    }
}

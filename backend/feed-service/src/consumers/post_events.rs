//! Post-created event source
//!
//! The fanout writer pulls messages through `PostEventSource` and commits
//! offsets explicitly. Auto-commit stays off: an offset is only committed
//! after the fanout of that message and of every earlier message on the
//! same partition has succeeded.

use super::offsets::{CommitOffset, MessagePosition};
use crate::config::KafkaConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info};

/// One undecoded event and where it came from
#[derive(Debug, Clone)]
pub struct PostEventMessage {
    pub payload: Vec<u8>,
    pub position: MessagePosition,
}

#[async_trait]
pub trait PostEventSource: Send {
    /// Wait up to `timeout` for the next message. `None` means nothing arrived.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<PostEventMessage>>;

    async fn commit(&mut self, offset: &CommitOffset) -> Result<()>;

    /// Leave the consumer group. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Kafka consumer with manual offset commits
pub struct KafkaPostEventSource {
    consumer: Option<StreamConsumer>,
}

impl KafkaPostEventSource {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!(
            topics = ?config.topics,
            group_id = %config.group_id,
            "Starting post events consumer"
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.offset_reset)
            .set("fetch.min.bytes", &config.fetch_min_bytes)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics)?;

        Ok(Self {
            consumer: Some(consumer),
        })
    }

    fn consumer(&self) -> Result<&StreamConsumer> {
        self.consumer
            .as_ref()
            .ok_or_else(|| AppError::Internal("post events consumer is closed".to_string()))
    }
}

#[async_trait]
impl PostEventSource for KafkaPostEventSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<PostEventMessage>> {
        let consumer = self.consumer()?;
        let record = match tokio::time::timeout(timeout, consumer.recv()).await {
            Err(_) => return Ok(None),
            Ok(result) => result?,
        };

        let position = MessagePosition {
            topic: record.topic().to_string(),
            partition: record.partition(),
            offset: record.offset(),
        };
        let payload = record.payload().map(<[u8]>::to_vec).unwrap_or_default();
        debug!(
            topic = %position.topic,
            partition = position.partition,
            offset = position.offset,
            bytes = payload.len(),
            "Received post event"
        );

        Ok(Some(PostEventMessage { payload, position }))
    }

    async fn commit(&mut self, offset: &CommitOffset) -> Result<()> {
        let consumer = self.consumer()?;
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &offset.topic,
            offset.partition,
            Offset::Offset(offset.next_offset),
        )?;
        consumer.commit(&tpl, CommitMode::Async)?;
        debug!(
            topic = %offset.topic,
            partition = offset.partition,
            next_offset = offset.next_offset,
            "Committed offset"
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            info!("Post events consumer closed");
        }
        Ok(())
    }
}

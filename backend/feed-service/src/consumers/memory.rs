use super::offsets::{CommitOffset, MessagePosition};
use super::post_events::{PostEventMessage, PostEventSource};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Shared {
    next_offsets: HashMap<i32, i64>,
    commits: Vec<CommitOffset>,
    closed: bool,
}

/// Process-local event source. Offsets are assigned per partition on publish
/// and commits are recorded for inspection.
pub struct InMemoryPostEventSource {
    receiver: mpsc::UnboundedReceiver<PostEventMessage>,
    shared: Arc<Mutex<Shared>>,
}

/// Producer side of an `InMemoryPostEventSource`
#[derive(Clone)]
pub struct InMemoryPostEvents {
    topic: String,
    sender: mpsc::UnboundedSender<PostEventMessage>,
    shared: Arc<Mutex<Shared>>,
}

impl InMemoryPostEventSource {
    pub fn new(topic: impl Into<String>) -> (Self, InMemoryPostEvents) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                receiver,
                shared: shared.clone(),
            },
            InMemoryPostEvents {
                topic: topic.into(),
                sender,
                shared,
            },
        )
    }
}

impl InMemoryPostEvents {
    /// Enqueue a payload on `partition`, returning its position.
    pub fn publish(&self, partition: i32, payload: impl Into<Vec<u8>>) -> MessagePosition {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        let offset = shared.next_offsets.entry(partition).or_insert(0);
        let position = MessagePosition {
            topic: self.topic.clone(),
            partition,
            offset: *offset,
        };
        *offset += 1;
        drop(shared);

        // The receiver only goes away with the source; nothing to deliver to then
        let _ = self.sender.send(PostEventMessage {
            payload: payload.into(),
            position: position.clone(),
        });
        position
    }

    /// Every commit issued so far, in order
    pub fn commits(&self) -> Vec<CommitOffset> {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .commits
            .clone()
    }

    /// Highest committed next-offset of a partition
    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.commits()
            .iter()
            .filter(|c| c.partition == partition)
            .map(|c| c.next_offset)
            .max()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).closed
    }
}

#[async_trait]
impl PostEventSource for InMemoryPostEventSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<PostEventMessage>> {
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => {
                // All producers dropped; behave like an idle topic
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }

    async fn commit(&mut self, offset: &CommitOffset) -> Result<()> {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .commits
            .push(offset.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.receiver.close();
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).closed = true;
        Ok(())
    }
}

//! In-process pub/sub hub for dispatch events.
//!
//! Topic-keyed broadcast channels feeding the SSE endpoint. Every event goes to
//! the firehose topic plus the topic of the issue it belongs to.
//!
//! # Usage
//!
//! Producers (orchestrator):
//!   hub.publish(&issue_topic(issue_id), event).await;
//!
//! Consumers (SSE endpoints):
//!   let rx = hub.subscribe(ALL_EVENTS).await;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::common::IssueId;

/// Topic that receives every published event.
pub const ALL_EVENTS: &str = "dispatch";

pub fn issue_topic(issue_id: IssueId) -> String {
    format!("issue:{}", issue_id)
}

/// Thread-safe, cloneable hub keyed by string topics.
pub struct StreamHub<T> {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<T>>>>,
    capacity: usize,
}

impl<T> Clone for StreamHub<T> {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone + Send + 'static> StreamHub<T> {
    /// Create a new hub with default capacity (256 messages per channel).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Publish to one topic. Returns how many receivers got it (0 when nobody listens).
    pub async fn publish(&self, topic: &str, value: T) -> usize {
        let channels = self.channels.read().await;
        match channels.get(topic) {
            Some(tx) => tx.send(value).unwrap_or(0),
            None => 0,
        }
    }

    /// Publish to the firehose and to `topic`.
    pub async fn publish_scoped(&self, topic: &str, value: T) {
        self.publish(topic, value.clone()).await;
        self.publish(ALL_EVENTS, value).await;
    }

    /// Subscribe to a topic. Creates the channel if it doesn't exist.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<T> {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tx.subscribe()
    }

    /// Remove channels with zero subscribers. Returns how many were dropped.
    pub async fn cleanup(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        before - channels.len()
    }

    pub async fn topic_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl<T: Clone + Send + 'static> Default for StreamHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scoped_publish_reaches_issue_and_firehose() {
        let hub: StreamHub<u32> = StreamHub::new();
        let issue_id = IssueId::new();
        let mut all = hub.subscribe(ALL_EVENTS).await;
        let mut scoped = hub.subscribe(&issue_topic(issue_id)).await;
        let mut other = hub.subscribe(&issue_topic(IssueId::new())).await;

        hub.publish_scoped(&issue_topic(issue_id), 7).await;

        assert_eq!(all.recv().await.unwrap(), 7);
        assert_eq!(scoped.recv().await.unwrap(), 7);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub: StreamHub<u32> = StreamHub::new();
        assert_eq!(hub.publish("nobody:listening", 1).await, 0);
    }

    #[tokio::test]
    async fn cleanup_removes_empty_channels() {
        let hub: StreamHub<u32> = StreamHub::new();
        let rx = hub.subscribe("ephemeral").await;
        assert_eq!(hub.channels.read().await.len(), 1);

        drop(rx);
        assert_eq!(hub.cleanup().await, 1);

        assert_eq!(hub.topic_count().await, 0);
    }
}

//! Per-job event fan-out
//!
//! Each job owns one broadcaster; any number of subscribers receive every
//! event published after they attached, in publish order. Publication
//! never blocks on consumers: a subscriber that falls a full channel
//! behind is dropped, not waited for.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::metrics::global_metrics;

/// Delivery queue depth per subscriber before it is dropped
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Progress and terminal events of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// One frame was scored
    Frame {
        /// People in this frame
        count: u32,
        /// Maximum seen so far
        max_count: u32,
    },

    /// The job finished without a failure (source exhausted, time budget
    /// reached, or cancelled)
    Done {
        /// Final maximum count
        max_count: u32,
        /// Recorded annotated output, when one was produced
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_url: Option<String>,
    },

    /// The job failed; no further events follow
    Error { message: String },
}

impl JobEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Frame { .. })
    }
}

/// Why a subscriber stopped receiving events
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubscriberError {
    /// The subscriber could not keep up and was dropped; the job is
    /// unaffected
    #[error("subscriber fell {missed} events behind and was dropped")]
    Overflow { missed: u64 },
}

/// Per-job event publisher
#[derive(Debug)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers
    ///
    /// Publishing with zero subscribers is not an error: the job loop
    /// must proceed identically whether anyone is watching or not.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.tx.send(event);
        global_metrics().event_published();
    }

    /// Attach a new subscriber; it only sees events published after this
    /// call (no replay)
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Live handle of one event consumer; dropping it unsubscribes
pub struct EventSubscriber {
    rx: broadcast::Receiver<JobEvent>,
}

impl EventSubscriber {
    /// Receive the next event in publish order
    ///
    /// `Ok(None)` means the job (and its broadcaster) is gone. An
    /// `Overflow` error means this subscriber lagged past its queue and
    /// must be discarded by the caller.
    pub async fn next(&mut self) -> Result<Option<JobEvent>, SubscriberError> {
        match self.rx.recv().await {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::RecvError::Closed) => Ok(None),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                Err(SubscriberError::Overflow { missed })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_delivered_in_publish_order() {
        let broadcaster = EventBroadcaster::new();
        let mut sub = broadcaster.subscribe();

        for i in 1..=3 {
            broadcaster.publish(JobEvent::Frame {
                count: i,
                max_count: i,
            });
        }
        broadcaster.publish(JobEvent::Done {
            max_count: 3,
            video_url: None,
        });

        let mut counts = Vec::new();
        loop {
            match sub.next().await.unwrap().unwrap() {
                JobEvent::Frame { count, .. } => counts.push(count),
                event => {
                    assert!(event.is_terminal());
                    break;
                }
            }
        }
        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_no_replay_before_subscription() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.publish(JobEvent::Frame {
            count: 9,
            max_count: 9,
        });

        let mut sub = broadcaster.subscribe();
        broadcaster.publish(JobEvent::Frame {
            count: 1,
            max_count: 9,
        });

        match sub.next().await.unwrap().unwrap() {
            JobEvent::Frame { count, .. } => assert_eq!(count, 1),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_overflows() {
        let broadcaster = EventBroadcaster::with_capacity(4);
        let mut sub = broadcaster.subscribe();

        // Never read while far more than the queue depth is published
        for i in 0..64 {
            broadcaster.publish(JobEvent::Frame {
                count: i,
                max_count: i,
            });
        }

        match sub.next().await {
            Err(SubscriberError::Overflow { missed }) => assert!(missed > 0),
            other => panic!("expected overflow, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let broadcaster = EventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        broadcaster.publish(JobEvent::Error {
            message: "nobody listening".to_string(),
        });
    }

    #[test]
    fn test_wire_shapes() {
        let frame = serde_json::to_string(&JobEvent::Frame {
            count: 2,
            max_count: 5,
        })
        .unwrap();
        assert_eq!(frame, r#"{"type":"frame","count":2,"max_count":5}"#);

        let done = serde_json::to_string(&JobEvent::Done {
            max_count: 5,
            video_url: None,
        })
        .unwrap();
        assert_eq!(done, r#"{"type":"done","max_count":5}"#);

        let err = serde_json::to_string(&JobEvent::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(err, r#"{"type":"error","message":"boom"}"#);
    }
}

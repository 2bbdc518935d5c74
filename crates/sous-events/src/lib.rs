use sous_protocol::SessionEventRecord;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Fans applied session transitions out to every subscribed observer.
///
/// Slow subscribers lag (and skip) rather than block the store, which
/// publishes while holding its table lock.
#[derive(Clone, Debug)]
pub struct EventStreamHub {
    sender: broadcast::Sender<SessionEventRecord>,
}

impl EventStreamHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    pub fn publish(&self, record: SessionEventRecord) {
        let delivered = self.sender.send(record).unwrap_or(0);
        trace!(delivered, "session event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEventRecord> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<SessionEventRecord> {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventStreamHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use futures_util::StreamExt;
    use sous_protocol::{SessionEvent, SessionEventRecord};

    use crate::EventStreamHub;

    fn paused(sequence: u64) -> SessionEventRecord {
        SessionEventRecord {
            at_ms: 1_000 + sequence,
            sequence,
            event: SessionEvent::Paused {
                recipe_id: "r1".into(),
            },
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let hub = EventStreamHub::new(4);
        assert_eq!(hub.receiver_count(), 0);
        hub.publish(paused(1));
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() -> Result<()> {
        let hub = EventStreamHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe_stream();
        assert_eq!(hub.receiver_count(), 2);

        hub.publish(paused(1));
        hub.publish(paused(2));

        assert_eq!(first.recv().await?.sequence, 1);
        assert_eq!(first.recv().await?.sequence, 2);

        let streamed: Vec<u64> = second
            .by_ref()
            .take(2)
            .map(|item| item.map(|record| record.sequence).unwrap_or(0))
            .collect()
            .await;
        assert_eq!(streamed, vec![1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_new_events() -> Result<()> {
        let hub = EventStreamHub::default();
        hub.publish(paused(1));
        let mut late = hub.subscribe();
        hub.publish(paused(2));
        assert_eq!(late.recv().await?.sequence, 2);
        Ok(())
    }
}

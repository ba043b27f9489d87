//! Per-subscriber buffered event fan-out.
//!
//! A single dispatcher task owns the list of listeners. Publishing and
//! subscribing are both commands on the dispatcher's inbox, so a listener
//! registered before an event is published always receives it and one
//! registered after never does.
//!
//! Every listener has its own unbounded queue. A slow listener only grows
//! its own queue; it never delays or drops events for anyone else. When a
//! listener drops its stream, the dispatcher prunes it on the next publish.
//!
//! Each event is wrapped once in an `Arc<PublishedEvent>` and the same
//! allocation is queued for every listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt as _;
use opsview_types::{Event, PublishedEvent};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::StoreError;
use crate::store::EventStream;

/// Commands processed by the dispatcher, in arrival order.
enum Command {
    Publish(Arc<PublishedEvent>),
    Subscribe(mpsc::UnboundedSender<Arc<PublishedEvent>>),
    Reset,
}

/// Handle to a running fan-out dispatcher.
///
/// Cloning the handle shares the dispatcher. The dispatcher stops once
/// every handle is dropped.
#[derive(Clone)]
pub struct Fanout {
    inbox: mpsc::UnboundedSender<Command>,
    listeners: Arc<AtomicUsize>,
}

impl Fanout {
    /// Spawn a dispatcher on the current Tokio runtime.
    pub fn spawn() -> Self {
        let (inbox, commands) = mpsc::unbounded_channel();
        let listeners = Arc::new(AtomicUsize::new(0));
        tokio::spawn(dispatch(commands, Arc::clone(&listeners)));
        Self { inbox, listeners }
    }

    /// Queue `event` for every registered listener.
    pub fn publish(&self, event: Event) -> Result<(), StoreError> {
        self.send(Command::Publish(Arc::new(PublishedEvent::new(event))))
    }

    /// Register a new listener and return its event stream.
    pub fn subscribe(&self) -> Result<EventStream, StoreError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.send(Command::Subscribe(tx))?;
        Ok(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed())
    }

    /// Drop every current listener.
    ///
    /// Their streams end once they have drained what was already queued.
    /// Used when the upstream source may have lost events, so that no
    /// listener keeps applying later deltas to an incomplete state.
    /// Listeners subscribing afterwards are unaffected.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.send(Command::Reset)
    }

    fn send(&self, command: Command) -> Result<(), StoreError> {
        self.inbox.send(command).map_err(|e| {
            debug!(error = %e, "fan-out dispatcher gone");
            StoreError::ChannelClosed
        })
    }

    /// Number of listeners the dispatcher currently delivers to.
    pub fn listener_count(&self) -> usize {
        self.listeners.load(Ordering::Relaxed)
    }
}

async fn dispatch(mut commands: mpsc::UnboundedReceiver<Command>, count: Arc<AtomicUsize>) {
    let mut listeners: Vec<mpsc::UnboundedSender<Arc<PublishedEvent>>> = Vec::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Subscribe(tx) => listeners.push(tx),
            Command::Publish(event) => {
                listeners.retain(|tx| tx.send(Arc::clone(&event)).is_ok());
            }
            Command::Reset => {
                debug!(listeners = listeners.len(), "Closing all fan-out listeners");
                listeners.clear();
            }
        }
        count.store(listeners.len(), Ordering::Relaxed);
    }

    debug!("fan-out dispatcher stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use opsview_types::{Document, Entity};

    use super::*;

    fn full(key: &str) -> Event {
        Event::Full {
            entity: Entity::new(key, Document::Null),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn every_listener_sees_every_event_in_order() {
        let fanout = Fanout::spawn();
        let mut a = fanout.subscribe().unwrap();
        let mut b = fanout.subscribe().unwrap();

        for key in ["c1", "c2", "c3"] {
            fanout.publish(full(key)).unwrap();
        }

        for stream in [&mut a, &mut b] {
            for key in ["c1", "c2", "c3"] {
                assert_eq!(stream.next().await.map(|e| e.key().to_owned()), Some(key.to_owned()));
            }
        }
    }

    #[tokio::test]
    async fn late_listener_misses_earlier_events() {
        let fanout = Fanout::spawn();
        fanout.publish(full("before")).unwrap();
        let mut late = fanout.subscribe().unwrap();
        fanout.publish(full("after")).unwrap();

        assert_eq!(late.next().await.map(|e| e.key().to_owned()), Some("after".to_owned()));
    }

    #[tokio::test]
    async fn slow_listener_does_not_hold_back_others() {
        let fanout = Fanout::spawn();
        let _idle = fanout.subscribe().unwrap();
        let mut active = fanout.subscribe().unwrap();

        for i in 0..1000_u32 {
            fanout.publish(full(&format!("c{i}"))).unwrap();
        }

        let received = tokio::time::timeout(
            Duration::from_secs(1),
            (&mut active).take(1000).count(),
        )
        .await
        .unwrap();
        assert_eq!(received, 1000);
    }

    #[tokio::test]
    async fn dropped_listener_is_pruned() {
        let fanout = Fanout::spawn();
        let stream = fanout.subscribe().unwrap();
        settle().await;
        assert_eq!(fanout.listener_count(), 1);

        drop(stream);
        fanout.publish(full("c1")).unwrap();
        settle().await;
        assert_eq!(fanout.listener_count(), 0);
    }

    #[tokio::test]
    async fn reset_ends_current_listeners_only() {
        let fanout = Fanout::spawn();
        let mut before = fanout.subscribe().unwrap();
        fanout.publish(full("c1")).unwrap();
        fanout.reset().unwrap();
        let mut after = fanout.subscribe().unwrap();
        fanout.publish(full("c2")).unwrap();

        // Already-queued events drain, then the stream ends.
        assert_eq!(before.next().await.map(|e| e.key().to_owned()), Some("c1".to_owned()));
        assert!(before.next().await.is_none());

        assert_eq!(after.next().await.map(|e| e.key().to_owned()), Some("c2".to_owned()));
        settle().await;
        assert_eq!(fanout.listener_count(), 1);
    }

    #[tokio::test]
    async fn listeners_share_one_published_event() {
        let fanout = Fanout::spawn();
        let mut a = fanout.subscribe().unwrap();
        let mut b = fanout.subscribe().unwrap();
        fanout.publish(full("c1")).unwrap();

        let (x, y) = (a.next().await.unwrap(), b.next().await.unwrap());
        assert!(Arc::ptr_eq(&x, &y));
    }
}

//! Live feed of recent captures and the listener → UI mailbox.
//!
//! ```text
//!  listener tasks ──notify()──▶ MailboxSink ══ bounded mpsc ══▶ UiLoop::drain()
//!                                                                  │
//!                                                                  ▼
//!                                                              LiveFeed ──▶ FeedEvent (broadcast)
//! ```
//!
//! The [`LiveFeed`] is owned by exactly one [`UiLoop`]. Listener tasks never
//! touch it; they only enqueue records through a [`MailboxSink`], and the
//! loop applies them on its own tick. Observers (a renderer, the CLI) follow
//! changes through [`LiveFeed::subscribe`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use scancatch_core::models::CapturedRequest;
use scancatch_core::store::RequestStore;
use scancatch_core::StorageError;

use crate::delivery::{DeliveryError, DeliveryOutcome, Deliverer};

/// Default feed capacity.
pub const FEED_CAPACITY: usize = 100;

/// Number of stored records loaded into the feed at startup.
pub const SEED_LIMIT: usize = 50;

const EVENT_BUFFER: usize = 256;

/// Field-level change on a record already in the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChange {
    Copied,
}

/// Notifications emitted by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Added(CapturedRequest),
    Evicted(i64),
    Changed { id: i64, change: RecordChange },
}

/// Bounded, most-recent-first view of captured records.
pub struct LiveFeed {
    records: VecDeque<CapturedRequest>,
    capacity: usize,
    events: broadcast::Sender<FeedEvent>,
}

impl LiveFeed {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            records: VecDeque::with_capacity(capacity.saturating_add(1)),
            capacity: capacity.max(1),
            events,
        }
    }

    /// Insert at the front, evicting from the back past capacity.
    pub fn push(&mut self, record: CapturedRequest) {
        self.records.push_front(record.clone());
        let _ = self.events.send(FeedEvent::Added(record));

        while self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop_back() {
                let _ = self.events.send(FeedEvent::Evicted(evicted.id));
            }
        }
    }

    /// Load records as returned by [`RequestStore::recent`] (newest first).
    ///
    /// They are pushed oldest first so the newest ends up at the front.
    pub fn seed(&mut self, newest_first: Vec<CapturedRequest>) {
        for record in newest_first.into_iter().rev() {
            self.push(record);
        }
    }

    /// Flip the copied flag on a feed record.
    ///
    /// Emits [`RecordChange::Copied`] only on the false→true transition.
    /// Returns whether that transition happened.
    pub fn mark_copied(&mut self, id: i64) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        let changed = record.mark_copied();
        if changed {
            let _ = self.events.send(FeedEvent::Changed {
                id,
                change: RecordChange::Copied,
            });
        }
        changed
    }

    pub fn get(&self, id: i64) -> Option<&CapturedRequest> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Records, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &CapturedRequest> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

/// Receives each captured record once it has been persisted.
#[async_trait]
pub trait CaptureSink: Send + Sync {
    async fn notify(&self, record: CapturedRequest);
}

/// [`CaptureSink`] that enqueues records for the UI loop.
#[derive(Clone)]
pub struct MailboxSink {
    tx: mpsc::Sender<CapturedRequest>,
}

/// Create a bounded mailbox. The receiving half goes to [`UiLoop::new`].
pub fn mailbox(capacity: usize) -> (MailboxSink, mpsc::Receiver<CapturedRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MailboxSink { tx }, rx)
}

#[async_trait]
impl CaptureSink for MailboxSink {
    /// Never waits on the UI loop. A full or closed mailbox drops the
    /// notification; the record is already in the store and is picked up
    /// again by [`UiLoop::seed_from`].
    async fn notify(&self, record: CapturedRequest) {
        let id = record.id;
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(id, "UI mailbox full; capture kept in store only");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(id, "UI loop is gone; capture kept in store only");
            }
        }
    }
}

/// Owner of the [`LiveFeed`]; the only place feed mutation happens.
pub struct UiLoop {
    feed: LiveFeed,
    inbox: mpsc::Receiver<CapturedRequest>,
}

impl UiLoop {
    pub fn new(feed: LiveFeed, inbox: mpsc::Receiver<CapturedRequest>) -> Self {
        Self { feed, inbox }
    }

    /// Seed the feed from the store's most recent records.
    pub async fn seed_from(
        &mut self,
        store: &Arc<dyn RequestStore>,
        limit: usize,
    ) -> Result<usize, StorageError> {
        let recent = store.recent(limit).await?;
        let count = recent.len();
        self.feed.seed(recent);
        Ok(count)
    }

    /// Apply every queued record to the feed. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(record) = self.inbox.try_recv() {
            self.feed.push(record);
            applied += 1;
        }
        applied
    }

    /// Drain on every `tick` until `shutdown` resolves, then drain once more.
    pub async fn run<F>(&mut self, tick: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let applied = self.drain();
                    if applied > 0 {
                        tracing::debug!(applied, total = self.feed.len(), "feed updated");
                    }
                }
            }
        }
        self.drain();
    }

    /// Deliver a feed record's body to the clipboard.
    ///
    /// On success the record is marked copied in the feed and then in the
    /// store; a store failure at that point is logged, not returned.
    pub async fn copy(
        &mut self,
        id: i64,
        deliverer: &Deliverer,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let payload = self
            .feed
            .get(id)
            .map(|r| r.body.clone())
            .ok_or(DeliveryError::UnknownRecord(id))?;

        let outcome = deliverer.deliver(&payload).await?;
        if outcome.is_copied() {
            self.feed.mark_copied(id);
            deliverer.persist_copied(id).await;
        }
        Ok(outcome)
    }

    pub fn feed(&self) -> &LiveFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use scancatch_core::models::NewCapturedRequest;

    fn rec(id: i64) -> CapturedRequest {
        NewCapturedRequest {
            method: "POST".to_string(),
            path: "/".to_string(),
            headers: String::new(),
            body: format!("body-{}", id),
            timestamp: Local::now(),
            client_ip: "127.0.0.1".to_string(),
            kind: String::new(),
        }
        .with_id(id)
    }

    #[test]
    fn test_push_is_most_recent_first() {
        let mut feed = LiveFeed::new(10);
        feed.push(rec(1));
        feed.push(rec(2));
        feed.push(rec(3));
        let ids: Vec<i64> = feed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut feed = LiveFeed::new(FEED_CAPACITY);
        let mut events = feed.subscribe();
        for id in 1..=101 {
            feed.push(rec(id));
        }
        assert_eq!(feed.len(), 100);
        assert_eq!(feed.iter().next().unwrap().id, 101);
        assert_eq!(feed.iter().last().unwrap().id, 2);
        assert!(feed.get(1).is_none());

        let mut evicted = Vec::new();
        while let Ok(ev) = events.try_recv() {
            if let FeedEvent::Evicted(id) = ev {
                evicted.push(id);
            }
        }
        assert_eq!(evicted, vec![1]);
    }

    #[test]
    fn test_seed_restores_chronological_push_order() {
        let mut feed = LiveFeed::new(10);
        // As returned by the store: newest first.
        feed.seed(vec![rec(5), rec(4), rec(3)]);
        let ids: Vec<i64> = feed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);

        feed.push(rec(6));
        assert_eq!(feed.iter().next().unwrap().id, 6);
    }

    #[test]
    fn test_mark_copied_emits_once() {
        let mut feed = LiveFeed::new(10);
        feed.push(rec(1));
        let mut events = feed.subscribe();

        assert!(feed.mark_copied(1));
        assert!(!feed.mark_copied(1));
        assert!(!feed.mark_copied(42));
        assert!(feed.get(1).unwrap().is_copied);

        assert_eq!(
            events.try_recv().unwrap(),
            FeedEvent::Changed {
                id: 1,
                change: RecordChange::Copied
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drain_applies_mailbox_in_order() {
        let (sink, inbox) = mailbox(8);
        let mut ui = UiLoop::new(LiveFeed::new(10), inbox);

        sink.notify(rec(1)).await;
        sink.notify(rec(2)).await;
        assert_eq!(ui.feed().len(), 0);

        assert_eq!(ui.drain(), 2);
        assert_eq!(ui.drain(), 0);
        let ids: Vec<i64> = ui.feed().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_full_mailbox_does_not_block_notify() {
        let (sink, inbox) = mailbox(1);
        let mut ui = UiLoop::new(LiveFeed::new(10), inbox);

        sink.notify(rec(1)).await;
        tokio::time::timeout(Duration::from_millis(200), sink.notify(rec(2)))
            .await
            .expect("notify waited on a full mailbox");

        assert_eq!(ui.drain(), 1);
        assert_eq!(ui.feed().iter().next().unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_closed_mailbox_is_ignored() {
        let (sink, inbox) = mailbox(1);
        drop(inbox);
        sink.notify(rec(1)).await;
    }

    #[tokio::test]
    async fn test_run_drains_before_exit() {
        let (sink, inbox) = mailbox(8);
        let mut ui = UiLoop::new(LiveFeed::new(10), inbox);
        sink.notify(rec(7)).await;

        ui.run(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
        })
        .await;

        assert_eq!(ui.feed().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_from_store() {
        use scancatch_core::store::memory::InMemoryStore;

        let store: Arc<dyn RequestStore> = Arc::new(InMemoryStore::new());
        for i in 0..60 {
            let mut r = NewCapturedRequest {
                method: "POST".to_string(),
                path: "/".to_string(),
                headers: String::new(),
                body: format!("b{}", i),
                timestamp: Local::now(),
                client_ip: "127.0.0.1".to_string(),
                kind: String::new(),
            };
            r.timestamp = r.timestamp + chrono::Duration::seconds(i);
            store.insert(&r).await.unwrap();
        }

        let (_sink, inbox) = mailbox(1);
        let mut ui = UiLoop::new(LiveFeed::new(FEED_CAPACITY), inbox);
        assert_eq!(ui.seed_from(&store, SEED_LIMIT).await.unwrap(), 50);
        assert_eq!(ui.feed().len(), 50);
        assert_eq!(ui.feed().iter().next().unwrap().body, "b59");
        assert_eq!(ui.feed().iter().last().unwrap().body, "b10");
    }
}

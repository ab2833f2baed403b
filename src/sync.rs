//! Keeps the `Store` in step with the backend.
//!
//! All backend traffic runs on spawned tokio tasks. Results come back to the
//! UI loop as `SyncEvent`s over an unbounded channel; the loop is the only
//! owner of the `Store` and applies them in arrival order. Fetches are
//! numbered when they are issued so the store can drop superseded results.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, WriteOp};
use crate::db::Snapshot;
use crate::error::Result;
use crate::realtime::{ChangeNotification, Subscription, DEPT_CHANNEL, TASKS_CHANNEL};

/// Messages from background work to the UI loop.
#[derive(Debug)]
pub enum SyncEvent {
    FetchStarted { seq: u64 },
    Fetched { seq: u64, result: Result<Snapshot> },
    Written { op: WriteOp, result: Result<()> },
}

/// Issues numbered full fetches. Cheap to clone.
#[derive(Clone)]
pub struct Refresher {
    backend: Arc<dyn Backend>,
    events: UnboundedSender<SyncEvent>,
    seq: Arc<AtomicU64>,
}

impl Refresher {
    pub fn new(backend: Arc<dyn Backend>, events: UnboundedSender<SyncEvent>) -> Self {
        Refresher {
            backend,
            events,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start a full fetch and return its sequence number.
    pub fn refresh(&self) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        // Sent before spawning, so the UI always sees the start before the result.
        let _ = self.events.send(SyncEvent::FetchStarted { seq });

        let backend = self.backend.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = backend.fetch_all().await;
            debug!(seq, ok = result.is_ok(), "fetch finished");
            let _ = events.send(SyncEvent::Fetched { seq, result });
        });
        seq
    }
}

/// Owns the change feed and runs writes.
pub struct Synchronizer {
    backend: Arc<dyn Backend>,
    refresher: Refresher,
    subscription: Option<Subscription>,
    forwarder: Option<JoinHandle<()>>,
}

impl Synchronizer {
    pub fn new(backend: Arc<dyn Backend>, events: UnboundedSender<SyncEvent>) -> Self {
        let refresher = Refresher::new(backend.clone(), events);
        Synchronizer {
            backend,
            refresher,
            subscription: None,
            forwarder: None,
        }
    }

    /// Initial fetch plus the change feed. Every notification triggers a full
    /// fetch. A feed that cannot be opened is logged and the dashboard keeps
    /// working without live updates.
    pub fn start(&mut self) {
        self.refresher.refresh();

        let (tx, mut rx) = mpsc::unbounded_channel::<ChangeNotification>();
        match self.backend.subscribe(&[TASKS_CHANNEL, DEPT_CHANNEL], tx) {
            Ok(subscription) => {
                info!("subscribed to change notifications");
                self.subscription = Some(subscription);
            }
            Err(e) => warn!(error = %e, "change notifications unavailable"),
        }

        let refresher = self.refresher.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                debug!(table = %change.table, kind = ?change.kind, "refetching after change");
                refresher.refresh();
            }
        }));
    }

    pub fn refresh(&self) -> u64 {
        self.refresher.refresh()
    }

    /// Run a write in the background. Success is followed by a full fetch;
    /// a failure is only reported.
    pub fn submit(&self, op: WriteOp) {
        let backend = self.backend.clone();
        let refresher = self.refresher.clone();
        tokio::spawn(async move {
            let result = backend.apply(&op).await;
            let ok = result.is_ok();
            match &result {
                Ok(()) => info!(op = %op.describe(), "write succeeded"),
                Err(e) => warn!(op = %op.describe(), error = %e, "write failed"),
            }
            let _ = refresher.events.send(SyncEvent::Written { op, result });
            if ok {
                refresher.refresh();
            }
        });
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Tear down the change feed. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            info!("unsubscribed from change notifications");
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::backend::Table;
    use crate::db::tests::snapshot;
    use crate::db::{FetchOutcome, Store};
    use crate::error::Error;
    use crate::fields::Id;
    use crate::realtime::{Channel, ChangeKind};

    /// In-memory backend recording every write.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub snapshot: Mutex<Snapshot>,
        pub fail_fetch: std::sync::atomic::AtomicBool,
        pub fail_writes: std::sync::atomic::AtomicBool,
        pub fetches: AtomicUsize,
        pub writes: Mutex<Vec<WriteOp>>,
        pub unsubscribes: Arc<AtomicUsize>,
        pub subscribed: Mutex<Vec<&'static str>>,
        pub notifier: Mutex<Option<UnboundedSender<ChangeNotification>>>,
    }

    impl FakeBackend {
        fn record(&self, op: WriteOp) -> Result<()> {
            let label = op.describe();
            self.writes.lock().unwrap().push(op);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::write(label, "HTTP 500"));
            }
            Ok(())
        }

        pub fn notify(&self, table: Table) {
            let guard = self.notifier.lock().unwrap();
            let tx = guard.as_ref().expect("not subscribed");
            tx.send(ChangeNotification { table, kind: ChangeKind::Update }).unwrap();
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn fetch_all(&self) -> Result<Snapshot> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(Error::Connection("HTTP 503".into()));
            }
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn insert(&self, table: Table, payload: Value) -> Result<()> {
            self.record(WriteOp::Insert { table, payload })
        }

        async fn update(&self, table: Table, id: &Id, payload: Value) -> Result<()> {
            self.record(WriteOp::Update { table, id: id.clone(), payload })
        }

        async fn delete(&self, table: Table, id: &Id) -> Result<()> {
            self.record(WriteOp::Delete { table, id: id.clone() })
        }

        fn subscribe(
            &self,
            channels: &[Channel],
            tx: UnboundedSender<ChangeNotification>,
        ) -> Result<Subscription> {
            self.subscribed
                .lock()
                .unwrap()
                .extend(channels.iter().map(|c| c.name));
            *self.notifier.lock().unwrap() = Some(tx);
            let count = self.unsubscribes.clone();
            Ok(Subscription::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    async fn next(rx: &mut UnboundedReceiver<SyncEvent>) -> SyncEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for sync event")
            .expect("event channel closed")
    }

    fn setup() -> (Arc<FakeBackend>, Synchronizer, UnboundedReceiver<SyncEvent>) {
        let fake = Arc::new(FakeBackend::default());
        *fake.snapshot.lock().unwrap() = snapshot();
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = Synchronizer::new(fake.clone(), tx);
        (fake, sync, rx)
    }

    #[tokio::test]
    async fn test_start_fetches_and_subscribes() {
        let (fake, mut sync, mut rx) = setup();
        sync.start();

        let mut store = Store::default();
        assert!(matches!(next(&mut rx).await, SyncEvent::FetchStarted { seq: 1 }));
        store.fetch_started(1);
        assert!(store.loading);
        match next(&mut rx).await {
            SyncEvent::Fetched { seq, result } => {
                assert_eq!(store.apply_fetch(seq, result), FetchOutcome::Applied);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!store.loading);
        assert_eq!(store.tasks.len(), 2);
        assert!(sync.is_subscribed());
        assert_eq!(*fake.subscribed.lock().unwrap(), vec!["tasks-changes", "dept-changes"]);
    }

    #[tokio::test]
    async fn test_change_notification_triggers_full_fetch() {
        let (fake, mut sync, mut rx) = setup();
        sync.start();
        next(&mut rx).await;
        next(&mut rx).await;

        fake.notify(Table::Comments);
        assert!(matches!(next(&mut rx).await, SyncEvent::FetchStarted { seq: 2 }));
        assert!(matches!(next(&mut rx).await, SyncEvent::Fetched { seq: 2, result: Ok(_) }));
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_reaches_store_as_error() {
        let (fake, mut sync, mut rx) = setup();
        fake.fail_fetch.store(true, Ordering::SeqCst);
        sync.start();

        let mut store = Store::default();
        match next(&mut rx).await {
            SyncEvent::FetchStarted { seq } => store.fetch_started(seq),
            other => panic!("unexpected event: {other:?}"),
        }
        let outcome = match next(&mut rx).await {
            SyncEvent::Fetched { seq, result } => store.apply_fetch(seq, result),
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(outcome, FetchOutcome::Failed);
        assert!(store.error.is_some());
        assert!(!store.loading);
    }

    #[tokio::test]
    async fn test_successful_write_refetches() {
        let (fake, sync, mut rx) = setup();
        let op = WriteOp::Insert { table: Table::Members, payload: json!({"name": "Ada"}) };
        sync.submit(op.clone());

        match next(&mut rx).await {
            SyncEvent::Written { op: written, result } => {
                assert_eq!(written, op);
                assert!(result.is_ok());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(next(&mut rx).await, SyncEvent::FetchStarted { .. }));
        assert_eq!(*fake.writes.lock().unwrap(), vec![op]);
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_without_refetch() {
        let (fake, sync, mut rx) = setup();
        fake.fail_writes.store(true, Ordering::SeqCst);
        sync.submit(WriteOp::Delete { table: Table::Tasks, id: Id::new("t1") });

        match next(&mut rx).await {
            SyncEvent::Written { result, .. } => {
                assert!(matches!(result, Err(Error::Write { .. })));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let quiet = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(quiet.is_err(), "no fetch expected after a failed write");
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_unsubscribes_exactly_once() {
        let (fake, mut sync, _rx) = setup();
        sync.start();
        sync.shutdown();
        sync.shutdown();
        drop(sync);
        assert_eq!(fake.unsubscribes.load(Ordering::SeqCst), 1);
    }
}

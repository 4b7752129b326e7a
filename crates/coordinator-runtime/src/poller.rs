//! Advances a high-water mark over the change table and fans out newly
//! discovered changes, so that a cluster of coordinators sharing one
//! database each discover the changes written by their peers.
//!
//! Grounded directly on the polling algorithm: the mark is memoised in
//! memory once loaded, first boot suppresses re-delivery of history by
//! snapping the mark to the current max change id, and the mark is only
//! persisted after the changes it covers have already been published.

use crate::bus::SubscriptionBus;
use crate::statestore::StateStore;
use coordinator_core::{Change, Error, ObjectId};
use coordinator_db::DbConnector;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Name the in-memory/durable high-water mark is stored under.
pub const LAST_PROCESSED_CHANGE_KEY: &str = "last_processed_change";

/// Polls the changes table for rows past the last one this coordinator has
/// published, publishing each on the changes bus in increasing `changeid`
/// order.
///
/// A single `ChangePoller` is shared (behind an `Arc`) between the timer
/// that arms it in multi-master mode and anything else that might want to
/// trigger an out-of-band poll; [`ChangePoller::poll_once`] is
/// re-entrancy-protected so overlapping invocations collapse into one.
pub struct ChangePoller {
    db: Arc<dyn DbConnector>,
    state: Arc<StateStore>,
    bus: SubscriptionBus<Change>,
    master_objectid: ObjectId,
    mark: Mutex<Option<i64>>,
    in_flight: AtomicBool,
}

impl ChangePoller {
    /// Construct a poller. `master_objectid` is the coordinator's own
    /// resolved object id (see [`StateStore::get_object_id`]), under which
    /// the mark is persisted.
    pub fn new(
        db: Arc<dyn DbConnector>,
        state: Arc<StateStore>,
        bus: SubscriptionBus<Change>,
        master_objectid: ObjectId,
    ) -> Self {
        ChangePoller {
            db,
            state,
            bus,
            master_objectid,
            mark: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    /// The in-memory mark, if it has been established (loaded from durable
    /// state or derived from the table's current maximum). Exposed for
    /// tests and status reporting; callers should not infer anything about
    /// whether a poll is currently in flight from this alone.
    pub fn current_mark(&self) -> Option<i64> {
        *self.mark.lock()
    }

    /// Run one polling pass. If an invocation is already in flight, this
    /// returns immediately without doing anything — the caller (typically a
    /// periodic timer) is expected to simply try again next tick.
    pub async fn poll_once(&self) -> Result<(), Error> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("change poll already in flight; skipping this tick");
            return Ok(());
        }
        let result = self.poll_once_inner().await;
        self.in_flight.store(false, Ordering::Release);
        result
    }

    async fn poll_once_inner(&self) -> Result<(), Error> {
        let mut dirty = false;

        if self.mark.lock().is_none() {
            let loaded = self
                .state
                .get_state_opt(self.master_objectid, LAST_PROCESSED_CHANGE_KEY)
                .await?
                .and_then(|v| v.as_i64());
            if let Some(loaded) = loaded {
                *self.mark.lock() = Some(loaded);
            } else {
                // First-ever poll: suppress catch-up over the whole history by
                // snapping straight to the table's current tip. If the table is
                // still empty this leaves the mark null, same as the source.
                if let Some(latest) = self.db.latest_changeid().await? {
                    *self.mark.lock() = Some(latest);
                    dirty = true;
                }
            }
        }

        let Some(mut mark) = *self.mark.lock() else {
            // Empty database; nothing to do yet and nothing to persist.
            return Ok(());
        };

        loop {
            let next = mark + 1;
            let Some(change) = self.db.get_change(next).await? else {
                break;
            };
            self.bus.deliver(&change);
            mark = next;
            dirty = true;
        }

        *self.mark.lock() = Some(mark);

        if dirty {
            self.state
                .set_state(self.master_objectid, LAST_PROCESSED_CHANGE_KEY, serde_json::json!(mark))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_db::memory::MemoryConnector;

    fn change(changeid: i64) -> Change {
        Change {
            changeid,
            who: "alice".into(),
            comments: "c".into(),
            branch: None,
            revision: None,
            category: None,
            properties: Default::default(),
            files: vec![],
            when: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn first_poll_on_empty_table_does_nothing() {
        let db = Arc::new(MemoryConnector::new());
        let state = Arc::new(StateStore::new(db.clone()));
        let id = state.get_object_id("master", "m1").await.unwrap();
        let bus = SubscriptionBus::new();
        let poller = ChangePoller::new(db, state, bus, id);
        poller.poll_once().await.unwrap();
        assert_eq!(poller.current_mark(), None);
    }

    #[tokio::test]
    async fn first_poll_suppresses_preexisting_history() {
        let db = Arc::new(MemoryConnector::new());
        db.seed_change(change(1));
        db.seed_change(change(2));
        let state = Arc::new(StateStore::new(db.clone()));
        let id = state.get_object_id("master", "m1").await.unwrap();
        let bus = SubscriptionBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        bus.subscribe(move |c: &Change| r.lock().push(c.changeid));
        let poller = ChangePoller::new(db, state, bus, id);
        poller.poll_once().await.unwrap();
        assert!(received.lock().is_empty());
        assert_eq!(poller.current_mark(), Some(2));
    }

    #[tokio::test]
    async fn subsequent_poll_delivers_new_changes_in_order() {
        let db = Arc::new(MemoryConnector::new());
        db.seed_change(change(7));
        let state = Arc::new(StateStore::new(db.clone()));
        let id = state.get_object_id("master", "m1").await.unwrap();
        state
            .set_state(id, LAST_PROCESSED_CHANGE_KEY, serde_json::json!(7))
            .await
            .unwrap();
        db.seed_change(change(8));
        db.seed_change(change(9));

        let bus = SubscriptionBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        bus.subscribe(move |c: &Change| r.lock().push(c.changeid));

        let poller = ChangePoller::new(db, state, bus, id);
        poller.poll_once().await.unwrap();

        assert_eq!(*received.lock(), vec![8, 9]);
        assert_eq!(poller.current_mark(), Some(9));
    }

    #[tokio::test]
    async fn mark_persists_across_a_fresh_poller_instance() {
        let db = Arc::new(MemoryConnector::new());
        db.seed_change(change(1));
        let state = Arc::new(StateStore::new(db.clone()));
        let id = state.get_object_id("master", "m1").await.unwrap();

        let bus = SubscriptionBus::new();
        ChangePoller::new(db.clone(), state.clone(), bus.clone(), id)
            .poll_once()
            .await
            .unwrap();

        db.seed_change(change(2));
        let poller2 = ChangePoller::new(db, state, bus.clone(), id);
        poller2.poll_once().await.unwrap();
        assert_eq!(poller2.current_mark(), Some(2));
    }
}

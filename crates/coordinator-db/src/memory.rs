//! An in-memory [`DbConnector`], used by tests across the workspace and as a
//! drop-in for exercising the reconciler/poller without a real sqlite file.

use crate::connector::DbConnector;
use async_trait::async_trait;
use coordinator_core::{Change, Error, NewBuildset, NewChange, ObjectId};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Default)]
struct Inner {
    changes: Vec<Change>,
    buildsets: Vec<NewBuildset>,
    objects: BTreeMap<(String, String), i64>,
    state: BTreeMap<(i64, String), serde_json::Value>,
    current: bool,
}

/// An in-memory [`DbConnector`]. `is_current()` defaults to `true`; use
/// [`MemoryConnector::set_current`] to simulate a stale schema.
#[derive(Default)]
pub struct MemoryConnector {
    inner: Mutex<Inner>,
}

impl MemoryConnector {
    /// A fresh, empty connector reporting a current schema.
    pub fn new() -> Self {
        MemoryConnector {
            inner: Mutex::new(Inner {
                current: true,
                ..Default::default()
            }),
        }
    }

    /// Simulate a schema that needs an upgrade.
    pub fn set_current(&self, current: bool) {
        self.inner.lock().current = current;
    }

    /// Insert a change directly, bypassing `insert_change`'s id assignment,
    /// for tests that need to seed the table with specific ids (e.g. S5).
    pub fn seed_change(&self, change: Change) {
        self.inner.lock().changes.push(change);
    }
}

#[async_trait]
impl DbConnector for MemoryConnector {
    async fn start(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn is_current(&self) -> Result<bool, Error> {
        Ok(self.inner.lock().current)
    }

    async fn insert_change(&self, change: NewChange) -> Result<Change, Error> {
        let mut inner = self.inner.lock();
        let changeid = inner.changes.last().map(|c| c.changeid + 1).unwrap_or(1);
        let stored = Change {
            changeid,
            who: change.who,
            comments: change.comments,
            branch: change.branch,
            revision: change.revision,
            category: change.category,
            properties: change.properties,
            files: change.files,
            when: change.when,
        };
        inner.changes.push(stored.clone());
        Ok(stored)
    }

    async fn get_change(&self, changeid: i64) -> Result<Option<Change>, Error> {
        Ok(self.inner.lock().changes.iter().find(|c| c.changeid == changeid).cloned())
    }

    async fn latest_changeid(&self) -> Result<Option<i64>, Error> {
        Ok(self.inner.lock().changes.last().map(|c| c.changeid))
    }

    async fn insert_buildset(&self, buildset: NewBuildset) -> Result<i64, Error> {
        let mut inner = self.inner.lock();
        let bsid = inner.buildsets.len() as i64 + 1;
        inner.buildsets.push(buildset);
        Ok(bsid)
    }

    async fn get_object_id(&self, class_tag: &str, qualified_name: &str) -> Result<ObjectId, Error> {
        let mut inner = self.inner.lock();
        let key = (class_tag.to_string(), qualified_name.to_string());
        if let Some(id) = inner.objects.get(&key) {
            return Ok(ObjectId(*id));
        }
        let id = inner.objects.len() as i64 + 1;
        inner.objects.insert(key, id);
        Ok(ObjectId(id))
    }

    async fn get_state(&self, objectid: ObjectId, name: &str) -> Result<Option<serde_json::Value>, Error> {
        Ok(self.inner.lock().state.get(&(objectid.0, name.to_string())).cloned())
    }

    async fn set_state(&self, objectid: ObjectId, name: &str, value: serde_json::Value) -> Result<(), Error> {
        self.inner.lock().state.insert((objectid.0, name.to_string()), value);
        Ok(())
    }
}

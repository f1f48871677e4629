/// In-memory document store with synchronous change delivery

use super::{
    Document, DocumentPath, DocumentStore, SnapshotListener, Version, WatcherSet, merge_values,
};
use crate::error::{Error, Result};
use crate::listeners::Subscription;
use crate::testing::yield_now;
use async_trait::async_trait;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RefCell<HashMap<DocumentPath, Document>>,
    last_version: Cell<u64>,
    watchers: WatcherSet,
    unsubscribes: Rc<Cell<u32>>,
    pub writes: Cell<u32>,
    /// Suspend once after every read so joined callers interleave
    pub yield_after_read: Cell<bool>,
    /// Hold back the initial snapshot on subscribe, as a polling store
    /// does until its first poll
    pub quiet_subscribe: Cell<bool>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite immediately, as a racing writer in another context would
    pub fn write_raw(&self, path: &DocumentPath, data: Value) -> Version {
        let version = Version(self.last_version.get() + 1);
        self.last_version.set(version.0);
        let document = Document { data, version };
        self.documents
            .borrow_mut()
            .insert(path.clone(), document.clone());
        self.writes.set(self.writes.get() + 1);

        self.watchers.deliver(path, Some(&document));
        version
    }

    pub fn read_raw(&self, path: &DocumentPath) -> Option<Document> {
        self.documents.borrow().get(path).cloned()
    }

    pub fn active_watchers(&self) -> usize {
        self.watchers.len()
    }

    pub fn unsubscribe_count(&self) -> u32 {
        self.unsubscribes.get()
    }
}

#[async_trait(?Send)]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        let document = self.read_raw(path);
        if self.yield_after_read.get() {
            yield_now().await;
        }
        Ok(document)
    }

    async fn merge(&self, path: &DocumentPath, fields: Value) -> Result<Version> {
        let mut data = self
            .read_raw(path)
            .map(|d| d.data)
            .unwrap_or_else(|| Value::Object(Default::default()));
        merge_values(&mut data, fields);
        Ok(self.write_raw(path, data))
    }

    async fn compare_and_set(
        &self,
        path: &DocumentPath,
        expected: Option<Version>,
        data: Value,
    ) -> Result<Version> {
        let current = self.read_raw(path).map(|d| d.version);
        if current != expected {
            return Err(Error::Conflict(path.to_string()));
        }
        Ok(self.write_raw(path, data))
    }

    fn subscribe(&self, path: &DocumentPath, listener: SnapshotListener) -> Subscription {
        let id = self.watchers.add(path, listener);

        let watchers = self.watchers.clone();
        let unsubscribes = self.unsubscribes.clone();
        let subscription = Subscription::new(move || {
            if watchers.remove(id) {
                unsubscribes.set(unsubscribes.get() + 1);
            }
        });

        if !self.quiet_subscribe.get() {
            let current = self.read_raw(path);
            self.watchers.deliver(path, current.as_ref());
        }
        subscription
    }
}

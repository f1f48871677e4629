/// Registry of document watchers shared by store implementations

use super::{Document, DocumentPath, SnapshotListener, Version};
use crate::listeners::Subscription;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

struct Watcher {
    path: DocumentPath,
    listener: SnapshotListener,
    /// Last delivered version; outer `None` until the first delivery
    seen: Option<Option<Version>>,
}

#[derive(Default)]
struct Watchers {
    next_id: u64,
    entries: BTreeMap<u64, Watcher>,
}

#[derive(Clone, Default)]
pub struct WatcherSet {
    inner: Rc<RefCell<Watchers>>,
}

impl WatcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, path: &DocumentPath, listener: SnapshotListener) -> u64 {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.insert(
            id,
            Watcher {
                path: path.clone(),
                listener,
                seen: None,
            },
        );
        id
    }

    pub fn remove(&self, id: u64) -> bool {
        self.inner.borrow_mut().entries.remove(&id).is_some()
    }

    /// Handle that removes watcher `id` when cancelled
    pub fn subscription(&self, id: u64) -> Subscription {
        let inner = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.borrow_mut().entries.remove(&id);
            }
        })
    }

    /// Distinct watched paths
    pub fn paths(&self) -> Vec<DocumentPath> {
        let mut paths: Vec<DocumentPath> = self
            .inner
            .borrow()
            .entries
            .values()
            .map(|w| w.path.clone())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand `document` to every watcher of `path` that has not seen this
    /// version yet. Listeners run with the registry unborrowed.
    pub fn deliver(&self, path: &DocumentPath, document: Option<&Document>) {
        let version = document.map(|d| d.version);
        let due: Vec<SnapshotListener> = {
            let mut inner = self.inner.borrow_mut();
            inner
                .entries
                .values_mut()
                .filter(|w| &w.path == path && w.seen != Some(version))
                .map(|w| {
                    w.seen = Some(version);
                    w.listener.clone()
                })
                .collect()
        };

        for listener in due {
            listener(document);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn counting_listener(count: &Rc<Cell<u32>>) -> SnapshotListener {
        let count = count.clone();
        Rc::new(move |_| count.set(count.get() + 1))
    }

    #[test]
    fn test_deliver_dedupes_versions() {
        let watchers = WatcherSet::new();
        let path = DocumentPath::user_document("u1", "theme").unwrap();
        let count = Rc::new(Cell::new(0));
        watchers.add(&path, counting_listener(&count));

        let doc = Document {
            data: json!({}),
            version: Version(1),
        };
        watchers.deliver(&path, Some(&doc));
        watchers.deliver(&path, Some(&doc));
        assert_eq!(count.get(), 1);

        watchers.deliver(&path, None);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_deliver_only_to_matching_path() {
        let watchers = WatcherSet::new();
        let theme = DocumentPath::user_document("u1", "theme").unwrap();
        let labels = DocumentPath::user_document("u1", "labels").unwrap();
        let count = Rc::new(Cell::new(0));
        watchers.add(&theme, counting_listener(&count));

        watchers.deliver(&labels, None);

        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_subscription_removes_watcher() {
        let watchers = WatcherSet::new();
        let path = DocumentPath::user_document("u1", "theme").unwrap();
        let id = watchers.add(&path, Rc::new(|_| {}));
        watchers.add(&path, Rc::new(|_| {}));

        watchers.subscription(id).unsubscribe();

        assert_eq!(watchers.len(), 1);
        assert_eq!(watchers.paths(), vec![path]);
    }
}

/// Live local copy of one per-user document

use crate::error::{Error, Result};
use crate::listeners::{ListenerSet, Subscription};
use crate::store::{Document, DocumentPath, DocumentStore, SnapshotListener, Version};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Attachment {
    uid: String,
    subscription: Subscription,
}

struct MirrorInner<T> {
    store: Rc<dyn DocumentStore>,
    document: &'static str,
    snapshot: RefCell<Option<T>>,
    version: Cell<Option<Version>>,
    attachment: RefCell<Option<Attachment>>,
    listeners: ListenerSet<Option<T>>,
}

impl<T: DeserializeOwned + Clone + 'static> MirrorInner<T> {
    fn apply(&self, document: Option<&Document>) {
        let next = match document {
            Some(document) => match serde_json::from_value::<T>(document.data.clone()) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Ignoring unreadable {} snapshot: {}", self.document, e);
                    return;
                }
            },
            None => None,
        };

        self.version.set(document.map(|d| d.version));
        *self.snapshot.borrow_mut() = next.clone();
        self.listeners.notify(&next);
    }
}

/// Subscribes to `users/{uid}/{document}` while a user is attached and
/// keeps the last decoded snapshot.
pub struct Mirror<T> {
    inner: Rc<MirrorInner<T>>,
}

impl<T: DeserializeOwned + Clone + 'static> Mirror<T> {
    pub fn new(store: Rc<dyn DocumentStore>, document: &'static str) -> Self {
        Mirror {
            inner: Rc::new(MirrorInner {
                store,
                document,
                snapshot: RefCell::new(None),
                version: Cell::new(None),
                attachment: RefCell::new(None),
                listeners: ListenerSet::new(),
            }),
        }
    }

    pub fn path_for(&self, uid: &str) -> Result<DocumentPath> {
        DocumentPath::user_document(uid, self.inner.document)
    }

    /// Start mirroring `uid`'s document. Re-attaching the same user is a no-op.
    pub fn attach(&self, uid: &str) -> Result<()> {
        if self.attached_uid().as_deref() == Some(uid) {
            return Ok(());
        }
        self.detach();

        let path = self.path_for(uid)?;
        let weak = Rc::downgrade(&self.inner);
        let listener: SnapshotListener = Rc::new(move |document| {
            if let Some(inner) = weak.upgrade() {
                inner.apply(document);
            }
        });

        let subscription = self.inner.store.subscribe(&path, listener);
        *self.inner.attachment.borrow_mut() = Some(Attachment {
            uid: uid.to_string(),
            subscription,
        });

        info!("Mirroring {}", path);
        Ok(())
    }

    /// Stop mirroring and drop the cached copy
    pub fn detach(&self) {
        let attachment = self.inner.attachment.borrow_mut().take();
        let Some(attachment) = attachment else {
            return;
        };

        attachment.subscription.unsubscribe();
        debug!("Stopped mirroring {} for {}", self.inner.document, attachment.uid);

        self.inner.version.set(None);
        let had_snapshot = self.inner.snapshot.borrow_mut().take().is_some();
        if had_snapshot {
            self.inner.listeners.notify(&None);
        }
    }

    pub fn attached_uid(&self) -> Option<String> {
        self.inner
            .attachment
            .borrow()
            .as_ref()
            .map(|a| a.uid.clone())
    }

    /// Path of the attached user's document, or `NotSignedIn`
    pub fn require_path(&self) -> Result<DocumentPath> {
        let uid = self.attached_uid().ok_or(Error::NotSignedIn)?;
        self.path_for(&uid)
    }

    pub fn snapshot(&self) -> Option<T> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn version(&self) -> Option<Version> {
        self.inner.version.get()
    }

    pub fn on_change(&self, listener: impl Fn(&Option<T>) + 'static) -> Subscription {
        self.inner.listeners.add(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryDocumentStore;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Settings {
        mode: String,
    }

    fn create_mirror() -> (Rc<MemoryDocumentStore>, Mirror<Settings>) {
        let store = Rc::new(MemoryDocumentStore::new());
        let mirror = Mirror::new(store.clone(), "settings");
        (store, mirror)
    }

    #[test]
    fn test_attach_delivers_existing_snapshot() {
        let (store, mirror) = create_mirror();
        let path = mirror.path_for("u1").unwrap();
        store.write_raw(&path, json!({"mode": "dark"}));

        mirror.attach("u1").unwrap();

        assert_eq!(
            mirror.snapshot(),
            Some(Settings {
                mode: "dark".to_string()
            })
        );
        assert_eq!(mirror.attached_uid(), Some("u1".to_string()));
    }

    #[test]
    fn test_changes_reach_listeners() {
        let (store, mirror) = create_mirror();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = mirror.on_change(move |s: &Option<Settings>| {
            sink.borrow_mut().push(s.clone().map(|s| s.mode))
        });

        mirror.attach("u1").unwrap();
        store.write_raw(&mirror.path_for("u1").unwrap(), json!({"mode": "light"}));

        assert_eq!(*seen.borrow(), vec![None, Some("light".to_string())]);
    }

    #[test]
    fn test_detach_unsubscribes_exactly_once() {
        let (store, mirror) = create_mirror();
        store.write_raw(&mirror.path_for("u1").unwrap(), json!({"mode": "dark"}));
        mirror.attach("u1").unwrap();
        assert_eq!(store.active_watchers(), 1);

        mirror.detach();
        mirror.detach();

        assert_eq!(store.unsubscribe_count(), 1);
        assert_eq!(store.active_watchers(), 0);
        assert_eq!(mirror.snapshot(), None);
        assert_eq!(mirror.attached_uid(), None);
    }

    #[test]
    fn test_reattach_same_user_keeps_subscription() {
        let (store, mirror) = create_mirror();

        mirror.attach("u1").unwrap();
        mirror.attach("u1").unwrap();

        assert_eq!(store.active_watchers(), 1);
        assert_eq!(store.unsubscribe_count(), 0);
    }

    #[test]
    fn test_switching_user_resubscribes() {
        let (store, mirror) = create_mirror();
        store.write_raw(&mirror.path_for("u2").unwrap(), json!({"mode": "light"}));

        mirror.attach("u1").unwrap();
        mirror.attach("u2").unwrap();

        assert_eq!(store.active_watchers(), 1);
        assert_eq!(store.unsubscribe_count(), 1);
        assert_eq!(mirror.snapshot().map(|s| s.mode), Some("light".to_string()));
    }

    #[test]
    fn test_unreadable_snapshot_keeps_previous() {
        let (store, mirror) = create_mirror();
        let path = mirror.path_for("u1").unwrap();
        store.write_raw(&path, json!({"mode": "dark"}));
        mirror.attach("u1").unwrap();
        let version = mirror.version();

        store.write_raw(&path, json!({"mode": 42}));

        assert_eq!(mirror.snapshot().map(|s| s.mode), Some("dark".to_string()));
        assert_eq!(mirror.version(), version);
    }

    #[test]
    fn test_require_path_when_detached() {
        let (_store, mirror) = create_mirror();

        assert_eq!(mirror.require_path(), Err(Error::NotSignedIn));
    }
}

/// Listener sets and subscription handles

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Handle to a live registration. Tearing it down runs the cancel hook
/// exactly once, whether through `unsubscribe` or by dropping the handle.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Subscription {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the registration alive for the rest of the context's life
    pub fn forget(mut self) {
        self.cancel.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

type Listener<T> = Rc<dyn Fn(&T)>;

struct Slots<T> {
    next_id: u64,
    listeners: BTreeMap<u64, Listener<T>>,
}

/// A set of callbacks notified in registration order
pub struct ListenerSet<T> {
    slots: Rc<RefCell<Slots<T>>>,
}

impl<T: 'static> ListenerSet<T> {
    pub fn new() -> Self {
        ListenerSet {
            slots: Rc::new(RefCell::new(Slots {
                next_id: 0,
                listeners: BTreeMap::new(),
            })),
        }
    }

    pub fn add(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = {
            let mut slots = self.slots.borrow_mut();
            let id = slots.next_id;
            slots.next_id += 1;
            slots.listeners.insert(id, Rc::new(listener));
            id
        };

        let slots = Rc::downgrade(&self.slots);
        Subscription::new(move || {
            if let Some(slots) = slots.upgrade() {
                slots.borrow_mut().listeners.remove(&id);
            }
        })
    }

    /// Call every listener. The set is not borrowed while callbacks run,
    /// so a listener may add or remove listeners.
    pub fn notify(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self.slots.borrow().listeners.values().cloned().collect();
        for listener in listeners {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        ListenerSet {
            slots: self.slots.clone(),
        }
    }
}

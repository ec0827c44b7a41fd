//! Single-threaded observer lists with explicit registration.
//!
//! A `Signal<T>` keeps an ordered list of listeners and invokes them in
//! registration order when `emit` is called. Dispatch runs over a snapshot of
//! the list, so listeners are free to connect or disconnect listeners
//! (including themselves) from inside a callback; a listener disconnected
//! mid-dispatch is not invoked for the remainder of that dispatch.

use std::cell::RefCell;
use std::rc::Rc;

/// Identifies a connected listener, used to disconnect it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

type Callback<T> = Rc<dyn Fn(&T)>;

struct Entry<T: 'static> {
    id: ListenerId,
    callback: Callback<T>,
    once: bool,
}

struct Inner<T: 'static> {
    listeners: Vec<Entry<T>>,
    seed: u32,
}

/// An observer list. Cloning a `Signal` yields another handle onto the same
/// listener list.
pub struct Signal<T: 'static> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Signal::new()
    }
}

impl<T: 'static> Signal<T> {
    pub fn new() -> Self {
        Signal {
            inner: Rc::new(RefCell::new(Inner {
                listeners: Vec::new(),
                seed: 0,
            })),
        }
    }

    /// Connects a listener, invoked on every `emit` until disconnected.
    pub fn connect<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&T) + 'static,
    {
        self.add(Rc::new(callback), false)
    }

    /// Connects a listener that is dropped right before its first invocation.
    pub fn connect_once<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&T) + 'static,
    {
        self.add(Rc::new(callback), true)
    }

    fn add(&self, callback: Callback<T>, once: bool) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        inner.seed += 1;
        let id = ListenerId(inner.seed);
        inner.listeners.push(Entry { id, callback, once });
        id
    }

    /// Disconnects a listener. Returns false if it was not connected.
    pub fn disconnect(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        match inner.listeners.iter().position(|v| v.id == id) {
            Some(index) => {
                inner.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns the number of connected listeners.
    pub fn len(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every connected listener in registration order.
    pub fn emit(&self, payload: &T) {
        let snapshot: Vec<(ListenerId, Callback<T>, bool)> = {
            let inner = self.inner.borrow();
            inner
                .listeners
                .iter()
                .map(|v| (v.id, v.callback.clone(), v.once))
                .collect()
        };

        for (id, callback, once) in snapshot {
            let connected = {
                let inner = self.inner.borrow();
                inner.listeners.iter().any(|v| v.id == id)
            };

            if !connected {
                continue;
            }

            if once {
                self.disconnect(id);
            }

            callback(payload);
        }
    }
}

//! Change notification
//!
//! A [`Notifier`] is the emitting side of one notify signal. Receivers
//! implement [`NotifyTarget`] and are held weakly, so a connection never keeps
//! its receiver alive. Emission snapshots the endpoint list first: receivers
//! may connect, disconnect or emit again while being notified.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

/// Receiver of notifications
pub trait NotifyTarget {
    /// Called when a connected notifier emits; `slot` is the value given to
    /// [`Notifier::connect`]
    fn notified(&self, slot: u32);
}

/// Handle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

struct Endpoint {
    id: ConnectionId,
    target: Weak<dyn NotifyTarget>,
    slot: u32,
}

/// The emitting side of one notify signal
#[derive(Default)]
pub struct Notifier {
    endpoints: RefCell<SmallVec<[Endpoint; 2]>>,
    next_id: Cell<u64>,
}

impl Notifier {
    /// Create an unconnected notifier
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Connect a receiver
    pub fn connect(&self, target: Weak<dyn NotifyTarget>, slot: u32) -> ConnectionId {
        let id = ConnectionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.endpoints.borrow_mut().push(Endpoint { id, target, slot });
        id
    }

    /// Remove a connection; returns false if it was already gone
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut endpoints = self.endpoints.borrow_mut();
        let before = endpoints.len();
        endpoints.retain(|e| e.id != id);
        endpoints.len() != before
    }

    /// Whether the connection is still live
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.endpoints.borrow().iter().any(|e| e.id == id)
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.endpoints.borrow().len()
    }

    /// Emit to every receiver connected at the time of the call
    pub fn notify(&self) {
        let snapshot: SmallVec<[(ConnectionId, Weak<dyn NotifyTarget>, u32); 4]> = self
            .endpoints
            .borrow()
            .iter()
            .map(|e| (e.id, Weak::clone(&e.target), e.slot))
            .collect();

        for (id, target, slot) in snapshot {
            // An earlier receiver may have disconnected this one.
            if !self.is_connected(id) {
                continue;
            }
            match target.upgrade() {
                Some(target) => target.notified(slot),
                None => {
                    self.disconnect(id);
                }
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("connections", &self.connection_count())
            .finish()
    }
}

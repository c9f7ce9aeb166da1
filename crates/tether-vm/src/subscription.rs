//! Subscription slots
//!
//! A manager owns one [`Subscription`] per distinct dependency in its
//! program. Each slot holds at most one connection; subscribing to a
//! different notifier drops the old connection first. When a connected
//! notifier emits, the manager receives the slot index and re-runs every
//! binding the signal table lists for it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tether_bytecode::SignalTable;
use tether_object::{ConnectionId, Notifier, NotifyTarget};

/// One dependency endpoint
#[derive(Default)]
pub struct Subscription {
    connection: Option<(Rc<Notifier>, ConnectionId)>,
    refs: u32,
}

impl Subscription {
    /// Whether a notifier is connected
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|(notifier, id)| notifier.is_connected(*id))
    }

    fn is_connected_to(&self, notifier: &Rc<Notifier>) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|(current, id)| Rc::ptr_eq(current, notifier) && current.is_connected(*id))
    }

    fn disconnect(&mut self) -> bool {
        match self.connection.take() {
            Some((notifier, id)) => notifier.disconnect(id),
            None => false,
        }
    }
}

/// The subscription array of one manager
pub struct Subscriptions {
    slots: RefCell<Vec<Subscription>>,
    target: Weak<dyn NotifyTarget>,
    disconnected: Cell<bool>,
}

impl Subscriptions {
    /// One slot per subscription in `signals`, each counting the bindings
    /// that list it
    pub fn new(signals: &SignalTable, target: Weak<dyn NotifyTarget>) -> Self {
        let slots = (0..signals.subscription_count())
            .map(|sub| Subscription {
                connection: None,
                refs: signals.bindings(sub as u16).len() as u32,
            })
            .collect();
        Self {
            slots: RefCell::new(slots),
            target,
            disconnected: Cell::new(false),
        }
    }

    /// Connect slot `index` to `notifier`, or disconnect it when `None`
    pub fn subscribe(&self, index: u16, notifier: Option<Rc<Notifier>>) {
        let mut slots = self.slots.borrow_mut();
        let Some(slot) = slots.get_mut(index as usize) else {
            debug_assert!(false, "subscription {index} out of range");
            return;
        };
        match notifier {
            Some(notifier) => {
                if slot.is_connected_to(&notifier) {
                    return;
                }
                slot.disconnect();
                let id = notifier.connect(Weak::clone(&self.target), u32::from(index));
                slot.connection = Some((notifier, id));
                self.disconnected.set(false);
                tracing::debug!(target: "tether::vm", subscription = index, "connected");
            }
            None => {
                if slot.disconnect() {
                    tracing::debug!(target: "tether::vm", subscription = index, "disconnected");
                }
            }
        }
    }

    /// Disconnect every slot. Repeated calls without an intervening
    /// connection do nothing.
    pub fn disconnect_all(&self) {
        if self.disconnected.replace(true) {
            return;
        }
        let mut count = 0usize;
        for slot in self.slots.borrow_mut().iter_mut() {
            if slot.is_connected() {
                slot.disconnect();
                count += 1;
            }
        }
        tracing::debug!(target: "tether::vm", count, "disconnected all subscriptions");
    }

    /// Drop one binding's share of slot `index`, disconnecting it when no
    /// binding uses it any more
    pub fn release(&self, index: u16) {
        let mut slots = self.slots.borrow_mut();
        let Some(slot) = slots.get_mut(index as usize) else {
            return;
        };
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0 && slot.disconnect() {
            tracing::debug!(target: "tether::vm", subscription = index, "released");
        }
    }

    /// Take back one binding's share of slot `index` after a release
    pub fn retain(&self, index: u16) {
        if let Some(slot) = self.slots.borrow_mut().get_mut(index as usize) {
            slot.refs += 1;
        }
    }

    /// Whether slot `index` is connected
    pub fn is_connected(&self, index: u16) -> bool {
        self.slots
            .borrow()
            .get(index as usize)
            .is_some_and(Subscription::is_connected)
    }

    /// Bindings still sharing slot `index`
    pub fn refs(&self, index: u16) -> u32 {
        self.slots
            .borrow()
            .get(index as usize)
            .map_or(0, |slot| slot.refs)
    }

    /// Number of connected slots
    pub fn connected_count(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| slot.is_connected())
            .count()
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Whether the program has no subscriptions
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sink(RefCell<Vec<u32>>);

    impl NotifyTarget for Sink {
        fn notified(&self, slot: u32) {
            self.0.borrow_mut().push(slot);
        }
    }

    fn setup() -> (Rc<Sink>, Subscriptions) {
        let sink = Rc::new(Sink(RefCell::default()));
        let weak: Weak<dyn NotifyTarget> = Rc::downgrade(&sink) as Weak<dyn NotifyTarget>;
        // B0 -> {S0}, B1 -> {S0, S1}
        let table = SignalTable::build(2, &[vec![0u16], vec![0, 1]]);
        (sink, Subscriptions::new(&table, weak))
    }

    #[test]
    fn test_resubscribe_replaces_connection() {
        let (sink, subs) = setup();
        let a = Notifier::new();
        let b = Notifier::new();

        subs.subscribe(0, Some(Rc::clone(&a)));
        subs.subscribe(0, Some(Rc::clone(&a)));
        assert_eq!(a.connection_count(), 1);

        subs.subscribe(0, Some(Rc::clone(&b)));
        assert_eq!(a.connection_count(), 0);
        assert_eq!(b.connection_count(), 1);

        a.notify();
        b.notify();
        assert_eq!(*sink.0.borrow(), vec![0]);

        subs.subscribe(0, None);
        assert!(!subs.is_connected(0));
    }

    #[test]
    fn test_disconnect_all_is_idempotent() {
        let (_sink, subs) = setup();
        let n = Notifier::new();
        subs.subscribe(0, Some(Rc::clone(&n)));
        subs.subscribe(1, Some(Rc::clone(&n)));
        assert_eq!(subs.connected_count(), 2);

        subs.disconnect_all();
        subs.disconnect_all();
        assert_eq!(subs.connected_count(), 0);
        assert_eq!(n.connection_count(), 0);

        subs.subscribe(1, Some(Rc::clone(&n)));
        subs.disconnect_all();
        assert_eq!(n.connection_count(), 0);
    }

    #[test]
    fn test_release_counts_sharing_bindings() {
        let (_sink, subs) = setup();
        let n = Notifier::new();
        subs.subscribe(0, Some(Rc::clone(&n)));
        assert_eq!(subs.refs(0), 2);

        subs.release(0);
        assert!(subs.is_connected(0));
        subs.release(0);
        assert!(!subs.is_connected(0));
        assert_eq!(subs.refs(0), 0);
    }
}

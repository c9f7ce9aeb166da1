//! Mutable state a manager keeps beside its shared program

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tether_bytecode::Program;
use tether_object::NotifyTarget;

use crate::subscription::Subscriptions;

/// Identifier table filled lazily by `InitString`
#[derive(Debug, Default)]
pub struct Identifiers(RefCell<Vec<Option<Rc<str>>>>);

impl Identifiers {
    /// Table with `count` empty slots
    pub fn new(count: usize) -> Self {
        Self(RefCell::new(vec![None; count]))
    }

    /// Intern `text` into slot `index` unless it is already set
    pub fn init(&self, index: u16, text: impl FnOnce() -> Rc<str>) {
        let mut slots = self.0.borrow_mut();
        if let Some(slot) = slots.get_mut(index as usize) {
            if slot.is_none() {
                *slot = Some(text());
            }
        }
    }

    /// Interned text of slot `index`
    pub fn get(&self, index: u16) -> Option<Rc<str>> {
        self.0.borrow().get(index as usize).cloned().flatten()
    }
}

/// Per-manager runtime state for one program
pub struct ProgramState {
    /// Subscription slots
    pub subscriptions: Subscriptions,
    /// Interned identifiers
    pub identifiers: Identifiers,
}

impl ProgramState {
    /// Fresh state sized for `program`, delivering notifications to `target`
    pub fn new(program: &Program, target: Weak<dyn NotifyTarget>) -> Self {
        Self {
            subscriptions: Subscriptions::new(program.signals(), target),
            identifiers: Identifiers::new(program.identifier_count() as usize),
        }
    }
}

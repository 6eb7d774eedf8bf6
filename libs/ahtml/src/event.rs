//! Event listener bookkeeping for a `Dom`. Listeners are plain data
//! (`L`), the owner decides what dispatching one means.

use kstring::KString;

use crate::dom::{Dom, NodeId};

/// Handle for one registered listener, needed to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Debug)]
struct Entry<L> {
    subscription: Subscription,
    node: NodeId,
    event: KString,
    listener: L,
}

#[derive(Debug)]
pub struct EventRegistry<L> {
    next: u64,
    entries: Vec<Entry<L>>,
}

impl<L> Default for EventRegistry<L> {
    fn default() -> Self {
        Self { next: 0, entries: Vec::new() }
    }
}

impl<L: Clone> EventRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, node: NodeId, event: &str, listener: L) -> Subscription {
        let subscription = Subscription(self.next);
        self.next += 1;
        self.entries.push(Entry {
            subscription,
            node,
            event: KString::from_ref(event),
            listener
        });
        subscription
    }

    /// Returns false if it was already cancelled.
    pub fn cancel(&mut self, subscription: Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.subscription != subscription);
        self.entries.len() != before
    }

    pub fn is_active(&self, subscription: Subscription) -> bool {
        self.entries.iter().any(|e| e.subscription == subscription)
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    /// The listeners an `event` fired at `target` reaches: those on
    /// `target` first, then those on each ancestor (bubbling). Within
    /// one node, in registration order.
    pub fn listeners_for_dispatch(
        &self,
        dom: &Dom,
        target: NodeId,
        event: &str
    ) -> Vec<(Subscription, L)> {
        let mut out = Vec::new();
        let mut current = Some(target);
        while let Some(node) = current {
            for e in &self.entries {
                if e.node == node && e.event == event {
                    out.push((e.subscription, e.listener.clone()));
                }
            }
            current = dom.parent(node);
        }
        out
    }
}

//! Change notification for the index's observable fields.

use std::fmt;

/// What changed at the end of a mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEvent {
    /// Number of filled positions
    ItemCountChanged(usize),
    /// Address marked as current
    CurrentAddressChanged(u64),
    /// The caches were discarded and a new epoch anchored at `anchor` began
    EpochReset { epoch: u64, anchor: u64 },
}

pub type Observer = Box<dyn Fn(&IndexEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registered observers, called synchronously in subscription order.
#[derive(Default)]
pub struct Observers {
    next_id: u64,
    list: Vec<(SubscriptionId, Observer)>,
}

impl Observers {
    pub fn subscribe(&mut self, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.list.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.list.len();
        self.list.retain(|(i, _)| *i != id);
        self.list.len() != before
    }

    pub fn notify(&self, event: &IndexEvent) {
        for (_, observer) in &self.list {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.list.len())
            .finish()
    }
}

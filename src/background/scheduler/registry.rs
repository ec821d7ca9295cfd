use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::job::JobIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Pending,
    Running,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    ticket: u64,
    state: SlotState,
}

/// Claims on job identities. A slot is owned by the ticket that reserved it;
/// stale tickets (cancelled or superseded) never touch a newer slot.
#[derive(Debug, Default)]
pub struct JobRegistry {
    slots: DashMap<JobIdentity, Slot>,
    idle_lock: Mutex<()>,
    emptied: Condvar,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `identity` for `ticket`. False when another job already holds it.
    pub fn reserve(&self, identity: &JobIdentity, ticket: u64) -> bool {
        match self.slots.entry(identity.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    ticket,
                    state: SlotState::Pending,
                });
                true
            }
        }
    }

    /// Marks a pending slot as running. False when the ticket no longer owns it.
    pub fn start(&self, identity: &JobIdentity, ticket: u64) -> bool {
        match self.slots.get_mut(identity) {
            Some(mut slot) if slot.ticket == ticket && slot.state == SlotState::Pending => {
                slot.state = SlotState::Running;
                true
            }
            _ => false,
        }
    }

    /// Passes a running slot to the next job of a chain without freeing it.
    pub fn hand_over(&self, identity: &JobIdentity, from: u64, to: u64) -> bool {
        match self.slots.get_mut(identity) {
            Some(mut slot) if slot.ticket == from => {
                slot.ticket = to;
                slot.state = SlotState::Pending;
                true
            }
            _ => false,
        }
    }

    pub fn release(&self, identity: &JobIdentity, ticket: u64) {
        if self
            .slots
            .remove_if(identity, |_, slot| slot.ticket == ticket)
            .is_some()
        {
            self.notify_if_empty();
        }
    }

    /// Drops a pending job. Running jobs are left alone.
    pub fn cancel(&self, identity: &JobIdentity) -> Option<u64> {
        let cancelled = self
            .slots
            .remove_if(identity, |_, slot| slot.state == SlotState::Pending)
            .map(|(_, slot)| slot.ticket);
        if cancelled.is_some() {
            self.notify_if_empty();
        }
        cancelled
    }

    pub fn cancel_all_pending(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.state == SlotState::Running);
        self.notify_if_empty();
        before.saturating_sub(self.slots.len())
    }

    /// Blocks until no slot is held. False when `timeout` passes first.
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.idle_lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.slots.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .emptied
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    // Waiters check emptiness under `idle_lock`, so taking it here means
    // none of them can miss the wake-up.
    fn notify_if_empty(&self) {
        if self.slots.is_empty() {
            let _guard = self.idle_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.emptied.notify_all();
        }
    }

    pub fn state(&self, identity: &JobIdentity) -> Option<SlotState> {
        self.slots.get(identity).map(|slot| slot.state)
    }

    pub fn snapshot(&self) -> Vec<(JobIdentity, SlotState)> {
        self.slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity_id;

    fn image(id: &str) -> JobIdentity {
        JobIdentity::Image(entity_id(id).unwrap())
    }

    #[test]
    fn second_reservation_is_refused_until_release() {
        let registry = JobRegistry::new();
        assert!(registry.reserve(&image("a"), 1));
        assert!(!registry.reserve(&image("a"), 2));
        assert!(registry.reserve(&image("b"), 3));

        assert!(registry.start(&image("a"), 1));
        assert!(!registry.reserve(&image("a"), 4));
        registry.release(&image("a"), 1);
        assert!(registry.reserve(&image("a"), 5));
    }

    #[test]
    fn cancel_only_removes_pending() {
        let registry = JobRegistry::new();
        registry.reserve(&image("a"), 1);
        registry.reserve(&image("b"), 2);
        registry.start(&image("b"), 2);

        assert_eq!(registry.cancel(&image("a")), Some(1));
        assert_eq!(registry.cancel(&image("b")), None);
        assert_eq!(registry.state(&image("b")), Some(SlotState::Running));
        assert!(!registry.start(&image("a"), 1));
    }

    #[test]
    fn stale_ticket_cannot_release_newer_slot() {
        let registry = JobRegistry::new();
        registry.reserve(&image("a"), 1);
        registry.cancel(&image("a"));
        registry.reserve(&image("a"), 2);

        registry.release(&image("a"), 1);
        assert_eq!(registry.state(&image("a")), Some(SlotState::Pending));
    }

    #[test]
    fn hand_over_keeps_the_slot_claimed() {
        let registry = JobRegistry::new();
        registry.reserve(&image("a"), 1);
        registry.start(&image("a"), 1);

        assert!(registry.hand_over(&image("a"), 1, 2));
        assert!(!registry.reserve(&image("a"), 3));
        assert!(registry.start(&image("a"), 2));
    }

    #[test]
    fn waiter_wakes_when_the_last_slot_is_released() {
        let registry = std::sync::Arc::new(JobRegistry::new());
        registry.reserve(&image("a"), 1);
        registry.start(&image("a"), 1);
        assert!(!registry.wait_empty(Duration::from_millis(10)));

        let releaser = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                registry.release(&image("a"), 1);
            })
        };
        assert!(registry.wait_empty(Duration::from_secs(10)));
        releaser.join().unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_all_pending_keeps_running() {
        let registry = JobRegistry::new();
        for (n, id) in ["a", "b", "c"].iter().enumerate() {
            registry.reserve(&image(id), n as u64);
        }
        registry.start(&image("c"), 2);
        assert_eq!(registry.cancel_all_pending(), 2);
        assert_eq!(registry.len(), 1);
    }
}

//! One-slot schedule: a worker hosts a single job, so the "queue" holds at
//! most one armed timestamp.

use std::sync::Mutex;

use tracing::{debug, warn};

#[derive(Default)]
struct Slot {
    next: i64,
    armed: bool,
}

#[derive(Default)]
pub struct Schedule {
    slot: Mutex<Slot>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot at `at` (Unix seconds), replacing any prior entry.
    pub fn add_job(&self, at: i64) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.armed {
            warn!("job already scheduled, removing the existing entry");
        }
        slot.next = at;
        slot.armed = true;
        debug!("scheduled next run @{at}");
    }

    /// Next armed timestamp, or 0 when the slot is empty.
    pub fn next_scheduled(&self) -> i64 {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.armed {
            slot.next
        } else {
            0
        }
    }

    /// Disarm and return true when the armed time has passed.
    pub fn pop(&self, now: i64) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.armed && slot.next <= now {
            slot.armed = false;
            debug!("popped scheduled run @{}", slot.next);
            return true;
        }
        false
    }

    /// Disarm the slot.
    pub fn remove(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_fires_only_when_due() {
        let q = Schedule::new();
        q.add_job(100);
        assert!(!q.pop(99));
        assert!(q.pop(100));
    }

    #[test]
    fn pop_disarms_the_slot() {
        let q = Schedule::new();
        q.add_job(100);
        assert!(q.pop(200));
        // disarmed until re-added
        assert!(!q.pop(300));
        assert_eq!(q.next_scheduled(), 0);

        q.add_job(400);
        assert!(q.pop(400));
    }

    #[test]
    fn add_replaces_existing_entry() {
        let q = Schedule::new();
        q.add_job(100);
        q.add_job(500);
        assert_eq!(q.next_scheduled(), 500);
        assert!(!q.pop(200));
        assert!(q.pop(500));
    }

    #[test]
    fn remove_disarms() {
        let q = Schedule::new();
        q.add_job(100);
        q.remove();
        assert!(!q.pop(1000));
        assert_eq!(q.next_scheduled(), 0);
    }
}

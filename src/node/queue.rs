//! Bounded admission queue
//!
//! Caps how many blob transfers run against local storage at once, with a
//! bounded FIFO of waiters behind the cap. The queue schedules opaque
//! payloads and never performs I/O itself: an admitted payload is handed
//! back to the caller to run, and the client's slot stays held until the
//! client goes away, so backpressure tracks real inflight transfers.

use std::collections::VecDeque;

/// Per-request client handle identity
pub type ClientId = u64;

/// Outcome of an admission attempt
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<A> {
    /// Below the running cap: the caller must run the payload now
    Start(A),
    /// Cap reached, wait queue had room
    Wait,
    /// Running set and wait queue both full; payload handed back untouched
    Full(A),
}

#[derive(Debug)]
pub struct WorkQueue<A> {
    capacity: usize,
    max_waiting: usize,
    running: Vec<ClientId>,
    waiting: VecDeque<(ClientId, A)>,
}

impl<A> WorkQueue<A> {
    pub fn new(capacity: usize, max_waiting: usize) -> Self {
        Self {
            capacity,
            max_waiting,
            running: Vec::with_capacity(capacity),
            waiting: VecDeque::new(),
        }
    }

    /// Admit, queue, or refuse a request.
    ///
    /// On `Start` the client is recorded as running and the caller executes
    /// the payload; on `Full` no state changes.
    pub fn add(&mut self, client: ClientId, payload: A) -> Admission<A> {
        if self.running.len() < self.capacity {
            self.running.push(client);
            Admission::Start(payload)
        } else if self.waiting.len() < self.max_waiting {
            self.waiting.push_back((client, payload));
            Admission::Wait
        } else {
            Admission::Full(payload)
        }
    }

    /// Remove a client from the queue.
    ///
    /// A waiting client is dropped with its payload; no slot frees. A
    /// running client frees its slot, and each freed slot promotes the head
    /// waiter, returned as `(client, payload)` for the caller to run.
    /// Removing an unknown client is a no-op.
    pub fn remove(&mut self, client: ClientId) -> Vec<(ClientId, A)> {
        self.waiting.retain(|(c, _)| *c != client);

        let before = self.running.len();
        self.running.retain(|c| *c != client);
        let freed = before - self.running.len();

        let mut promoted = Vec::new();
        for _ in 0..freed {
            match self.waiting.pop_front() {
                Some((next, payload)) => {
                    self.running.push(next);
                    promoted.push((next, payload));
                }
                None => break,
            }
        }
        promoted
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_until_full() {
        let mut q: WorkQueue<&str> = WorkQueue::new(1, 1);

        assert!(matches!(q.add(1, "a"), Admission::Start("a")));
        assert!(matches!(q.add(2, "b"), Admission::Wait));
        assert!(matches!(q.add(3, "c"), Admission::Full("c")));

        assert_eq!(q.running(), 1);
        assert_eq!(q.waiting(), 1);
    }

    #[test]
    fn test_remove_running_promotes_one_waiter() {
        let mut q: WorkQueue<&str> = WorkQueue::new(1, 2);
        q.add(1, "a");
        q.add(2, "b");
        q.add(3, "c");

        let promoted = q.remove(1);
        assert_eq!(promoted, vec![(2, "b")]);
        assert_eq!(q.running(), 1);
        assert_eq!(q.waiting(), 1);
    }

    #[test]
    fn test_remove_waiting_frees_no_slot() {
        let mut q: WorkQueue<&str> = WorkQueue::new(1, 2);
        q.add(1, "a");
        q.add(2, "b");

        let promoted = q.remove(2);
        assert!(promoted.is_empty());
        assert_eq!(q.running(), 1);
        assert_eq!(q.waiting(), 0);

        // the freed waiting room admits a new waiter
        assert!(matches!(q.add(3, "c"), Admission::Wait));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut q: WorkQueue<&str> = WorkQueue::new(1, 1);
        q.add(1, "a");

        assert!(q.remove(42).is_empty());
        assert_eq!(q.running(), 1);
    }

    #[test]
    fn test_waiters_promote_in_fifo_order() {
        let mut q: WorkQueue<&str> = WorkQueue::new(2, 3);
        q.add(1, "a");
        q.add(2, "b");
        q.add(3, "c");
        q.add(4, "d");

        assert_eq!(q.remove(1), vec![(3, "c")]);
        assert_eq!(q.remove(2), vec![(4, "d")]);
        assert_eq!(q.remove(3), vec![]);
        assert_eq!(q.running(), 1);
    }

    #[test]
    fn test_bounds_hold_under_churn() {
        let mut q: WorkQueue<u32> = WorkQueue::new(3, 2);
        let mut next: ClientId = 0;

        for round in 0..50u32 {
            next += 1;
            q.add(next, round);
            if round % 3 == 0 {
                q.remove(next.saturating_sub(2));
            }
            assert!(q.running() <= 3);
            assert!(q.waiting() <= 2);
        }
    }
}

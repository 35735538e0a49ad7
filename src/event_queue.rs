//! Bounded FIFO of target events shared between backend producer threads and
//! the single dispatch-thread consumer (spec.md §4.4, §5).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::model::DebugEvent;

const DEFAULT_CAPACITY: usize = 10_000;

/// A bounded, lock-guarded FIFO.
///
/// When full, `push` blocks until space is available rather than dropping
/// the event: a dropped event would desynchronise the front end's model of
/// the target, which is worse than a producer stalling (spec.md §4.4).
pub struct EventQueue {
    capacity: usize,
    state: Mutex<VecDeque<DebugEvent>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        EventQueue {
            capacity,
            state: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Blocks until there is room, then enqueues `event`.
    pub fn push(&self, event: DebugEvent) {
        let mut queue = self.state.lock().unwrap();
        while queue.len() >= self.capacity {
            queue = self.not_full.wait(queue).unwrap();
        }
        queue.push_back(event);
        self.not_empty.notify_one();
    }

    /// Removes and returns the oldest event, or `None` if the queue is
    /// currently empty (non-blocking; the dispatch loop alternates this
    /// with polling the transport so it never starves either side).
    pub fn try_pop(&self) -> Option<DebugEvent> {
        let mut queue = self.state.lock().unwrap();
        let event = queue.pop_front();
        if event.is_some() {
            self.not_full.notify_one();
        }
        event
    }

    /// Drains every event currently queued, in FIFO order.
    pub fn drain_all(&self) -> Vec<DebugEvent> {
        let mut queue = self.state.lock().unwrap();
        let drained: Vec<_> = queue.drain(..).collect();
        if !drained.is_empty() {
            self.not_full.notify_all();
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DebugEvent;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn event(tid: u32) -> DebugEvent {
        DebugEvent::ThreadCreated { tid }
    }

    #[test]
    fn push_then_pop_preserves_order() {
        let q = EventQueue::new();
        q.push(event(1));
        q.push(event(2));
        q.push(event(3));
        let drained = q.drain_all();
        let tids: Vec<_> = drained
            .into_iter()
            .map(|e| match e {
                DebugEvent::ThreadCreated { tid } => tid,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(tids, vec![1, 2, 3]);
    }

    #[test]
    fn try_pop_on_empty_queue_returns_none() {
        let q = EventQueue::new();
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn full_queue_unblocks_after_a_pop() {
        let q = Arc::new(EventQueue::with_capacity(1));
        q.push(event(1));

        let q2 = Arc::clone(&q);
        let pusher = thread::spawn(move || {
            q2.push(event(2));
        });

        // Give the pusher a chance to block on the full queue.
        thread::sleep(Duration::from_millis(50));
        let first = q.try_pop();
        assert!(matches!(first, Some(DebugEvent::ThreadCreated { tid: 1 })));
        pusher.join().unwrap();
        assert_eq!(q.len(), 1);
    }
}

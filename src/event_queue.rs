//! Bounded event queue connecting the host thread to the program thread.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crossterm::event::KeyEvent;

use crate::constants::{EVENT_PUSH_TIMEOUT, EVENT_QUEUE_MAX_LENGTH};
use crate::window::WindowId;

/// An event as seen by the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// The window the event belongs to; `None` for windowless events such
    /// as timer ticks and whole-tree rearrangements.
    pub win: Option<WindowId>,
    pub val1: u32,
    pub val2: u32,
}

impl Event {
    pub(crate) fn new(kind: EventKind, win: Option<WindowId>, val1: u32, val2: u32) -> Self {
        Self {
            kind,
            win,
            val1,
            val2,
        }
    }
}

/// The public event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A character request completed; `val1` is the key code.
    CharInput,
    /// A line request completed; `val1` is the number of characters read.
    LineInput,
    /// Mouse press in a requesting window; `val1`/`val2` are x/y.
    MouseInput,
    Timer,
    /// Window sizes changed under the host; `win` names the smallest
    /// affected subtree, `None` meaning the whole tree.
    Arrange,
    Redraw,
    SoundNotify,
    /// Hyperlink selected in a requesting window; `val1` is the link value.
    Hyperlink,
}

impl EventKind {
    /// Kinds that `select_poll` may deliver.
    pub(crate) fn pollable(self) -> bool {
        matches!(
            self,
            EventKind::Timer | EventKind::Arrange | EventKind::Redraw | EventKind::SoundNotify
        )
    }
}

/// What actually travels through the queue. The non-`Event` items are
/// internal wake-ups and never reach a program.
#[derive(Debug, Clone)]
pub(crate) enum QueueItem {
    Event(Event),
    /// Wakes a blocked program thread so it can observe cancellation.
    Abort,
    /// Host-fed key waiting for a window with a character request.
    ForcedChar(KeyEvent),
    /// Host-fed line waiting for a window with a line request.
    ForcedLine(String),
}

pub(crate) struct EventQueue {
    items: Mutex<VecDeque<QueueItem>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    push_timeout: Duration,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::with_limits(EVENT_QUEUE_MAX_LENGTH, EVENT_PUSH_TIMEOUT)
    }

    /// Queue with custom limits. Tests use this to exercise the overflow
    /// path without sitting out the real push timeout.
    pub(crate) fn with_limits(capacity: usize, push_timeout: Duration) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            push_timeout,
        }
    }

    /// Appends an item, waiting for room while the queue is full. An item
    /// that still has no room when the push timeout expires is dropped.
    pub(crate) fn push(&self, item: QueueItem) {
        let guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let (mut guard, timeout) = self
            .not_full
            .wait_timeout_while(guard, self.push_timeout, |items| {
                items.len() >= self.capacity
            })
            .unwrap_or_else(|e| e.into_inner());
        if timeout.timed_out() && guard.len() >= self.capacity {
            tracing::warn!(?item, "event queue stayed full; dropping");
            return;
        }
        guard.push_back(item);
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Puts a deferred item back at the consumer end so it is retried
    /// before anything queued after it. Not subject to the capacity limit.
    pub(crate) fn push_front(&self, item: QueueItem) {
        let mut guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        guard.push_front(item);
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Oldest item, blocking while the queue is empty.
    pub(crate) fn pop_blocking(&self) -> QueueItem {
        let mut guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(item) = guard.pop_front() {
                drop(guard);
                self.not_full.notify_one();
                return item;
            }
            guard = self
                .not_empty
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Removes and returns the oldest pollable event, leaving everything
    /// else queued in order. Never blocks.
    pub(crate) fn poll(&self) -> Option<Event> {
        let mut guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let pos = guard
            .iter()
            .position(|item| matches!(item, QueueItem::Event(ev) if ev.kind.pollable()))?;
        if let Some(QueueItem::Event(ev)) = guard.remove(pos) {
            drop(guard);
            self.not_full.notify_one();
            return Some(ev);
        }
        None
    }

    /// Whether a host-fed key press is still waiting for delivery.
    pub(crate) fn has_forced_char(&self) -> bool {
        let guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .any(|item| matches!(item, QueueItem::ForcedChar(_)))
    }

    /// Whether a host-fed line is still waiting for delivery.
    pub(crate) fn has_forced_line(&self) -> bool {
        let guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .any(|item| matches!(item, QueueItem::ForcedLine(_)))
    }

    /// Discards everything queued. Used at session teardown.
    pub(crate) fn clear(&self) {
        let mut guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        guard.clear();
        drop(guard);
        self.not_full.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        let guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        guard.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn event(kind: EventKind, val1: u32) -> QueueItem {
        QueueItem::Event(Event::new(kind, None, val1, 0))
    }

    fn popped_val(queue: &EventQueue) -> Option<u32> {
        match queue.pop_blocking() {
            QueueItem::Event(ev) => Some(ev.val1),
            _ => None,
        }
    }

    #[test]
    fn delivers_oldest_first() {
        let queue = EventQueue::new();
        queue.push(event(EventKind::Timer, 1));
        queue.push(event(EventKind::Timer, 2));
        queue.push(event(EventKind::Timer, 3));

        assert_eq!(popped_val(&queue), Some(1));
        assert_eq!(popped_val(&queue), Some(2));
        assert_eq!(popped_val(&queue), Some(3));
    }

    #[test]
    fn full_queue_drops_after_the_push_timeout() {
        let queue = EventQueue::with_limits(2, Duration::from_millis(10));
        queue.push(event(EventKind::Timer, 1));
        queue.push(event(EventKind::Timer, 2));
        queue.push(event(EventKind::Timer, 3));

        assert_eq!(queue.len(), 2);
        assert_eq!(popped_val(&queue), Some(1));
        assert_eq!(popped_val(&queue), Some(2));
    }

    #[test]
    fn push_waits_for_a_consumer_to_make_room() {
        let queue = Arc::new(EventQueue::with_limits(1, Duration::from_secs(5)));
        queue.push(event(EventKind::Timer, 1));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.pop_blocking()
            })
        };
        // Blocks until the consumer pops, well inside the timeout.
        queue.push(event(EventKind::Timer, 2));
        consumer.join().unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(popped_val(&queue), Some(2));
    }

    #[test]
    fn pop_blocks_until_something_arrives() {
        let queue = Arc::new(EventQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.push(event(EventKind::Timer, 7));
            })
        };
        assert_eq!(popped_val(&queue), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn deferred_items_are_retried_before_newer_ones() {
        let queue = EventQueue::new();
        queue.push(event(EventKind::Timer, 1));
        queue.push_front(QueueItem::ForcedLine("go".into()));

        assert!(matches!(queue.pop_blocking(), QueueItem::ForcedLine(_)));
        assert_eq!(popped_val(&queue), Some(1));
    }

    #[test]
    fn poll_skips_input_events_and_takes_the_oldest_pollable() {
        let queue = EventQueue::new();
        queue.push(event(EventKind::CharInput, 1));
        queue.push(event(EventKind::Timer, 2));
        queue.push(event(EventKind::Arrange, 3));

        let ev = queue.poll().unwrap();
        assert_eq!(ev.kind, EventKind::Timer);
        let ev = queue.poll().unwrap();
        assert_eq!(ev.kind, EventKind::Arrange);
        assert!(queue.poll().is_none());
        // The char event is still waiting for a real select.
        assert_eq!(queue.len(), 1);
        assert_eq!(popped_val(&queue), Some(1));
    }

    #[test]
    fn poll_returns_none_on_an_empty_queue() {
        let queue = EventQueue::new();
        assert!(queue.poll().is_none());
    }

    #[test]
    fn forced_input_markers_are_observable() {
        let queue = EventQueue::new();
        assert!(!queue.has_forced_char());
        queue.push(QueueItem::ForcedChar(KeyEvent::new(
            crossterm::event::KeyCode::Char('x'),
            crossterm::event::KeyModifiers::NONE,
        )));
        assert!(queue.has_forced_char());
        assert!(!queue.has_forced_line());

        queue.clear();
        assert!(!queue.has_forced_char());
        assert_eq!(queue.len(), 0);
    }
}

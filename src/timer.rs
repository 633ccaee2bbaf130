//! Generation-stamped control for the timer ticker thread.
//!
//! Re-requesting timer events replaces the ticker: the old thread notices
//! the generation change at its next wakeup and exits without firing.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct TimerControl {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl TimerControl {
    /// Invalidates any running ticker and returns the generation the
    /// replacement should run under.
    pub(crate) fn restart(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        let current = *generation;
        drop(generation);
        self.changed.notify_all();
        current
    }

    /// Invalidates any running ticker without starting a new one.
    pub(crate) fn stop(&self) {
        self.restart();
    }

    /// Sleeps out one interval under `generation`. Returns `false` as soon
    /// as the generation is replaced, meaning the ticker should exit
    /// without firing.
    pub(crate) fn sleep_interval(&self, generation: u64, interval: Duration) -> bool {
        let guard = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, interval, |current| *current == generation)
            .unwrap_or_else(|e| e.into_inner());
        *guard == generation
    }
}

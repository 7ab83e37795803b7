//! Bounded sample queue between a blocking writer and a device callback.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct QueueState {
    samples: VecDeque<i16>,
    closed: bool,
    failed: Option<String>,
}

#[derive(Default)]
pub(crate) struct SampleQueue {
    state: Mutex<QueueState>,
    changed: Condvar,
}

impl SampleQueue {
    /// Appends `block`, waiting while more than `capacity` samples would be
    /// queued. A block larger than `capacity` is accepted into an empty queue.
    pub(crate) fn push(&self, block: &[i16], capacity: usize) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        while !state.samples.is_empty()
            && state.samples.len() + block.len() > capacity
            && state.failed.is_none()
        {
            state = self.changed.wait(state).unwrap();
        }
        if let Some(message) = &state.failed {
            return Err(message.clone());
        }
        state.samples.extend(block.iter().copied());
        Ok(())
    }

    /// Fills `data` from the front of the queue, padding with silence.
    pub(crate) fn fill(&self, data: &mut [i16]) {
        let mut state = self.state.lock().unwrap();
        for sample in data.iter_mut() {
            *sample = state.samples.pop_front().unwrap_or(0);
        }
        drop(state);
        self.changed.notify_all();
    }

    pub(crate) fn fail(&self, message: String) {
        self.state.lock().unwrap().failed = Some(message);
        self.changed.notify_all();
    }

    /// Marks the writer side finished. Queued samples are still played.
    pub(crate) fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.changed.notify_all();
    }

    /// Blocks until `close` or `fail` was called.
    pub(crate) fn wait_closed(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.closed && state.failed.is_none() {
            state = self.changed.wait(state).unwrap();
        }
    }

    /// Blocks until every queued sample was consumed, the queue failed, or
    /// `timeout` passed. Returns the samples left behind.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while !state.samples.is_empty() && state.failed.is_none() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = self.changed.wait_timeout(state, deadline - now).unwrap().0;
        }
        if state.failed.is_some() {
            state.samples.clear();
        }
        state.samples.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().unwrap().samples.len()
    }
}

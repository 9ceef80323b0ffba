//! Cooperative event loop: microtasks, tasks, timers and animation frames.
//!
//! The loop only queues work. Running a job may call into module code, so
//! draining the queues is the boundary's job (see the runtime scheduler).

use std::collections::{BTreeMap, VecDeque};

use tracing::trace;

use crate::promise::Reaction;
use crate::value::{HostValue, ObjectId};

/// How a promise reaction handles the settled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Fulfilled,
    Rejected,
}

/// A unit of queued work.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    /// Call a function with one argument; the result is discarded.
    Call {
        callback: ObjectId,
        argument: HostValue,
    },
    /// Run the handler of `reaction` matching `settlement` and settle the
    /// derived promise with its outcome. With no matching handler the
    /// settlement passes through unchanged.
    Reaction {
        reaction: Reaction,
        settlement: Settlement,
        argument: HostValue,
    },
    /// Settle a promise from outside the module (network completion).
    Settle {
        promise: ObjectId,
        settlement: Settlement,
        value: HostValue,
    },
}

/// A pending `setTimeout` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub id: u32,
    pub due: u64,
    pub callback: ObjectId,
}

#[derive(Debug)]
pub struct EventLoop {
    microtasks: VecDeque<Job>,
    tasks: VecDeque<Job>,
    /// Keyed by `(due, sequence)` so equal deadlines fire in scheduling order.
    timers: BTreeMap<(u64, u64), Timer>,
    timer_keys: BTreeMap<u32, (u64, u64)>,
    frames: Vec<(u32, ObjectId)>,
    now_ms: u64,
    sequence: u64,
    next_timer_id: u32,
    next_frame_id: u32,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self {
            microtasks: VecDeque::new(),
            tasks: VecDeque::new(),
            timers: BTreeMap::new(),
            timer_keys: BTreeMap::new(),
            frames: Vec::new(),
            now_ms: 0,
            sequence: 0,
            next_timer_id: 1,
            next_frame_id: 1,
        }
    }
}

impl EventLoop {
    /// Virtual clock, in milliseconds.
    pub fn now(&self) -> u64 {
        self.now_ms
    }

    pub fn queue_microtask(&mut self, job: Job) {
        trace!(?job, "queue microtask");
        self.microtasks.push_back(job);
    }

    pub fn queue_task(&mut self, job: Job) {
        trace!(?job, "queue task");
        self.tasks.push_back(job);
    }

    pub fn pop_microtask(&mut self) -> Option<Job> {
        self.microtasks.pop_front()
    }

    pub fn pop_task(&mut self) -> Option<Job> {
        self.tasks.pop_front()
    }

    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.len()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// No microtasks or tasks are queued. Timers and frames do not count.
    pub fn is_idle(&self) -> bool {
        self.microtasks.is_empty() && self.tasks.is_empty()
    }

    /// Schedule `callback` after `delay_ms` (negative delays clamp to 0).
    pub fn set_timeout(&mut self, callback: ObjectId, delay_ms: i32) -> u32 {
        let id = self.next_timer_id;
        self.next_timer_id = self.next_timer_id.wrapping_add(1).max(1);
        let due = self.now_ms + delay_ms.max(0) as u64;
        let key = (due, self.sequence);
        self.sequence += 1;
        self.timers.insert(key, Timer { id, due, callback });
        self.timer_keys.insert(id, key);
        trace!(id, due, "set timeout");
        id
    }

    /// Cancel a timer, returning it. Unknown or already-fired ids are
    /// ignored.
    pub fn clear_timeout(&mut self, id: u32) -> Option<Timer> {
        let key = self.timer_keys.remove(&id)?;
        self.timers.remove(&key)
    }

    /// Remove and return the earliest timer due at or before `until`,
    /// moving the clock to its deadline.
    pub fn next_due_timer(&mut self, until: u64) -> Option<Timer> {
        let (&key, _) = self.timers.iter().next()?;
        if key.0 > until {
            return None;
        }
        let timer = self.timers.remove(&key)?;
        self.timer_keys.remove(&timer.id);
        self.now_ms = self.now_ms.max(timer.due);
        Some(timer)
    }

    /// Move the clock forward without firing anything.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    pub fn request_animation_frame(&mut self, callback: ObjectId) -> u32 {
        let id = self.next_frame_id;
        self.next_frame_id = self.next_frame_id.wrapping_add(1).max(1);
        self.frames.push((id, callback));
        id
    }

    /// Cancel a frame callback, returning it.
    pub fn cancel_animation_frame(&mut self, id: u32) -> Option<ObjectId> {
        let pos = self.frames.iter().position(|(frame, _)| *frame == id)?;
        Some(self.frames.remove(pos).1)
    }

    /// Take every callback registered before this frame. Callbacks
    /// requested while the frame runs go to the next frame.
    pub fn take_animation_frames(&mut self) -> Vec<(u32, ObjectId)> {
        std::mem::take(&mut self.frames)
    }
}

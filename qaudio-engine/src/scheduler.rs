//! Software timers on the audio clock.
//!
//! The engine has two kinds of deferred work: live sparkle firings and the
//! end of an ambient fade-out. Both are entries in a [`TimerQueue`] that the
//! engine drains between render slices. Nothing here runs on its own; a timer
//! only fires when the engine asks for due entries.

use tracing::trace;

/// Handle to a scheduled timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// What to do when a timer comes due.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Task {
    Sparkle,
    FadeOutDone { generation: u64 },
}

#[derive(Debug)]
struct Entry {
    id: TimerId,
    due: f64,
    task: Task,
}

/// Timers kept sorted by due time (ties fire in scheduling order).
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    entries: Vec<Entry>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: f64, task: Task) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let idx = self.entries.partition_point(|e| e.due <= due);
        self.entries.insert(idx, Entry { id, due, task });
        trace!(?id, due, ?task, "timer scheduled");
        id
    }

    /// Remove a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Pop the earliest timer with `due <= now`.
    pub fn pop_due(&mut self, now: f64) -> Option<(TimerId, Task)> {
        if self.entries.first().is_some_and(|e| e.due <= now) {
            let e = self.entries.remove(0);
            Some((e.id, e.task))
        } else {
            None
        }
    }

    #[inline] pub fn len(&self) -> usize { self.entries.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// The live sparkle scheduler: a self-rearming, cancellable timer.
///
/// Owned by the ambient session while it is playing. Once `cancel` has run,
/// `rearm` refuses to schedule anything and a firing carrying a stale id is
/// not recognised by `owns`.
#[derive(Debug)]
pub struct SparkleScheduler {
    timer: Option<TimerId>,
    cancelled: bool,
}

impl SparkleScheduler {
    /// Arm the first firing at `due`.
    pub fn arm(timers: &mut TimerQueue, due: f64) -> Self {
        Self { timer: Some(timers.schedule(due, Task::Sparkle)), cancelled: false }
    }

    /// True if `id` is the firing this scheduler is waiting for.
    pub fn owns(&self, id: TimerId) -> bool {
        !self.cancelled && self.timer == Some(id)
    }

    /// Schedule the next firing. Returns false (and schedules nothing) once cancelled.
    pub fn rearm(&mut self, timers: &mut TimerQueue, due: f64) -> bool {
        if self.cancelled {
            return false;
        }
        if let Some(old) = self.timer.take() {
            timers.cancel(old);
        }
        self.timer = Some(timers.schedule(due, Task::Sparkle));
        true
    }

    /// Stop for good: no further firings, even one already due.
    pub fn cancel(&mut self, timers: &mut TimerQueue) {
        self.cancelled = true;
        if let Some(id) = self.timer.take() {
            timers.cancel(id);
        }
    }

    #[inline] pub fn is_cancelled(&self) -> bool { self.cancelled }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_due_order() {
        let mut q = TimerQueue::new();
        let late = q.schedule(2.0, Task::Sparkle);
        let early = q.schedule(1.0, Task::FadeOutDone { generation: 3 });
        assert!(q.pop_due(0.5).is_none());
        assert_eq!(q.pop_due(5.0), Some((early, Task::FadeOutDone { generation: 3 })));
        assert_eq!(q.pop_due(5.0), Some((late, Task::Sparkle)));
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_timer_never_pops() {
        let mut q = TimerQueue::new();
        let id = q.schedule(1.0, Task::Sparkle);
        assert!(q.cancel(id));
        assert!(!q.cancel(id));
        assert!(q.pop_due(10.0).is_none());
    }

    #[test]
    fn sparkle_rearms_until_cancelled() {
        let mut q = TimerQueue::new();
        let mut s = SparkleScheduler::arm(&mut q, 1.0);
        let (id, _) = q.pop_due(1.0).unwrap();
        assert!(s.owns(id));
        assert!(s.rearm(&mut q, 2.5));
        assert_eq!(q.len(), 1);

        s.cancel(&mut q);
        assert!(q.is_empty());
        assert!(s.is_cancelled());
        assert!(!s.rearm(&mut q, 4.0));
        assert!(q.is_empty());
    }

    #[test]
    fn stale_firing_is_not_owned() {
        let mut q = TimerQueue::new();
        let mut s = SparkleScheduler::arm(&mut q, 1.0);
        let (id, _) = q.pop_due(1.0).unwrap();
        s.cancel(&mut q);
        assert!(!s.owns(id));
    }
}

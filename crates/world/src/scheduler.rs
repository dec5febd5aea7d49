use std::collections::{BTreeMap, BTreeSet};

use session::SessionId;

/// The closed set of work the scheduler can carry. Payloads are plain data;
/// the tick loop interprets them, so callbacks can never run outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledAction {
    /// Restore an out-of-bounds instance to its spawn position.
    RespawnInstance { instance_id: i64 },
    /// Remove a dropped ground stack that nobody picked up.
    DespawnGroundItem { instance_id: i64 },
    /// One swing of an in-progress gathering session.
    GatherAttempt {
        session_id: SessionId,
        instance_id: i64,
    },
    SaveAll,
    WeatherCheck,
}

#[derive(Debug, Clone)]
pub struct Deferred {
    pub id: u64,
    pub action: ScheduledAction,
    pub interval: u64,
    pub repeating: bool,
}

/// Tick-counted one-shot/repeating task queue.
///
/// Tasks fire when the tick counter equals their fire tick exactly. The
/// counter advances by one per loop iteration (an overrunning tick finishes
/// late rather than skipping a number), so exact-match firing cannot strand
/// an overdue task.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: BTreeMap<(u64, u64), Deferred>,
    cancelled: BTreeSet<u64>,
    next_seq: u64,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a one-shot task; returns a handle usable with [`cancel`].
    ///
    /// [`cancel`]: Scheduler::cancel
    pub fn schedule_once(&mut self, fire_tick: u64, action: ScheduledAction) -> u64 {
        self.push(fire_tick, action, 0, false)
    }

    /// Schedule a repeating task, first firing `interval` ticks from `now`.
    pub fn schedule_repeating(&mut self, now: u64, interval: u64, action: ScheduledAction) -> u64 {
        let interval = interval.max(1);
        self.push(now + interval, action, interval, true)
    }

    pub fn cancel(&mut self, id: u64) {
        self.cancelled.insert(id);
    }

    /// Drain every task due exactly at `tick`. Repeating tasks are
    /// rescheduled before being returned; cancelled tasks are dropped.
    pub fn due(&mut self, tick: u64) -> Vec<Deferred> {
        let keys: Vec<(u64, u64)> = self
            .tasks
            .range((tick, 0)..(tick + 1, 0))
            .map(|(k, _)| *k)
            .collect();

        let mut fired = Vec::new();
        for key in keys {
            let task = match self.tasks.remove(&key) {
                Some(t) => t,
                None => continue,
            };
            if self.cancelled.remove(&task.id) {
                continue;
            }
            if task.repeating {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.tasks.insert((tick + task.interval, seq), task.clone());
            }
            fired.push(task);
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn push(&mut self, fire_tick: u64, action: ScheduledAction, interval: u64, repeating: bool) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.insert(
            (fire_tick, seq),
            Deferred {
                id,
                action,
                interval,
                repeating,
            },
        );
        id
    }
}

//! Periodic tick scheduler.
//!
//! All engine work is driven by repeating tasks. A task is cancelled through
//! its [`TaskHandle`], which only flips a flag, so tasks may cancel themselves
//! or each other while the scheduler is mid-tick.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Boxed repeating task.
pub type Task = Box<dyn FnMut() + Send>;

/// Cancellation handle for a scheduled task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Creates a fresh, live handle.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Scheduler-assigned task id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Stops the task from running again.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if the task has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Host periodic scheduler.
pub trait Scheduler: Send + Sync {
    /// Runs `task` every `interval_ticks` ticks until its handle is cancelled.
    fn run_every(&self, interval_ticks: u32, task: Task) -> TaskHandle;
}

struct ScheduledTask {
    handle: TaskHandle,
    interval: u64,
    next_run: u64,
    task: Task,
}

#[derive(Default)]
struct SchedulerState {
    tick: u64,
    tasks: Vec<ScheduledTask>,
}

/// In-process scheduler advanced explicitly with [`TickScheduler::tick`].
#[derive(Default)]
pub struct TickScheduler {
    state: Mutex<SchedulerState>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TickScheduler")
            .field("tick", &state.tick)
            .field("tasks", &state.tasks.len())
            .finish()
    }
}

impl TickScheduler {
    /// Creates an empty scheduler at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick number.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.state.lock().tick
    }

    /// Number of tasks that have not been cancelled.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.state
            .lock()
            .tasks
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }

    /// Advances one tick and runs every due task in scheduling order.
    ///
    /// Tasks scheduled while this runs first execute on a later tick.
    pub fn tick(&self) {
        let (now, mut tasks) = {
            let mut state = self.state.lock();
            state.tick += 1;
            (state.tick, std::mem::take(&mut state.tasks))
        };

        for task in &mut tasks {
            if task.handle.is_cancelled() || task.next_run > now {
                continue;
            }
            (task.task)();
            task.next_run = now + task.interval;
        }

        let mut state = self.state.lock();
        let added = std::mem::take(&mut state.tasks);
        tasks.extend(added);
        tasks.retain(|t| !t.handle.is_cancelled());
        trace!("Tick {} finished with {} tasks", now, tasks.len());
        state.tasks = tasks;
    }

    /// Advances `ticks` ticks.
    pub fn run_ticks(&self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
        }
    }
}

impl Scheduler for TickScheduler {
    fn run_every(&self, interval_ticks: u32, task: Task) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let interval = u64::from(interval_ticks.max(1));
        let mut state = self.state.lock();
        let next_run = state.tick + interval;
        state.tasks.push(ScheduledTask {
            handle: handle.clone(),
            interval,
            next_run,
            task,
        });
        handle
    }
}

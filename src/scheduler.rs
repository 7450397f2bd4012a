//! A cooperative, single-threaded timer queue with virtual time.
//!
//! Nothing runs until the owner drives the queue with [`Scheduler::run_next`],
//! [`Scheduler::advance`] or [`Scheduler::run_until_idle`]. A task that
//! returns an error stops the driving call, the way an uncaught exception
//! stops a host event loop turn.
use crate::Error;
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    fmt,
    rc::Rc,
    time::Duration,
};

type Task = Box<dyn FnOnce() -> Result<(), Error>>;

/// Handle to a queued task, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Cloning a `Scheduler` yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Default)]
struct Inner {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, TimerId), Task>,
    deadlines: HashMap<TimerId, Duration>,
}

impl Inner {
    fn pop_due(&mut self, limit: Option<Duration>) -> Option<(Duration, TimerId, Task)> {
        let (&(deadline, id), _) = self.queue.iter().next()?;
        if limit.is_some_and(|limit| deadline > limit) {
            return None;
        }
        let task = self.queue.remove(&(deadline, id))?;
        self.deadlines.remove(&id);
        Some((deadline, id, task))
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Number of tasks still queued.
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Queue `task` to run `delay` after the current virtual time.
    ///
    /// A zero delay still waits for the next turn of the queue.
    pub fn set_timeout<F>(&self, delay: Duration, task: F) -> TimerId
    where
        F: FnOnce() -> Result<(), Error> + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        let deadline = inner.now.saturating_add(delay);
        inner.queue.insert((deadline, id), Box::new(task));
        inner.deadlines.insert(id, deadline);
        tracing::trace!(timer = id.0, ?deadline, "timer scheduled");
        id
    }

    /// Cancel a queued task. Returns `false` if it already ran or was
    /// cancelled before.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        match inner.deadlines.remove(&id) {
            Some(deadline) => {
                inner.queue.remove(&(deadline, id));
                tracing::trace!(timer = id.0, "timer cleared");
                true
            }
            None => false,
        }
    }

    /// Run the earliest queued task, moving virtual time to its deadline.
    /// Returns `Ok(false)` when the queue is empty.
    pub fn run_next(&self) -> Result<bool, Error> {
        self.run_one(None)
    }

    /// Run every task due within `by` from now, then move virtual time to
    /// the end of that window.
    pub fn advance(&self, by: Duration) -> Result<usize, Error> {
        let limit = self.now().saturating_add(by);
        let mut ran = 0;
        while self.run_one(Some(limit))? {
            ran += 1;
        }
        let mut inner = self.inner.borrow_mut();
        if inner.now < limit {
            inner.now = limit;
        }
        Ok(ran)
    }

    /// Run tasks until the queue is empty, including tasks queued by the
    /// tasks being run.
    pub fn run_until_idle(&self) -> Result<usize, Error> {
        let mut ran = 0;
        while self.run_one(None)? {
            ran += 1;
        }
        Ok(ran)
    }

    fn run_one(&self, limit: Option<Duration>) -> Result<bool, Error> {
        // The borrow must end before the task runs: tasks schedule timers.
        let popped = {
            let mut inner = self.inner.borrow_mut();
            let popped = inner.pop_due(limit);
            if let Some((deadline, _, _)) = &popped {
                inner.now = inner.now.max(*deadline);
            }
            popped
        };
        match popped {
            Some((_, id, task)) => {
                tracing::trace!(timer = id.0, "timer fired");
                task()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("now", &inner.now)
            .field("pending", &inner.queue.len())
            .finish()
    }
}

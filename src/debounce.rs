//! Trailing debounce on top of the [`Scheduler`].
use crate::{scheduler::TimerId, Error, Scheduler};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
    time::Duration,
};

/// A single-argument callback whose calls collapse into one trailing
/// invocation.
///
/// Each [`call`](Debounced::call) cancels the invocation queued by the
/// previous call and queues a new one `delay` later, so a burst of calls
/// delivers only its last argument. Clones share the pending invocation.
///
/// # Examples
///
/// ```
/// use custom_promise::{Debounced, Scheduler};
/// use std::{cell::RefCell, rc::Rc, time::Duration};
///
/// let scheduler = Scheduler::new();
/// let seen = Rc::new(RefCell::new(vec![]));
/// let sink = seen.clone();
/// let save = Debounced::new(&scheduler, Duration::from_millis(50), move |n: u32| {
///     sink.borrow_mut().push(n);
///     Ok(())
/// });
/// save.call(1);
/// save.call(2);
/// save.call(3);
/// scheduler.run_until_idle().unwrap();
/// assert_eq!(*seen.borrow(), vec![3]);
/// ```
pub struct Debounced<A> {
    scheduler: Scheduler,
    delay: Duration,
    pending: Rc<Cell<Option<TimerId>>>,
    callback: Rc<RefCell<dyn FnMut(A) -> Result<(), Error>>>,
}

impl<A: 'static> Debounced<A> {
    pub fn new<F>(scheduler: &Scheduler, delay: Duration, callback: F) -> Self
    where
        F: FnMut(A) -> Result<(), Error> + 'static,
    {
        Self {
            scheduler: scheduler.clone(),
            delay,
            pending: Rc::new(Cell::new(None)),
            callback: Rc::new(RefCell::new(callback)),
        }
    }

    pub fn call(&self, arg: A) {
        if let Some(previous) = self.pending.take() {
            self.scheduler.clear_timeout(previous);
        }
        let pending = self.pending.clone();
        let callback = self.callback.clone();
        let id = self.scheduler.set_timeout(self.delay, move || {
            pending.set(None);
            let Ok(mut callback) = callback.try_borrow_mut() else {
                return Err(Error::Reentrant);
            };
            (&mut *callback)(arg)
        });
        self.pending.set(Some(id));
    }

    /// Drop the queued invocation, if any. Returns whether one was dropped.
    pub fn cancel(&self) -> bool {
        match self.pending.take() {
            Some(id) => self.scheduler.clear_timeout(id),
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<A> Clone for Debounced<A> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            delay: self.delay,
            pending: self.pending.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<A> fmt::Debug for Debounced<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.delay)
            .field("pending", &self.pending.get())
            .finish()
    }
}

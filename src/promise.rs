//! The promise: a settlement state plus an observer hub, settled through
//! debounced `Resolve`/`Reject` handles.
use crate::{Debounced, Error, Observer, PromiseState, Scheduler, Settled, State};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
    task::Waker,
    time::Duration,
};

/// Notification categories of a promise's hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Succeeded,
    Failed,
}

/// Outcome handed to the settle-once gate by the `Resolve`/`Reject` handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement<T, E> {
    Fulfilled(T),
    Rejected(E),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Debounce window of the `Resolve`/`Reject` handles. Zero still defers
    /// settlement to the next scheduler turn.
    pub settle_delay: Duration,
}

impl Config {
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }
}

pub(crate) struct Core<T, E> {
    // Handlers read the state holder, so broadcasts carry no payload.
    hub: Observer<Channel, ()>,
    state: RefCell<PromiseState<T, E>>,
    settled: Cell<bool>,
    wakers: RefCell<Vec<Waker>>,
}

impl<T, E> Core<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    fn new() -> Self {
        Self {
            hub: Observer::new(),
            state: RefCell::new(PromiseState::new()),
            settled: Cell::new(false),
            wakers: RefCell::new(vec![]),
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state.borrow().state()
    }

    pub(crate) fn value(&self) -> Option<T> {
        self.state.borrow().resolved()
    }

    pub(crate) fn error(&self) -> Option<E> {
        self.state.borrow().rejected()
    }

    pub(crate) fn park(&self, waker: &Waker) {
        let mut wakers = self.wakers.borrow_mut();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    fn wake_all(&self) {
        let wakers = std::mem::take(&mut *self.wakers.borrow_mut());
        for waker in wakers {
            waker.wake();
        }
    }

    fn resolve_executor(&self, value: T) -> Result<(), Error> {
        self.state.borrow_mut().set_resolved(value);
        tracing::debug!("promise fulfilled");
        self.wake_all();
        self.hub.broadcast(Channel::Succeeded, &())
    }

    fn reject_executor(&self, error: E) -> Result<(), Error> {
        tracing::debug!(?error, "promise rejected");
        self.state.borrow_mut().set_rejected(error);
        self.wake_all();
        self.hub.broadcast(Channel::Failed, &())
    }

    /// Settle-once gate for the producer's handles.
    fn settle(&self, settlement: Settlement<T, E>) -> Result<(), Error> {
        if self.settled.replace(true) {
            tracing::warn!(state = ?self.state(), "promise already settled, ignoring");
            return Ok(());
        }
        match settlement {
            Settlement::Fulfilled(value) => self.resolve_executor(value),
            Settlement::Rejected(error) => self.reject_executor(error),
        }
    }
}

/// Fulfils the promise it was created for. Calls are debounced: a burst of
/// calls settles with the last value, on a later scheduler turn.
pub struct Resolve<T>(Debounced<T>);

/// Rejects the promise it was created for. Debounced like [`Resolve`].
pub struct Reject<E>(Debounced<E>);

impl<T: 'static> Resolve<T> {
    pub fn call(&self, value: T) {
        self.0.call(value)
    }
}

impl<E: 'static> Reject<E> {
    pub fn call(&self, error: E) {
        self.0.call(error)
    }
}

impl<T> Clone for Resolve<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<E> Clone for Reject<E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for Resolve<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolve").field(&self.0).finish()
    }
}

impl<E> fmt::Debug for Reject<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reject").field(&self.0).finish()
    }
}

/// A value that some producer settles later.
///
/// [`then`](Promise::then) and [`catch`](Promise::catch) register parallel
/// subscriptions on this promise and return it, they do not derive a new
/// promise. Subscriptions only fire on the broadcast that settles the
/// promise; registering after settlement never fires.
///
/// Cloning yields another handle to the same promise.
pub struct Promise<T, E> {
    scheduler: Scheduler,
    core: Option<Rc<Core<T, E>>>,
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    /// Build a promise and run `producer` synchronously with its handles.
    ///
    /// # Examples
    ///
    /// ```
    /// use custom_promise::{Promise, Scheduler, State};
    ///
    /// let scheduler = Scheduler::new();
    /// let promise = Promise::<&str, ()>::new(&scheduler, |resolve, _| resolve.call("done"));
    /// assert_eq!(promise.state(), State::Pending);
    /// scheduler.run_until_idle().unwrap();
    /// assert_eq!(promise.value(), Some("done"));
    /// ```
    pub fn new<P>(scheduler: &Scheduler, producer: P) -> Self
    where
        P: FnOnce(Resolve<T>, Reject<E>),
    {
        Self::with_config(scheduler, Config::default(), producer)
    }

    pub fn with_config<P>(scheduler: &Scheduler, config: Config, producer: P) -> Self
    where
        P: FnOnce(Resolve<T>, Reject<E>),
    {
        let (promise, resolve, reject) = Self::wire(scheduler, config);
        producer(resolve, reject);
        promise
    }

    /// Like [`Promise::new`] for a producer that can fail. The producer's
    /// error is returned as is; nothing is settled on its behalf.
    pub fn try_new<P>(scheduler: &Scheduler, producer: P) -> Result<Self, E>
    where
        P: FnOnce(Resolve<T>, Reject<E>) -> Result<(), E>,
    {
        Self::try_with_config(scheduler, Config::default(), producer)
    }

    pub fn try_with_config<P>(
        scheduler: &Scheduler,
        config: Config,
        producer: P,
    ) -> Result<Self, E>
    where
        P: FnOnce(Resolve<T>, Reject<E>) -> Result<(), E>,
    {
        let (promise, resolve, reject) = Self::wire(scheduler, config);
        producer(resolve, reject)?;
        Ok(promise)
    }

    /// `None` yields an inert promise: it never settles and chaining on it
    /// does nothing.
    pub fn from_producer<P>(scheduler: &Scheduler, producer: Option<P>) -> Self
    where
        P: FnOnce(Resolve<T>, Reject<E>),
    {
        match producer {
            Some(producer) => Self::new(scheduler, producer),
            None => Self {
                scheduler: scheduler.clone(),
                core: None,
            },
        }
    }

    /// A promise fulfilled with `value` on the next scheduler turn.
    pub fn resolve(scheduler: &Scheduler, value: T) -> Self {
        Self::new(scheduler, move |resolve, _| resolve.call(value))
    }

    /// A promise rejected with `error` on the next scheduler turn.
    pub fn reject(scheduler: &Scheduler, error: E) -> Self {
        Self::new(scheduler, move |_, reject| reject.call(error))
    }

    fn wire(scheduler: &Scheduler, config: Config) -> (Self, Resolve<T>, Reject<E>) {
        let core = Rc::new(Core::new());
        // The handles hold the core strongly: a queued settlement keeps the
        // promise alive.
        let resolve = {
            let core = core.clone();
            Debounced::new(scheduler, config.settle_delay, move |value: T| {
                core.settle(Settlement::Fulfilled(value))
            })
        };
        let reject = {
            let core = core.clone();
            Debounced::new(scheduler, config.settle_delay, move |error: E| {
                core.settle(Settlement::Rejected(error))
            })
        };
        let promise = Self {
            scheduler: scheduler.clone(),
            core: Some(core),
        };
        (promise, Resolve(resolve), Reject(reject))
    }

    /// Run `callback` with the success value when the promise fulfils.
    ///
    /// `Ok(Some(v))` replaces the stored success value, `Ok(None)` keeps it.
    /// `Err(e)` rejects the promise with `e` and then drops every
    /// subscription of this promise, on both channels.
    pub fn then<F>(&self, callback: F) -> &Self
    where
        F: FnMut(T) -> Result<Option<T>, E> + 'static,
    {
        let Some(core) = &self.core else {
            tracing::warn!("then on a promise without producer ignored");
            return self;
        };
        let weak = Rc::downgrade(core);
        let mut callback = callback;
        core.hub.subscribe(Channel::Succeeded, move |_| {
            let Some(core) = weak.upgrade() else {
                return Ok(());
            };
            let current = core.state.borrow().resolved();
            let Some(value) = current else {
                return Ok(());
            };
            match callback(value.clone()) {
                Ok(next) => {
                    core.state.borrow_mut().set_resolved(next.unwrap_or(value));
                    Ok(())
                }
                Err(error) => {
                    tracing::debug!(?error, "success handler failed");
                    core.reject_executor(error)?;
                    core.hub.clear_all();
                    Ok(())
                }
            }
        });
        self
    }

    /// Run `callback` with the failure value when the promise rejects.
    ///
    /// `Ok(Some(e))` replaces the stored failure value, `Ok(None)` keeps it.
    /// `Err(e)` is not handled here: it aborts the broadcast and surfaces as
    /// [`Error::Uncaught`] from the scheduler call that settled the promise.
    pub fn catch<F>(&self, callback: F) -> &Self
    where
        F: FnMut(E) -> Result<Option<E>, E> + 'static,
    {
        let Some(core) = &self.core else {
            tracing::warn!("catch on a promise without producer ignored");
            return self;
        };
        let weak = Rc::downgrade(core);
        let mut callback = callback;
        core.hub.subscribe(Channel::Failed, move |_| {
            let Some(core) = weak.upgrade() else {
                return Ok(());
            };
            let current = core.state.borrow().rejected();
            let Some(error) = current else {
                return Ok(());
            };
            match callback(error.clone()) {
                Ok(next) => {
                    core.state.borrow_mut().set_rejected(next.unwrap_or(error));
                    Ok(())
                }
                Err(raised) => Err(Error::Uncaught(format!("{raised:?}"))),
            }
        });
        self
    }

    /// [`then`](Promise::then) that reports chaining on an inert promise.
    pub fn try_then<F>(&self, callback: F) -> Result<&Self, Error>
    where
        F: FnMut(T) -> Result<Option<T>, E> + 'static,
    {
        if self.is_inert() {
            return Err(Error::Inert);
        }
        Ok(self.then(callback))
    }

    /// [`catch`](Promise::catch) that reports chaining on an inert promise.
    pub fn try_catch<F>(&self, callback: F) -> Result<&Self, Error>
    where
        F: FnMut(E) -> Result<Option<E>, E> + 'static,
    {
        if self.is_inert() {
            return Err(Error::Inert);
        }
        Ok(self.catch(callback))
    }

    /// Wait for all `promises` to fulfil.
    ///
    /// Fulfils with every value in input order, or rejects with the first
    /// failure observed. Inputs that already settled are read directly.
    /// An inert input keeps the combined promise pending.
    pub fn all<I>(scheduler: &Scheduler, promises: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator<Item = Promise<T, E>>,
    {
        let promises: Vec<_> = promises.into_iter().collect();
        Promise::<Vec<T>, E>::new(scheduler, move |resolve, reject| {
            if promises.is_empty() {
                resolve.call(Vec::new());
                return;
            }
            let values = RefCell::new(vec![None; promises.len()]);
            let remaining = Cell::new(promises.len());
            let fill = Rc::new(move |index: usize, value: T| {
                let mut values = values.borrow_mut();
                if values[index].replace(value).is_none() {
                    remaining.set(remaining.get() - 1);
                }
                if remaining.get() == 0 {
                    resolve.call(values.iter().flatten().cloned().collect());
                }
            });
            let failed = Cell::new(false);
            let fail = Rc::new(move |error: E| {
                if !failed.replace(true) {
                    reject.call(error);
                }
            });

            for (index, promise) in promises.iter().enumerate() {
                match promise.state() {
                    State::Fulfilled => {
                        if let Some(value) = promise.value() {
                            (*fill)(index, value);
                        }
                    }
                    State::Rejected => {
                        if let Some(error) = promise.error() {
                            (*fail)(error);
                        }
                    }
                    State::Pending => {
                        let fill = fill.clone();
                        promise.then(move |value| {
                            (*fill)(index, value);
                            Ok(None)
                        });
                        let fail = fail.clone();
                        promise.catch(move |error| {
                            (*fail)(error);
                            Ok(None)
                        });
                    }
                }
            }
        })
    }

    pub fn state(&self) -> State {
        self.core
            .as_ref()
            .map_or(State::Pending, |core| core.state())
    }

    /// Current success value, if any.
    pub fn value(&self) -> Option<T> {
        self.core.as_ref().and_then(|core| core.value())
    }

    /// Current failure value, if any.
    pub fn error(&self) -> Option<E> {
        self.core.as_ref().and_then(|core| core.error())
    }

    pub fn is_inert(&self) -> bool {
        self.core.is_none()
    }

    /// Number of live `then`/`catch` subscriptions.
    pub fn subscribers(&self) -> usize {
        self.core.as_ref().map_or(0, |core| core.hub.len())
    }

    /// A future resolving once this promise settles.
    pub fn settled(&self) -> Result<Settled<T, E>, Error> {
        match &self.core {
            Some(core) => Ok(Settled::new(core.clone())),
            None => Err(Error::Inert),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            core: self.core.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E>
where
    T: Clone + fmt::Debug + 'static,
    E: Clone + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .field("value", &self.value())
            .field("error", &self.error())
            .finish()
    }
}

use crate::{promise::Core, State};
use std::{
    fmt,
    future::Future,
    rc::Rc,
    task::{Context, Poll},
};

/// Resolves to the promise's value once it fulfils, or to its failure once
/// it rejects.
///
/// The scheduler still has to be driven for the promise to settle; awaiting
/// only observes it. A promise whose producer never settles it stays pending.
///
/// # Examples
///
/// ```
/// use custom_promise::{Promise, Scheduler};
/// use futures::executor::block_on;
///
/// let scheduler = Scheduler::new();
/// let promise = Promise::<u8, String>::reject(&scheduler, "💥".into());
/// let settled = promise.settled().unwrap();
/// scheduler.run_until_idle().unwrap();
/// assert_eq!(block_on(settled), Err("💥".to_string()));
/// ```
pub struct Settled<T, E> {
    core: Rc<Core<T, E>>,
}

impl<T, E> Settled<T, E> {
    pub(crate) fn new(core: Rc<Core<T, E>>) -> Self {
        Self { core }
    }
}

impl<T, E> Future for Settled<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.core.state() {
            State::Rejected => match self.core.error() {
                Some(error) => Poll::Ready(Err(error)),
                None => Poll::Pending,
            },
            State::Fulfilled => match self.core.value() {
                Some(value) => Poll::Ready(Ok(value)),
                None => Poll::Pending,
            },
            State::Pending => {
                self.core.park(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl<T, E> fmt::Debug for Settled<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settled").finish_non_exhaustive()
    }
}

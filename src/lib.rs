//! A promise that is settled once by a producer and notifies subscribers
//! through a per-promise observer hub.
//!
//! Settlement is always deferred: the `Resolve` and `Reject` handles given to
//! the producer are debounced onto a cooperative [`Scheduler`], so nothing is
//! observable until the scheduler is driven.
//!
//! # Examples
//!
//! ```
//! use custom_promise::{Promise, Scheduler};
//! use std::{cell::Cell, rc::Rc, time::Duration};
//!
//! let scheduler = Scheduler::new();
//! let timer = scheduler.clone();
//! let promise = Promise::<i32, String>::new(&scheduler, move |resolve, _reject| {
//!     timer.set_timeout(Duration::from_millis(2000), move || {
//!         resolve.call(1);
//!         Ok(())
//!     });
//! });
//!
//! let seen = Rc::new(Cell::new(None));
//! let sink = seen.clone();
//! promise.then(move |value| {
//!     sink.set(Some(value));
//!     Ok(None)
//! });
//!
//! scheduler.run_until_idle().unwrap();
//! assert_eq!(seen.get(), Some(1));
//! ```

pub mod debounce;
pub mod observer;
pub mod promise;
pub mod scheduler;
pub mod settled;
pub mod state;

pub use debounce::Debounced;
pub use observer::{Observer, Subscription};
pub use promise::{Channel, Config, Promise, Reject, Resolve, Settlement};
pub use scheduler::{Scheduler, TimerId};
pub use settled::Settled;
pub use state::{PromiseState, State};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Chaining was attempted on a promise constructed without a producer.
    #[error("promise has no producer, chaining is disabled")]
    Inert,
    /// A debounced callback was invoked while it was already running.
    #[error("debounced callback is already running")]
    Reentrant,
    /// A failure handler errored while a broadcast was running.
    #[error("uncaught error in failure handler: {0}")]
    Uncaught(String),
}

/// Where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

/// Last recorded success value and last recorded failure value.
///
/// A passive holder: both slots can be written any number of times and
/// nothing is notified. Settle-once is enforced by [`crate::Promise`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromiseState<T, E> {
    resolved: Option<T>,
    rejected: Option<E>,
}

impl<T, E> Default for PromiseState<T, E> {
    fn default() -> Self {
        Self {
            resolved: None,
            rejected: None,
        }
    }
}

impl<T: Clone, E: Clone> PromiseState<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolved(&self) -> Option<T> {
        self.resolved.clone()
    }

    pub fn set_resolved(&mut self, value: T) {
        self.resolved = Some(value);
    }

    pub fn rejected(&self) -> Option<E> {
        self.rejected.clone()
    }

    pub fn set_rejected(&mut self, error: E) {
        self.rejected = Some(error);
    }

    /// A recorded failure wins over a recorded success: a promise whose
    /// success handler failed reads as rejected.
    pub fn state(&self) -> State {
        match (&self.resolved, &self.rejected) {
            (_, Some(_)) => State::Rejected,
            (Some(_), None) => State::Fulfilled,
            (None, None) => State::Pending,
        }
    }
}

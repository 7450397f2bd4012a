//! Channel-keyed publish/subscribe hub.
//!
//! Subscriptions live in a vector of optional slots indexed by their id.
//! Removing a subscription empties its slot, so ids stay stable until
//! [`Observer::clear_all`] starts a new epoch.
use crate::Error;
use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

type Callback<P> = Rc<RefCell<dyn FnMut(&P) -> Result<(), Error>>>;

struct Slot<K, P> {
    channel: K,
    callback: Callback<P>,
}

struct Inner<K, P> {
    next_id: usize,
    epoch: u64,
    slots: Vec<Option<Slot<K, P>>>,
}

/// Cloning an `Observer` yields another handle to the same hub.
pub struct Observer<K, P> {
    inner: Rc<RefCell<Inner<K, P>>>,
}

/// Removes the subscription it was returned for.
///
/// The id is captured when subscribing, so handles stay correct no matter how
/// many subscriptions were added afterwards. After a `clear_all` the handle
/// does nothing.
pub struct Subscription<K, P> {
    hub: Weak<RefCell<Inner<K, P>>>,
    id: usize,
    epoch: u64,
}

impl<K, P> Observer<K, P>
where
    K: Copy + PartialEq + fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 0,
                epoch: 0,
                slots: vec![],
            })),
        }
    }

    pub fn subscribe<F>(&self, channel: K, callback: F) -> Subscription<K, P>
    where
        F: FnMut(&P) -> Result<(), Error> + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        // `slots.len() == next_id` holds within an epoch.
        inner.slots.push(Some(Slot {
            channel,
            callback: Rc::new(RefCell::new(callback)),
        }));
        tracing::trace!(id, ?channel, "subscribed");
        Subscription {
            hub: Rc::downgrade(&self.inner),
            id,
            epoch: inner.epoch,
        }
    }

    /// Invoke, in subscription order, every callback on `channel`.
    ///
    /// Only slots present when the broadcast starts are visited. A slot
    /// emptied mid-broadcast is skipped and a `clear_all` mid-broadcast ends
    /// it. A callback that is already running further up the stack is
    /// skipped. The first callback error aborts the broadcast and is
    /// returned.
    pub fn broadcast(&self, channel: K, payload: &P) -> Result<(), Error> {
        let (epoch, end) = {
            let inner = self.inner.borrow();
            (inner.epoch, inner.slots.len())
        };
        tracing::trace!(?channel, subscribers = end, "broadcast");
        for id in 0..end {
            let callback = {
                let inner = self.inner.borrow();
                if inner.epoch != epoch {
                    break;
                }
                match inner.slots.get(id) {
                    Some(Some(slot)) if slot.channel == channel => slot.callback.clone(),
                    _ => continue,
                }
            };
            let Ok(mut callback) = callback.try_borrow_mut() else {
                tracing::trace!(id, "skipping re-entrant subscriber");
                continue;
            };
            (&mut *callback)(payload)?;
        }
        Ok(())
    }

    /// Drop every subscription and reset the id counter.
    pub fn clear_all(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.slots.clear();
        inner.next_id = 0;
        inner.epoch += 1;
        tracing::trace!(epoch = inner.epoch, "subscriptions cleared");
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.borrow().slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, P> Default for Observer<K, P>
where
    K: Copy + PartialEq + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> Clone for Observer<K, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, P> fmt::Debug for Observer<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observer")
            .field("next_id", &inner.next_id)
            .field("epoch", &inner.epoch)
            .field("live", &inner.slots.iter().flatten().count())
            .finish()
    }
}

impl<K, P> Subscription<K, P> {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Remove the subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(hub) = self.hub.upgrade() else {
            return false;
        };
        let mut hub = hub.borrow_mut();
        if hub.epoch != self.epoch {
            return false;
        }
        match hub.slots.get_mut(self.id) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }
}

impl<K, P> fmt::Debug for Subscription<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Observer, Subscription};
    use crate::Error;
    use std::{cell::RefCell, rc::Rc};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Topic {
        News,
        Weather,
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn record(
        hub: &Observer<Topic, i32>,
        topic: Topic,
        name: &'static str,
        log: &Log,
    ) -> Subscription<Topic, i32> {
        let log = log.clone();
        hub.subscribe(topic, move |n: &i32| {
            log.borrow_mut().push(format!("{name}:{n}"));
            Ok(())
        })
    }

    #[test]
    fn test_broadcast_matches_channel_in_order() {
        let hub = Observer::new();
        let log = Log::default();
        record(&hub, Topic::News, "a", &log);
        record(&hub, Topic::Weather, "b", &log);
        record(&hub, Topic::News, "c", &log);
        hub.broadcast(Topic::News, &1).unwrap();
        assert_eq!(*log.borrow(), vec!["a:1", "c:1"]);
    }

    #[test]
    fn test_unsubscribe_removes_its_own_entry() {
        let hub = Observer::new();
        let log = Log::default();
        let first = record(&hub, Topic::News, "first", &log);
        record(&hub, Topic::News, "second", &log);
        record(&hub, Topic::News, "third", &log);
        assert!(first.unsubscribe());
        hub.broadcast(Topic::News, &0).unwrap();
        assert_eq!(*log.borrow(), vec!["second:0", "third:0"]);
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn test_ids_are_not_reused_after_removal() {
        let hub = Observer::new();
        let log = Log::default();
        let a = record(&hub, Topic::News, "a", &log);
        assert_eq!(a.id(), 0);
        a.unsubscribe();
        let b = record(&hub, Topic::News, "b", &log);
        assert_eq!(b.id(), 1);
    }

    #[test]
    fn test_clear_all_resets_and_disarms_old_handles() {
        let hub = Observer::new();
        let log = Log::default();
        let old = record(&hub, Topic::News, "old", &log);
        hub.clear_all();
        assert!(hub.is_empty());
        let new = record(&hub, Topic::News, "new", &log);
        assert_eq!(new.id(), 0);
        assert!(!old.unsubscribe());
        hub.broadcast(Topic::News, &2).unwrap();
        assert_eq!(*log.borrow(), vec!["new:2"]);
    }

    #[test]
    fn test_subscribe_during_broadcast_not_visited() {
        let hub: Observer<Topic, i32> = Observer::new();
        let log = Log::default();
        let inner_hub = hub.clone();
        let inner_log = log.clone();
        hub.subscribe(Topic::News, move |_| {
            record(&inner_hub, Topic::News, "late", &inner_log);
            Ok(())
        });
        hub.broadcast(Topic::News, &1).unwrap();
        assert!(log.borrow().is_empty());
        hub.broadcast(Topic::News, &2).unwrap();
        assert_eq!(*log.borrow(), vec!["late:2"]);
    }

    #[test]
    fn test_unsubscribe_during_broadcast_skips_slot() {
        let hub: Observer<Topic, i32> = Observer::new();
        let log = Log::default();
        let victim: Rc<RefCell<Option<Subscription<Topic, i32>>>> = Rc::new(RefCell::new(None));
        let handle = victim.clone();
        hub.subscribe(Topic::News, move |_| {
            if let Some(sub) = handle.borrow_mut().take() {
                sub.unsubscribe();
            }
            Ok(())
        });
        *victim.borrow_mut() = Some(record(&hub, Topic::News, "victim", &log));
        hub.broadcast(Topic::News, &1).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_clear_during_broadcast_ends_it() {
        let hub: Observer<Topic, i32> = Observer::new();
        let log = Log::default();
        let inner_hub = hub.clone();
        hub.subscribe(Topic::News, move |_| {
            inner_hub.clear_all();
            Ok(())
        });
        record(&hub, Topic::News, "after", &log);
        hub.broadcast(Topic::News, &1).unwrap();
        assert!(log.borrow().is_empty());
        assert!(hub.is_empty());
    }

    #[test]
    fn test_callback_error_aborts_broadcast() {
        let hub: Observer<Topic, i32> = Observer::new();
        let log = Log::default();
        hub.subscribe(Topic::News, |_| Err(Error::Uncaught("nope".into())));
        record(&hub, Topic::News, "after", &log);
        assert_eq!(
            hub.broadcast(Topic::News, &1),
            Err(Error::Uncaught("nope".into()))
        );
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_reentrant_broadcast_skips_running_callback() {
        let hub: Observer<Topic, i32> = Observer::new();
        let hits = Rc::new(RefCell::new(0));
        let inner_hub = hub.clone();
        let counter = hits.clone();
        hub.subscribe(Topic::News, move |n| {
            *counter.borrow_mut() += 1;
            if *n == 0 {
                inner_hub.broadcast(Topic::News, &1)?;
            }
            Ok(())
        });
        hub.broadcast(Topic::News, &0).unwrap();
        assert_eq!(*hits.borrow(), 1);
    }
}

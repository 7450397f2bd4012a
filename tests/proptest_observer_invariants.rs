//! Property-based invariant tests for the observer hub and the debounce
//! wrapper.
//!
//! 1. An unsubscribe handle removes exactly the subscription it came from.
//! 2. Broadcast visits matching subscriptions in subscription order.
//! 3. A debounced burst delivers only its last argument, once.

use custom_promise::{Debounced, Observer, Scheduler};
use proptest::prelude::*;
use std::{cell::RefCell, rc::Rc, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Side {
    Left,
    Right,
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Left), Just(Side::Right)]
}

proptest! {
    #[test]
    fn unsubscribe_removes_exactly_its_own_entry(
        sides in proptest::collection::vec(side_strategy(), 1..24),
        removed in proptest::collection::vec(any::<bool>(), 24),
    ) {
        let hub: Observer<Side, ()> = Observer::new();
        let seen = Rc::new(RefCell::new(vec![]));
        let mut handles = vec![];
        for (index, side) in sides.iter().enumerate() {
            let sink = seen.clone();
            handles.push(hub.subscribe(*side, move |_| {
                sink.borrow_mut().push(index);
                Ok(())
            }));
        }
        for (index, handle) in handles.into_iter().enumerate() {
            if removed[index] {
                prop_assert!(handle.unsubscribe());
            }
        }

        hub.broadcast(Side::Left, &()).unwrap();
        hub.broadcast(Side::Right, &()).unwrap();

        let expected_left = (0..sides.len()).filter(|&i| !removed[i] && sides[i] == Side::Left);
        let expected_right = (0..sides.len()).filter(|&i| !removed[i] && sides[i] == Side::Right);
        let expected: Vec<usize> = expected_left.chain(expected_right).collect();
        prop_assert_eq!(&*seen.borrow(), &expected);
        prop_assert_eq!(hub.len(), (0..sides.len()).filter(|&i| !removed[i]).count());
    }

    #[test]
    fn debounced_burst_delivers_last_argument(
        values in proptest::collection::vec(any::<u16>(), 1..16),
        gap in 0u64..10,
    ) {
        let scheduler = Scheduler::new();
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        let debounced = Debounced::new(&scheduler, Duration::from_millis(10), move |v: u16| {
            sink.borrow_mut().push(v);
            Ok(())
        });
        for value in &values {
            debounced.call(*value);
            scheduler.advance(Duration::from_millis(gap)).unwrap();
        }
        scheduler.run_until_idle().unwrap();
        prop_assert_eq!(&*seen.borrow(), &vec![*values.last().unwrap()]);
    }
}

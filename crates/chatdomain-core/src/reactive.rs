//! Single-threaded publish/subscribe primitives.
//!
//! Streams, subscriptions and lifetimes are `!Send`: they live on the main
//! loop thread together with the registry and accounts that use them.
//!
//! A handler is only invoked while its [`Subscription`] is alive. Dropping a
//! subscription in the middle of a fire (for example from another handler of
//! the same stream) guarantees the dropped handler is not called afterwards.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Handler<T> = Rc<dyn Fn(&T)>;

struct Entry<T> {
    id: u64,
    alive: Rc<Cell<bool>>,
    handler: Handler<T>,
}

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

/// Source side of an event channel. Owners fire, everyone else subscribes
/// through [`EventStream::events`].
pub struct EventStream<T> {
    inner: Rc<RefCell<Subscribers<T>>>,
}

impl<T: 'static> EventStream<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Subscribers::default())),
        }
    }

    /// Deliver `value` to every subscriber that is alive at the moment it is reached.
    pub fn fire(&self, value: &T) {
        let snapshot: Vec<(Rc<Cell<bool>>, Handler<T>)> = self
            .inner
            .borrow()
            .entries
            .iter()
            .map(|entry| (entry.alive.clone(), entry.handler.clone()))
            .collect();

        for (alive, handler) in snapshot {
            if alive.get() {
                handler(value);
            }
        }
    }

    pub fn events(&self) -> Events<T> {
        Events {
            inner: self.inner.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }
}

impl<T: 'static> Default for EventStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscribe-only view of an [`EventStream`].
pub struct Events<T> {
    inner: Rc<RefCell<Subscribers<T>>>,
}

impl<T> Clone for Events<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Events<T> {
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, handler: impl Fn(&T) + 'static) -> Subscription {
        let alive = Rc::new(Cell::new(true));
        let id = {
            let mut subscribers = self.inner.borrow_mut();
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            subscribers.entries.push(Entry {
                id,
                alive: alive.clone(),
                handler: Rc::new(handler),
            });
            id
        };

        let list: Weak<RefCell<Subscribers<T>>> = Rc::downgrade(&self.inner);
        Subscription {
            alive,
            remove: Some(Box::new(move || {
                if let Some(list) = list.upgrade() {
                    list.borrow_mut().entries.retain(|entry| entry.id != id);
                }
            })),
        }
    }
}

/// Handle to one registered handler. Unsubscribes on drop.
pub struct Subscription {
    alive: Rc<Cell<bool>>,
    remove: Option<Box<dyn FnOnce()>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.alive.set(false);
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

/// Owns a group of subscriptions and tears all of them down together.
#[derive(Default)]
pub struct Lifetime {
    subscriptions: Vec<Subscription>,
}

impl Lifetime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn destroy(&mut self) {
        let subscriptions = std::mem::take(&mut self.subscriptions);
        drop(subscriptions);
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }
}

/// A value plus the stream of its changes.
pub struct Variable<T> {
    current: RefCell<T>,
    changes: EventStream<T>,
}

impl<T: Clone + 'static> Variable<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RefCell::new(value),
            changes: EventStream::new(),
        }
    }

    pub fn current(&self) -> T {
        self.current.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.current.borrow_mut() = value.clone();
        self.changes.fire(&value);
    }

    pub fn changes(&self) -> Events<T> {
        self.changes.events()
    }

    /// Calls `handler` with the current value right away, then with every change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn value(&self, handler: impl Fn(&T) + 'static) -> Subscription {
        let handler: Rc<dyn Fn(&T)> = Rc::new(handler);
        let current = self.current();
        handler(&current);
        self.changes.events().subscribe(move |value| handler(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_reaches_every_subscriber() {
        let stream = EventStream::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let seen = seen.clone();
            stream.events().subscribe(move |v| seen.borrow_mut().push(("first", *v)))
        };
        let second = {
            let seen = seen.clone();
            stream.events().subscribe(move |v| seen.borrow_mut().push(("second", *v)))
        };

        stream.fire(&7);
        assert_eq!(*seen.borrow(), vec![("first", 7), ("second", 7)]);
        assert_eq!(stream.subscriber_count(), 2);

        drop(first);
        drop(second);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn test_dropped_subscription_is_not_called() {
        let stream = EventStream::<()>::new();
        let count = Rc::new(Cell::new(0));

        let subscription = {
            let count = count.clone();
            stream.events().subscribe(move |_| count.set(count.get() + 1))
        };
        stream.fire(&());
        drop(subscription);
        stream.fire(&());

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_subscription_cancelled_during_fire() {
        let stream = EventStream::<()>::new();
        let victim_calls = Rc::new(Cell::new(0));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let _killer = {
            let victim = victim.clone();
            stream.events().subscribe(move |_| {
                victim.borrow_mut().take();
            })
        };
        *victim.borrow_mut() = Some({
            let victim_calls = victim_calls.clone();
            stream
                .events()
                .subscribe(move |_| victim_calls.set(victim_calls.get() + 1))
        });

        stream.fire(&());
        assert_eq!(victim_calls.get(), 0);
        assert_eq!(stream.subscriber_count(), 1);
    }

    #[test]
    fn test_subscribe_during_fire_waits_for_next_event() {
        let stream = Rc::new(EventStream::<u32>::new());
        let late_values = Rc::new(RefCell::new(Vec::new()));
        let holder: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let _adder = {
            let stream_ref = stream.clone();
            let late_values = late_values.clone();
            let holder = holder.clone();
            stream.events().subscribe(move |_| {
                if holder.borrow().is_empty() {
                    let late_values = late_values.clone();
                    let sub = stream_ref
                        .events()
                        .subscribe(move |v| late_values.borrow_mut().push(*v));
                    holder.borrow_mut().push(sub);
                }
            })
        };

        stream.fire(&1);
        stream.fire(&2);
        assert_eq!(*late_values.borrow(), vec![2]);
    }

    #[test]
    fn test_lifetime_destroy_unsubscribes_all() {
        let stream = EventStream::<()>::new();
        let count = Rc::new(Cell::new(0));
        let mut lifetime = Lifetime::new();

        for _ in 0..3 {
            let count = count.clone();
            lifetime.add(stream.events().subscribe(move |_| count.set(count.get() + 1)));
        }
        assert_eq!(lifetime.len(), 3);

        stream.fire(&());
        lifetime.destroy();
        stream.fire(&());

        assert!(lifetime.is_empty());
        assert_eq!(count.get(), 3);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn test_variable_value_starts_with_current() {
        let variable = Variable::new(1u32);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _value = {
            let seen = seen.clone();
            variable.value(move |v| seen.borrow_mut().push(*v))
        };
        let changes_seen = Rc::new(RefCell::new(Vec::new()));
        let _changes = {
            let changes_seen = changes_seen.clone();
            variable
                .changes()
                .subscribe(move |v| changes_seen.borrow_mut().push(*v))
        };

        variable.set(2);
        variable.set(3);

        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
        assert_eq!(*changes_seen.borrow(), vec![2, 3]);
        assert_eq!(variable.current(), 3);
    }
}

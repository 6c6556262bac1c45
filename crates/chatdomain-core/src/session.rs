//! A live, authenticated session of one account.
//!
//! The registry only looks at the unread badge of a session; everything else
//! about the connection lives outside this crate.

use std::cell::{Cell, RefCell};
use std::fmt;

use uuid::Uuid;

use crate::reactive::{EventStream, Events, Lifetime, Subscription};

pub type UserId = u64;

pub struct Session {
    id: Uuid,
    user_id: UserId,
    unread_badge: Cell<u32>,
    unread_badge_muted: Cell<bool>,
    unread_badge_changes: EventStream<()>,
    lifetime: RefCell<Lifetime>,
}

impl Session {
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            unread_badge: Cell::new(0),
            unread_badge_muted: Cell::new(false),
            unread_badge_changes: EventStream::new(),
            lifetime: RefCell::new(Lifetime::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn unread_badge(&self) -> u32 {
        self.unread_badge.get()
    }

    pub fn unread_badge_muted(&self) -> bool {
        self.unread_badge_muted.get()
    }

    pub fn set_unread_badge(&self, count: u32, muted: bool) {
        if self.unread_badge.get() == count && self.unread_badge_muted.get() == muted {
            return;
        }
        self.unread_badge.set(count);
        self.unread_badge_muted.set(muted);
        self.unread_badge_changes.fire(&());
    }

    /// Re-announce the current badge without changing it.
    pub fn notify_unread_badge_changed(&self) {
        self.unread_badge_changes.fire(&());
    }

    pub fn unread_badge_changes(&self) -> Events<()> {
        self.unread_badge_changes.events()
    }

    /// Keep `subscription` alive exactly as long as this session.
    pub fn attach(&self, subscription: Subscription) {
        self.lifetime.borrow_mut().add(subscription);
    }

    pub(crate) fn destroy(&self) {
        let lifetime = std::mem::take(&mut *self.lifetime.borrow_mut());
        drop(lifetime);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("unread_badge", &self.unread_badge.get())
            .field("unread_badge_muted", &self.unread_badge_muted.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_set_unread_badge_fires_only_on_change() {
        let session = Session::new(42);
        let fired = Rc::new(Cell::new(0));
        let _sub = {
            let fired = fired.clone();
            session
                .unread_badge_changes()
                .subscribe(move |_| fired.set(fired.get() + 1))
        };

        session.set_unread_badge(3, false);
        session.set_unread_badge(3, false);
        session.set_unread_badge(3, true);

        assert_eq!(fired.get(), 2);
        assert_eq!(session.unread_badge(), 3);
        assert!(session.unread_badge_muted());

        session.notify_unread_badge_changed();
        assert_eq!(fired.get(), 3);
    }

    #[test]
    fn test_destroy_drops_attached_subscriptions() {
        let session = Session::new(1);
        let fired = Rc::new(Cell::new(0));
        let sub = {
            let fired = fired.clone();
            session
                .unread_badge_changes()
                .subscribe(move |_| fired.set(fired.get() + 1))
        };
        session.attach(sub);

        session.destroy();
        session.set_unread_badge(5, false);

        assert_eq!(fired.get(), 0);
    }
}

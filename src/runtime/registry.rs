use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use crate::model::widget::WidgetId;

/// One mount-state transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountEvent {
    pub id: WidgetId,
    pub mounted: bool,
}

type Listener = Rc<dyn Fn(&MountEvent)>;

#[derive(Default)]
struct Inner {
    mounted: RefCell<BTreeSet<WidgetId>>,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_listener: RefCell<u64>,
}

/// Set of currently mounted widget ids plus synchronous change listeners.
///
/// Created by the application and handed to the reconciler; clones share state. Listeners see
/// the set already updated when they run, and each notification goes to the listeners that were
/// subscribed when it started.
#[derive(Clone, Default)]
pub struct MountRegistry {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for MountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountRegistry")
            .field("mounted", &self.inner.mounted.borrow())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

/// Handle returned by [`MountRegistry::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Inner>,
    key: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.listeners.borrow_mut().retain(|(k, _)| *k != self.key);
        }
    }
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_mounted(&self, id: &WidgetId) {
        self.inner.mounted.borrow_mut().insert(id.clone());
        self.notify(MountEvent {
            id: id.clone(),
            mounted: true,
        });
    }

    pub fn mark_unmounted(&self, id: &WidgetId) {
        self.inner.mounted.borrow_mut().remove(id);
        self.notify(MountEvent {
            id: id.clone(),
            mounted: false,
        });
    }

    pub fn is_mounted(&self, id: &str) -> bool {
        self.inner.mounted.borrow().contains(id)
    }

    pub fn mounted_ids(&self) -> Vec<WidgetId> {
        self.inner.mounted.borrow().iter().cloned().collect()
    }

    pub fn subscribe(&self, listener: impl Fn(&MountEvent) + 'static) -> Subscription {
        let key = {
            let mut next = self.inner.next_listener.borrow_mut();
            *next += 1;
            *next
        };
        self.inner
            .listeners
            .borrow_mut()
            .push((key, Rc::new(listener)));
        Subscription {
            registry: Rc::downgrade(&self.inner),
            key,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn notify(&self, event: MountEvent) {
        let snapshot: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn marks_update_set_before_listeners_run() {
        let reg = MountRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (r, s) = (reg.clone(), seen.clone());
        let _sub = reg.subscribe(move |ev| {
            s.borrow_mut()
                .push((ev.id.clone(), ev.mounted, r.is_mounted(ev.id.as_str())));
        });

        let id = WidgetId::from("clock");
        reg.mark_mounted(&id);
        reg.mark_unmounted(&id);

        assert_eq!(
            *seen.borrow(),
            vec![(id.clone(), true, true), (id.clone(), false, false)]
        );
        assert!(reg.mounted_ids().is_empty());
    }

    #[test]
    fn listeners_run_once_in_subscription_order() {
        let reg = MountRegistry::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let o = order.clone();
            let _ = reg.subscribe(move |_| o.borrow_mut().push(n));
        }
        reg.mark_mounted(&"a".into());
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn notification_uses_subscriber_snapshot() {
        let reg = MountRegistry::new();
        let late_calls = Rc::new(Cell::new(0));
        let pending: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        // The second listener unsubscribes itself and is still called for this event; the
        // listener added mid-notification is not.
        let (r, late) = (reg.clone(), late_calls.clone());
        let _first = reg.subscribe(move |_| {
            let l = late.clone();
            let _ = r.subscribe(move |_| l.set(l.get() + 1));
        });
        let second_calls = Rc::new(Cell::new(0));
        let (p, sc) = (pending.clone(), second_calls.clone());
        let second = reg.subscribe(move |_| {
            sc.set(sc.get() + 1);
            if let Some(sub) = p.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        *pending.borrow_mut() = Some(second);

        reg.mark_mounted(&"a".into());
        assert_eq!(second_calls.get(), 1);
        assert_eq!(late_calls.get(), 0);

        reg.mark_unmounted(&"a".into());
        assert_eq!(second_calls.get(), 1);
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn unsubscribe_after_registry_dropped_is_harmless() {
        let reg = MountRegistry::new();
        let sub = reg.subscribe(|_| {});
        assert_eq!(reg.listener_count(), 1);
        drop(reg);
        sub.unsubscribe();
    }
}

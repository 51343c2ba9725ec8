use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

/// Identifies a listener registered with [`EventEmitter::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Rc<dyn Fn(&E)>;

/// Single threaded publish/subscribe channel.
///
/// Adapters and the manager each own one rather than being one. Listeners
/// may subscribe or unsubscribe (themselves or others) while an event is
/// being dispatched: a listener removed during dispatch is not called
/// afterwards, a listener added during dispatch only sees the next event.
pub struct EventEmitter<E> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn on(&self, listener: impl Fn(&E) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    /// returns `false` if the listener was not (or no longer) registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<(ListenerId, Listener<E>)> = self.listeners.borrow().clone();

        for (id, listener) in snapshot {
            if self.is_registered(id) {
                listener(event);
            }
        }
    }

    pub fn is_registered(&self, id: ListenerId) -> bool {
        self.listeners
            .borrow()
            .iter()
            .any(|(listener_id, _)| *listener_id == id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Undoes a registration (timer, DOM listener, wallet subscription) when
/// dropped or explicitly cancelled.
#[must_use = "dropping a `Cancel` immediately undoes the registration"]
pub struct Cancel(Option<Box<dyn FnOnce()>>);

impl Cancel {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(cancel)))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    pub fn cancel(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl Drop for Cancel {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Cancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cancel").field(&self.0.is_some()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_reaches_every_listener() {
        let emitter = EventEmitter::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let a = seen.clone();
        emitter.on(move |event| a.borrow_mut().push(("a", *event)));
        let b = seen.clone();
        let id = emitter.on(move |event| b.borrow_mut().push(("b", *event)));

        emitter.emit(&1);
        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        emitter.emit(&2);

        assert_eq!(*seen.borrow(), vec![("a", 1), ("b", 1), ("a", 2)]);
    }

    #[test]
    fn listener_removed_during_dispatch_is_skipped() {
        let emitter = Rc::new(EventEmitter::<()>::new());
        let calls = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(None));

        let remove = second.clone();
        let weak = Rc::downgrade(&emitter);
        emitter.on(move |_| {
            if let (Some(emitter), Some(id)) = (weak.upgrade(), remove.get()) {
                emitter.off(id);
            }
        });
        let counter = calls.clone();
        second.set(Some(emitter.on(move |_| counter.set(counter.get() + 1))));

        emitter.emit(&());
        assert_eq!(calls.get(), 0);
        assert_eq!(emitter.listener_count(), 1);
    }

    #[test]
    fn cancel_runs_once() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let cancel = Cancel::new(move || counter.set(counter.get() + 1));
        cancel.cancel();
        assert_eq!(runs.get(), 1);

        let counter = runs.clone();
        drop(Cancel::new(move || counter.set(counter.get() + 1)));
        assert_eq!(runs.get(), 2);
    }
}

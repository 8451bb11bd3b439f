//! Proxy event observers.

use std::cell::RefCell;
use std::rc::Rc;

use graft_types::ProxyEvent;

/// Receiver of proxy events.
///
/// Called synchronously, in emission order. Observers can't reach back into
/// the model from inside `notify`.
pub trait ProxyObserver {
    fn notify(&mut self, event: &ProxyEvent);
}

impl<F> ProxyObserver for F
where
    F: FnMut(&ProxyEvent),
{
    fn notify(&mut self, event: &ProxyEvent) {
        self(event)
    }
}

/// Shared recording of every event emitted, for tests and debugging.
///
/// Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<ProxyEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer that appends to this log.
    pub fn recorder(&self) -> impl FnMut(&ProxyEvent) + 'static {
        let events = Rc::clone(&self.events);
        move |event: &ProxyEvent| events.borrow_mut().push(event.clone())
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<ProxyEvent> {
        self.events.borrow().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<ProxyEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// How many recorded events have the given [`ProxyEvent::kind`].
    pub fn count(&self, kind: &str) -> usize {
        self.events.borrow().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

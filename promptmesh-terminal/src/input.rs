//! Window-level listener registry for pointer and resize events.
//!
//! The terminal shell translates backend events into [`PointerEvent`]s and
//! dispatches them here; viewer sessions subscribe and must unsubscribe on
//! disposal.

use std::cell::RefCell;
use std::rc::Rc;

/// Pointer event in surface-independent cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up { x: f32, y: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type PointerListener = Rc<RefCell<dyn FnMut(&PointerEvent)>>;
type ResizeListener = Rc<RefCell<dyn FnMut()>>;

#[derive(Default)]
struct HubInner {
    next_id: u64,
    pointer: Vec<(ListenerId, PointerListener)>,
    resize: Vec<(ListenerId, ResizeListener)>,
}

impl HubInner {
    fn next_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}

#[derive(Clone, Default)]
pub struct InputHub {
    inner: Rc<RefCell<HubInner>>,
}

impl InputHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pointer_listener(&self, listener: impl FnMut(&PointerEvent) + 'static) -> ListenerId {
        let listener: PointerListener = Rc::new(RefCell::new(listener));
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id();
        inner.pointer.push((id, listener));
        id
    }

    pub fn add_resize_listener(&self, listener: impl FnMut() + 'static) -> ListenerId {
        let listener: ResizeListener = Rc::new(RefCell::new(listener));
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id();
        inner.resize.push((id, listener));
        id
    }

    /// Remove a listener of either kind. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.pointer.len() + inner.resize.len();
        inner.pointer.retain(|(l, _)| *l != id);
        inner.resize.retain(|(l, _)| *l != id);
        inner.pointer.len() + inner.resize.len() != before
    }

    pub fn pointer_listeners(&self) -> usize {
        self.inner.borrow().pointer.len()
    }

    pub fn resize_listeners(&self) -> usize {
        self.inner.borrow().resize.len()
    }

    pub fn dispatch_pointer(&self, event: PointerEvent) {
        // Snapshot first so listeners may add or remove listeners.
        let listeners: Vec<_> = self
            .inner
            .borrow()
            .pointer
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            (&mut *listener.borrow_mut())(&event);
        }
    }

    pub fn dispatch_resize(&self) {
        let listeners: Vec<_> = self
            .inner
            .borrow()
            .resize
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            (&mut *listener.borrow_mut())();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_dispatch_and_remove() {
        let hub = InputHub::new();
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        let id = hub.add_pointer_listener(move |_| s.set(s.get() + 1));
        let resized = Rc::new(Cell::new(false));
        let r = resized.clone();
        let resize_id = hub.add_resize_listener(move || r.set(true));

        hub.dispatch_pointer(PointerEvent::Down { x: 1.0, y: 1.0 });
        hub.dispatch_resize();
        assert_eq!(seen.get(), 1);
        assert!(resized.get());

        assert!(hub.remove(id));
        assert!(!hub.remove(id));
        assert!(hub.remove(resize_id));
        hub.dispatch_pointer(PointerEvent::Up { x: 1.0, y: 1.0 });
        assert_eq!(seen.get(), 1);
        assert_eq!(hub.pointer_listeners(), 0);
        assert_eq!(hub.resize_listeners(), 0);
    }
}

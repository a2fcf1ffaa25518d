//! Drag-to-rotate input for a viewer session.

use std::cell::RefCell;
use std::rc::Rc;

use promptmesh_core::RotationState;
use tracing::trace;

use crate::input::{InputHub, ListenerId, PointerEvent};
use crate::surface::{MountId, MountTarget};

/// Radians of rotation per cell of pointer travel.
pub const DEFAULT_SENSITIVITY: f32 = 0.01;

/// Translates pointer drags into target rotation updates.
pub struct InteractionController {
    mount: MountTarget,
    rotation: Rc<RefCell<RotationState>>,
    sensitivity: f32,
    last: Option<(f32, f32)>,
}

impl InteractionController {
    pub fn new(mount: MountTarget, rotation: Rc<RefCell<RotationState>>, sensitivity: f32) -> Self {
        Self {
            mount,
            rotation,
            sensitivity,
            last: None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.last.is_some()
    }

    /// `target` is the mount the event landed on, if any.
    pub fn handle(&mut self, event: &PointerEvent, target: Option<MountId>) {
        match *event {
            PointerEvent::Down { x, y } => {
                if target == Some(self.mount.id()) {
                    self.last = Some((x, y));
                }
            }
            PointerEvent::Move { x, y } => {
                let Some((last_x, last_y)) = self.last else {
                    return;
                };
                let (dx, dy) = (x - last_x, y - last_y);
                self.rotation
                    .borrow_mut()
                    .nudge_target(dy * self.sensitivity, dx * self.sensitivity);
                self.last = Some((x, y));
                trace!(target: "controls", dx, dy, "drag");
            }
            // Released anywhere, not only over the surface.
            PointerEvent::Up { .. } => self.last = None,
        }
    }
}

/// Live subscription of a controller on the input hub.
pub struct ControllerBinding {
    hub: InputHub,
    listener: Option<ListenerId>,
}

impl ControllerBinding {
    /// Subscribe `controller`. Down events are routed to it only when
    /// `resolve_target` says they landed on its mount.
    pub fn attach(
        hub: &InputHub,
        mut controller: InteractionController,
        resolve_target: impl Fn(f32, f32) -> Option<MountId> + 'static,
    ) -> Self {
        let listener = hub.add_pointer_listener(move |event| {
            let target = match *event {
                PointerEvent::Down { x, y } => resolve_target(x, y),
                _ => None,
            };
            controller.handle(event, target);
        });
        Self {
            hub: hub.clone(),
            listener: Some(listener),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    pub fn detach(&mut self) {
        if let Some(id) = self.listener.take() {
            self.hub.remove(id);
        }
    }
}

impl Drop for ControllerBinding {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Rect;

    fn controller() -> (InteractionController, Rc<RefCell<RotationState>>, MountId) {
        let mount = MountTarget::new("inline", Rect::new(0, 0, 200, 100));
        let id = mount.id();
        let rotation = Rc::new(RefCell::new(RotationState::zero()));
        (
            InteractionController::new(mount, rotation.clone(), DEFAULT_SENSITIVITY),
            rotation,
            id,
        )
    }

    #[test]
    fn test_horizontal_drag_sets_yaw() {
        let (mut c, rotation, id) = controller();
        c.handle(&PointerEvent::Down { x: 10.0, y: 10.0 }, Some(id));
        c.handle(&PointerEvent::Move { x: 60.0, y: 10.0 }, None);
        c.handle(&PointerEvent::Move { x: 110.0, y: 10.0 }, None);
        c.handle(&PointerEvent::Up { x: 110.0, y: 10.0 }, None);

        let r = *rotation.borrow();
        assert!((r.target_y - 1.0).abs() < 1e-6);
        assert_eq!(r.target_x, 0.0);
        assert_eq!(r.current_y, 0.0);
        assert!(!c.is_dragging());
    }

    #[test]
    fn test_vertical_drag_sets_pitch() {
        let (mut c, rotation, id) = controller();
        c.handle(&PointerEvent::Down { x: 10.0, y: 50.0 }, Some(id));
        c.handle(&PointerEvent::Move { x: 10.0, y: 30.0 }, None);
        assert!((rotation.borrow().target_x + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_moves_without_press_are_ignored() {
        let (mut c, rotation, _) = controller();
        c.handle(&PointerEvent::Down { x: 10.0, y: 10.0 }, None);
        c.handle(&PointerEvent::Move { x: 90.0, y: 90.0 }, None);
        assert_eq!(*rotation.borrow(), RotationState::zero());
    }

    #[test]
    fn test_binding_detaches_listener() {
        let hub = InputHub::new();
        let (c, _, _) = controller();
        let mut binding = ControllerBinding::attach(&hub, c, |_, _| None);
        assert_eq!(hub.pointer_listeners(), 1);
        binding.detach();
        assert_eq!(hub.pointer_listeners(), 0);
        assert!(!binding.is_attached());
    }
}

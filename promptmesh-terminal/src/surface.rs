//! Mount targets (page regions) and the drawing surfaces attached to them.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::renderer::AsciiRenderer;
use crate::scene::Scene;

/// Region of the terminal in cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x as f32
            && y >= self.y as f32
            && x < self.x as f32 + self.width as f32
            && y < self.y as f32 + self.height as f32
    }

    /// Centered sub-rectangle covering `percent` of each dimension.
    pub fn centered(&self, percent: u16) -> Self {
        let width = (self.width as u32 * percent.min(100) as u32 / 100) as u16;
        let height = (self.height as u32 * percent.min(100) as u32 / 100) as u16;
        Self {
            x: self.x + (self.width - width) / 2,
            y: self.y + (self.height - height) / 2,
            width,
            height,
        }
    }
}

/// A rendering context: frame buffer plus its lifecycle flag.
pub struct Surface {
    renderer: AsciiRenderer,
    released: bool,
    frames: u64,
}

pub type SharedSurface = Rc<RefCell<Surface>>;

impl Surface {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            renderer: AsciiRenderer::new(width as usize, height as usize),
            released: false,
            frames: 0,
        }
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        if self.released {
            return;
        }
        self.renderer.resize(width as usize, height as usize);
    }

    /// Draw one frame. Returns `false` once the surface has been released.
    pub fn render(&mut self, scene: &Scene) -> bool {
        if self.released {
            return false;
        }
        self.renderer.render_scene(scene);
        self.frames += 1;
        true
    }

    /// Free the frame buffer; further renders are refused.
    pub fn release(&mut self) {
        self.released = true;
        self.renderer = AsciiRenderer::new(0, 0);
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn renderer(&self) -> &AsciiRenderer {
        &self.renderer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MountId(u32);

static NEXT_MOUNT: AtomicU32 = AtomicU32::new(1);

struct MountSlot {
    id: MountId,
    label: String,
    layer: u8,
    rect: Rect,
    attached: bool,
    content: Option<SharedSurface>,
}

/// Handle to a page region that can host at most one drawing surface.
#[derive(Clone)]
pub struct MountTarget {
    inner: Rc<RefCell<MountSlot>>,
}

impl MountTarget {
    pub fn new(label: impl Into<String>, rect: Rect) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MountSlot {
                id: MountId(NEXT_MOUNT.fetch_add(1, Ordering::Relaxed)),
                label: label.into(),
                layer: 0,
                rect,
                attached: true,
                content: None,
            })),
        }
    }

    /// Stacking layer; higher layers receive pointer presses first.
    pub fn with_layer(self, layer: u8) -> Self {
        self.inner.borrow_mut().layer = layer;
        self
    }

    pub fn layer(&self) -> u8 {
        self.inner.borrow().layer
    }

    pub fn id(&self) -> MountId {
        self.inner.borrow().id
    }

    pub fn label(&self) -> String {
        self.inner.borrow().label.clone()
    }

    pub fn rect(&self) -> Rect {
        self.inner.borrow().rect
    }

    pub fn set_rect(&self, rect: Rect) {
        self.inner.borrow_mut().rect = rect;
    }

    pub fn is_attached(&self) -> bool {
        self.inner.borrow().attached
    }

    /// Attached and with a non-empty area.
    pub fn is_drawable(&self) -> bool {
        let slot = self.inner.borrow();
        slot.attached && !slot.rect.is_empty()
    }

    pub fn attach(&self) {
        self.inner.borrow_mut().attached = true;
    }

    /// Remove the region from the page, releasing whatever was drawn into it.
    pub fn detach(&self) {
        self.inner.borrow_mut().attached = false;
        self.clear();
    }

    /// Release and drop any attached surface. Returns whether one was present.
    pub fn clear(&self) -> bool {
        let previous = self.inner.borrow_mut().content.take();
        match previous {
            Some(surface) => {
                surface.borrow_mut().release();
                true
            }
            None => false,
        }
    }

    pub fn attach_surface(&self, surface: SharedSurface) {
        self.clear();
        self.inner.borrow_mut().content = Some(surface);
    }

    /// Drop `surface` if it is the one currently attached.
    pub fn detach_surface(&self, surface: &SharedSurface) -> bool {
        let mut slot = self.inner.borrow_mut();
        if slot
            .content
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, surface))
        {
            slot.content = None;
            true
        } else {
            false
        }
    }

    pub fn content(&self) -> Option<SharedSurface> {
        self.inner.borrow().content.clone()
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        let slot = self.inner.borrow();
        slot.attached && slot.rect.contains(x, y)
    }
}

/// Mounts known to the page, used to decide which one a press landed on.
#[derive(Clone, Default)]
pub struct MountRegistry {
    mounts: Rc<RefCell<Vec<MountTarget>>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `mount`, forgetting any mounts that have been detached since.
    pub fn register(&self, mount: &MountTarget) {
        let id = mount.id();
        let mut mounts = self.mounts.borrow_mut();
        mounts.retain(|m| m.is_attached() && m.id() != id);
        mounts.push(mount.clone());
    }

    pub fn len(&self) -> usize {
        self.mounts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest-layer attached mount containing the point; ties go to the
    /// most recently registered.
    pub fn topmost_at(&self, x: f32, y: f32) -> Option<MountId> {
        self.mounts
            .borrow()
            .iter()
            .filter(|m| m.contains(x, y))
            .enumerate()
            .max_by_key(|(order, m)| (m.layer(), *order))
            .map(|(_, m)| m.id())
    }
}

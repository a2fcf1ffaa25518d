//! One live, interactive rendering of a model on one mount target.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use promptmesh_core::{RotationState, DEFAULT_SMOOTHING};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::controller::{ControllerBinding, InteractionController, DEFAULT_SENSITIVITY};
use crate::frame::{FrameLoop, FrameScheduler};
use crate::input::{InputHub, ListenerId};
use crate::model::LoadedModel;
use crate::renderer::CELL_ASPECT;
use crate::scene::{Scene, SceneObject, SceneSettings};
use crate::surface::{MountRegistry, MountTarget, SharedSurface, Surface};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewerError {
    #[error("mount target `{mount}` is not attached or has no drawable area")]
    NoMount { mount: String },
}

/// Tunables applied to every session.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerSettings {
    pub sensitivity: f32,
    pub smoothing: f32,
    pub scene: SceneSettings,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            smoothing: DEFAULT_SMOOTHING,
            scene: SceneSettings::default(),
        }
    }
}

/// Page-wide services a session subscribes to.
#[derive(Clone, Default)]
pub struct ViewerContext {
    pub scheduler: FrameScheduler,
    pub input: InputHub,
    pub mounts: MountRegistry,
    pub settings: ViewerSettings,
}

impl ViewerContext {
    pub fn new(settings: ViewerSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }
}

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

pub struct ViewerSession {
    id: u64,
    mount: MountTarget,
    input: InputHub,
    rotation: Rc<RefCell<RotationState>>,
    scene: Rc<RefCell<Scene>>,
    surface: Option<SharedSurface>,
    resize_listener: Option<ListenerId>,
    controller: Option<ControllerBinding>,
    frame_loop: Option<FrameLoop>,
    fallback: bool,
    disposed: bool,
}

impl ViewerSession {
    /// Bind a new session to `mount`, replacing whatever was drawn there.
    pub fn open(mount: &MountTarget, model: &LoadedModel, ctx: &ViewerContext) -> Result<Self, ViewerError> {
        if !mount.is_drawable() {
            return Err(ViewerError::NoMount {
                mount: mount.label(),
            });
        }
        let id = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);

        if mount.clear() {
            warn!(target: "session", session = id, mount = %mount.label(), "mount still held a surface; released it");
        }

        let (object, fallback) = build_object(model, id);
        let rect = mount.rect();
        let mut scene = Scene::new(object, &ctx.settings.scene);
        scene.set_viewport(rect.width as f32 * CELL_ASPECT, rect.height as f32);

        // Everything below is owned by `session`, so an early return unwinds
        // it through `Drop`.
        let mut session = Self {
            id,
            mount: mount.clone(),
            input: ctx.input.clone(),
            rotation: Rc::new(RefCell::new(RotationState::zero())),
            scene: Rc::new(RefCell::new(scene)),
            surface: None,
            resize_listener: None,
            controller: None,
            frame_loop: None,
            fallback,
            disposed: false,
        };

        let surface: SharedSurface = Rc::new(RefCell::new(Surface::new(rect.width, rect.height)));
        mount.attach_surface(surface.clone());
        session.surface = Some(surface.clone());

        session.resize_listener = Some(ctx.input.add_resize_listener({
            let mount = mount.clone();
            let scene = session.scene.clone();
            let surface = surface.clone();
            move || {
                let rect = mount.rect();
                let mut surface = surface.borrow_mut();
                surface.resize(rect.width, rect.height);
                let (width, height) = surface.renderer().viewport_aspect();
                scene.borrow_mut().set_viewport(width, height);
            }
        }));

        ctx.mounts.register(mount);
        let mounts = ctx.mounts.clone();
        session.controller = Some(ControllerBinding::attach(
            &ctx.input,
            InteractionController::new(mount.clone(), session.rotation.clone(), ctx.settings.sensitivity),
            move |x, y| mounts.topmost_at(x, y),
        ));

        session.frame_loop = Some(FrameLoop::start(&ctx.scheduler, {
            let rotation = session.rotation.clone();
            let scene = session.scene.clone();
            let smoothing = ctx.settings.smoothing;
            move || {
                let mut rotation = rotation.borrow_mut();
                rotation.advance(smoothing);
                let mut scene = scene.borrow_mut();
                scene.object.set_rotation(&rotation);
                // A released surface never draws again.
                surface.borrow_mut().render(&scene)
            }
        }));

        info!(
            target: "session",
            session = id,
            mount = %mount.label(),
            width = rect.width,
            height = rect.height,
            fallback,
            "viewer session opened"
        );
        Ok(session)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mount(&self) -> &MountTarget {
        &self.mount
    }

    /// Snapshot of the session's rotation.
    pub fn rotation(&self) -> RotationState {
        *self.rotation.borrow()
    }

    /// Whether the fallback shape is displayed instead of the asset.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Whether the frame loop is still scheduled.
    pub fn is_rendering(&self) -> bool {
        self.frame_loop.as_ref().is_some_and(FrameLoop::is_running)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.surface
            .as_ref()
            .map_or(0, |surface| surface.borrow().frames_rendered())
    }

    pub fn scene(&self) -> std::cell::Ref<'_, Scene> {
        self.scene.borrow()
    }

    /// Tear the session down. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(id) = self.resize_listener.take() {
            self.input.remove(id);
        }
        if let Some(mut controller) = self.controller.take() {
            controller.detach();
        }
        if let Some(frame_loop) = self.frame_loop.take() {
            frame_loop.stop();
        }
        if let Some(surface) = self.surface.take() {
            self.mount.detach_surface(&surface);
            surface.borrow_mut().release();
        }
        debug!(target: "session", session = self.id, mount = %self.mount.label(), "viewer session disposed");
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn build_object(model: &LoadedModel, session: u64) -> (SceneObject, bool) {
    match model.decoded() {
        Ok(decoded) => match SceneObject::build(decoded.mesh.clone(), decoded.transform) {
            Ok(object) => (object, false),
            Err(err) => {
                warn!(
                    target: "session",
                    session,
                    url = %model.asset().source_url,
                    error = %err,
                    "geometry rejected; showing fallback cube"
                );
                (SceneObject::fallback_cube(), true)
            }
        },
        Err(err) => {
            warn!(
                target: "session",
                session,
                url = %model.asset().source_url,
                error = %err,
                "decode failed; showing fallback cube"
            );
            (SceneObject::fallback_cube(), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::PointerEvent;
    use crate::model::ModelAsset;
    use crate::scene::ObjectKind;
    use crate::surface::Rect;

    const TRIANGLE: &str = "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";

    fn model(raw: &str) -> LoadedModel {
        LoadedModel::from_asset(ModelAsset {
            source_url: "file:///tmp/model.ply".into(),
            raw_text: raw.into(),
        })
    }

    #[test]
    fn test_open_requires_drawable_mount() {
        let ctx = ViewerContext::default();
        let mount = MountTarget::new("modal", Rect::new(0, 0, 40, 20));
        mount.detach();
        let err = ViewerSession::open(&mount, &model(TRIANGLE), &ctx).err();
        assert_eq!(err, Some(ViewerError::NoMount { mount: "modal".into() }));
        assert_eq!(ctx.input.pointer_listeners(), 0);
        assert_eq!(ctx.scheduler.pending(), 0);
    }

    #[test]
    fn test_frames_render_until_disposed() {
        let ctx = ViewerContext::default();
        let mount = MountTarget::new("inline", Rect::new(0, 0, 40, 20));
        let mut session = ViewerSession::open(&mount, &model(TRIANGLE), &ctx).unwrap();
        assert!(!session.is_fallback());
        assert_eq!(session.scene().object.kind, ObjectKind::Solid);

        ctx.scheduler.run_frame();
        ctx.scheduler.run_frame();
        assert_eq!(session.frames_rendered(), 2);

        session.dispose();
        session.dispose();
        assert!(session.is_disposed());
        assert_eq!(ctx.scheduler.run_frame(), 0);
        assert_eq!(ctx.input.pointer_listeners(), 0);
        assert_eq!(ctx.input.resize_listeners(), 0);
        assert!(mount.content().is_none());
    }

    #[test]
    fn test_in_flight_frame_after_dispose_does_not_render() {
        let ctx = ViewerContext::default();
        let mount = MountTarget::new("inline", Rect::new(0, 0, 40, 20));
        let mut session = ViewerSession::open(&mount, &model(TRIANGLE), &ctx).unwrap();
        let surface = mount.content().unwrap();

        let in_flight = ctx.scheduler.take_pending();
        session.dispose();
        for callback in in_flight {
            callback();
        }
        assert_eq!(surface.borrow().frames_rendered(), 0);
        assert!(surface.borrow().is_released());
        assert_eq!(ctx.scheduler.pending(), 0);
    }

    #[test]
    fn test_decode_failure_shows_fallback() {
        let ctx = ViewerContext::default();
        let mount = MountTarget::new("inline", Rect::new(0, 0, 40, 20));
        let broken = TRIANGLE.replace("element vertex 3", "element vertex 5");
        let session = ViewerSession::open(&mount, &model(&broken), &ctx).unwrap();
        assert!(session.is_fallback());
        assert_eq!(session.scene().object.mesh.triangles.len(), 12);
    }

    #[test]
    fn test_empty_mesh_shows_fallback() {
        let ctx = ViewerContext::default();
        let mount = MountTarget::new("inline", Rect::new(0, 0, 40, 20));
        let empty = "ply\nformat ascii 1.0\nelement vertex 0\nend_header\n";
        let session = ViewerSession::open(&mount, &model(empty), &ctx).unwrap();
        assert!(session.is_fallback());
    }

    #[test]
    fn test_sessions_rotate_independently() {
        let ctx = ViewerContext::default();
        let shared = model(TRIANGLE);
        let inline = MountTarget::new("inline", Rect::new(0, 0, 80, 24));
        let modal = MountTarget::new("modal", Rect::new(20, 6, 40, 12)).with_layer(1);
        let inline_session = ViewerSession::open(&inline, &shared, &ctx).unwrap();
        let modal_session = ViewerSession::open(&modal, &shared, &ctx).unwrap();

        // Press lands on the inline panel outside the modal.
        ctx.input.dispatch_pointer(PointerEvent::Down { x: 2.0, y: 2.0 });
        ctx.input.dispatch_pointer(PointerEvent::Move { x: 102.0, y: 2.0 });
        ctx.input.dispatch_pointer(PointerEvent::Up { x: 102.0, y: 2.0 });
        ctx.scheduler.run_frame();

        let dragged = inline_session.rotation();
        assert!((dragged.target_y - 1.0).abs() < 1e-6);
        assert!((dragged.current_y - 0.1).abs() < 1e-6);
        assert_eq!(modal_session.rotation(), RotationState::zero());

        // A press inside the modal area goes to the modal only.
        ctx.input.dispatch_pointer(PointerEvent::Down { x: 30.0, y: 10.0 });
        ctx.input.dispatch_pointer(PointerEvent::Move { x: 30.0, y: 20.0 });
        ctx.input.dispatch_pointer(PointerEvent::Up { x: 30.0, y: 20.0 });
        assert!((modal_session.rotation().target_x - 0.1).abs() < 1e-6);
        assert_eq!(inline_session.rotation().target_x, 0.0);
    }

    #[test]
    fn test_reopen_on_same_mount_releases_previous() {
        let ctx = ViewerContext::default();
        let mount = MountTarget::new("inline", Rect::new(0, 0, 40, 20));
        let shared = model(TRIANGLE);
        let first = ViewerSession::open(&mount, &shared, &ctx).unwrap();
        let first_surface = mount.content().unwrap();
        let second = ViewerSession::open(&mount, &shared, &ctx).unwrap();

        assert!(first_surface.borrow().is_released());
        ctx.scheduler.run_frame();
        assert_eq!(first.frames_rendered(), 0);
        assert_eq!(second.frames_rendered(), 1);

        // The replaced session's loop ends once it sees its released surface.
        assert!(!first.is_rendering());
        assert!(second.is_rendering());
        assert_eq!(ctx.scheduler.pending(), 1);

        // Dropping the stale session must not detach the new surface.
        drop(first);
        assert!(mount.content().is_some());
    }

    #[test]
    fn test_resize_updates_surface_and_camera() {
        let ctx = ViewerContext::default();
        let mount = MountTarget::new("inline", Rect::new(0, 0, 40, 20));
        let session = ViewerSession::open(&mount, &model(TRIANGLE), &ctx).unwrap();
        mount.set_rect(Rect::new(0, 0, 100, 20));
        ctx.input.dispatch_resize();

        let surface = mount.content().unwrap();
        assert_eq!(surface.borrow().renderer().width(), 100);
        assert!((session.scene().camera.aspect - 2.5).abs() < 1e-6);
    }
}

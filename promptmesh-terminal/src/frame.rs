//! Frame scheduling for viewer sessions.
//!
//! The host drives [`FrameScheduler::run_frame`] once per display tick. Work
//! requested during a frame runs on the next one, so a [`FrameLoop`] is a
//! callback that keeps rescheduling itself until its token is cancelled or
//! the step reports that it is finished.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Identifier of one pending frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequestId(u64);

type FrameCallback = Box<dyn FnOnce()>;

#[derive(Default)]
struct SchedulerInner {
    next_id: u64,
    pending: Vec<(FrameRequestId, FrameCallback)>,
}

/// Single-threaded queue of callbacks to run on the next frame.
#[derive(Clone, Default)]
pub struct FrameScheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_frame(&self, callback: impl FnOnce() + 'static) -> FrameRequestId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = FrameRequestId(inner.next_id);
        inner.pending.push((id, Box::new(callback)));
        id
    }

    /// Drop a pending callback. Returns `false` if it already ran or was
    /// already taken for the current frame.
    pub fn cancel_frame(&self, id: FrameRequestId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.pending.len();
        inner.pending.retain(|(pending, _)| *pending != id);
        inner.pending.len() != before
    }

    pub fn pending(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Take every callback queued for this frame. Once taken they are in
    /// flight and can no longer be cancelled through the scheduler.
    pub(crate) fn take_pending(&self) -> Vec<FrameCallback> {
        std::mem::take(&mut self.inner.borrow_mut().pending)
            .into_iter()
            .map(|(_, callback)| callback)
            .collect()
    }

    /// Run all callbacks queued before this call; returns how many ran.
    pub fn run_frame(&self) -> usize {
        let batch = self.take_pending();
        let count = batch.len();
        for callback in batch {
            callback();
        }
        count
    }
}

/// Cancellation flag shared between a repeating task and its owner.
#[derive(Clone, Default, Debug)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

type FrameStep = Rc<RefCell<dyn FnMut() -> bool>>;

/// A per-frame step that reschedules itself until stopped.
pub struct FrameLoop {
    scheduler: FrameScheduler,
    token: CancelToken,
    pending: Rc<Cell<Option<FrameRequestId>>>,
}

impl FrameLoop {
    /// `step` runs once per frame; returning `false` ends the loop.
    pub fn start(scheduler: &FrameScheduler, step: impl FnMut() -> bool + 'static) -> Self {
        let frame_loop = Self {
            scheduler: scheduler.clone(),
            token: CancelToken::new(),
            pending: Rc::new(Cell::new(None)),
        };
        let step: FrameStep = Rc::new(RefCell::new(step));
        schedule(
            frame_loop.scheduler.clone(),
            frame_loop.token.clone(),
            frame_loop.pending.clone(),
            step,
        );
        frame_loop
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancel the loop. A callback that is already in flight sees the
    /// cancelled token and returns without running the step.
    pub fn stop(&self) {
        self.token.cancel();
        if let Some(id) = self.pending.take() {
            self.scheduler.cancel_frame(id);
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn schedule(
    scheduler: FrameScheduler,
    token: CancelToken,
    pending: Rc<Cell<Option<FrameRequestId>>>,
    step: FrameStep,
) {
    let next = scheduler.clone();
    let slot = pending.clone();
    let id = scheduler.request_frame(move || {
        slot.set(None);
        if token.is_cancelled() {
            return;
        }
        let keep_going = (&mut *step.borrow_mut())();
        if !keep_going {
            token.cancel();
        }
        // The step itself may have stopped the loop.
        if !token.is_cancelled() {
            schedule(next, token, slot, step);
        }
    });
    pending.set(Some(id));
}

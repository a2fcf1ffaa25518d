//! Generation cycle state machine and ownership of the inline and modal
//! viewer sessions.

use std::time::{Duration, Instant};

use promptmesh_core::TransportError;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::{LoadedModel, ModelAsset};
use crate::service::{GenerationRequest, Prompt};
use crate::session::{ViewerContext, ViewerError, ViewerSession};
use crate::surface::{MountTarget, Rect};

/// Share of the inline area covered by the modal.
const MODAL_PERCENT: u16 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Requesting,
    Ready,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("a generation request is already in progress")]
    RequestPending,

    #[error("no model is loaded")]
    NotReady,

    #[error(transparent)]
    Viewer(#[from] ViewerError),
}

/// Identifies one submission; completions carrying an older ticket are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub ticket: Ticket,
    pub request: GenerationRequest,
}

pub struct SessionCoordinator {
    ctx: ViewerContext,
    inline: MountTarget,
    modal: MountTarget,
    phase: Phase,
    ticket: u64,
    model: Option<LoadedModel>,
    inline_session: Option<ViewerSession>,
    modal_session: Option<ViewerSession>,
    notice: Option<String>,
    auto_reveal: Option<Duration>,
    reveal_at: Option<Instant>,
}

impl SessionCoordinator {
    /// `area` is the region given to the inline viewer; the modal is laid out
    /// inside it but stays detached until opened.
    pub fn new(ctx: ViewerContext, area: Rect) -> Self {
        let inline = MountTarget::new("inline", area);
        let modal = MountTarget::new("modal", area.centered(MODAL_PERCENT)).with_layer(1);
        modal.detach();
        Self {
            ctx,
            inline,
            modal,
            phase: Phase::Idle,
            ticket: 0,
            model: None,
            inline_session: None,
            modal_session: None,
            notice: None,
            auto_reveal: None,
            reveal_at: None,
        }
    }

    /// Open the modal automatically this long after a model becomes ready.
    pub fn with_auto_reveal(mut self, delay: Option<Duration>) -> Self {
        self.auto_reveal = delay;
        self
    }

    pub fn context(&self) -> &ViewerContext {
        &self.ctx
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn current_asset(&self) -> Option<&ModelAsset> {
        self.model.as_ref().map(LoadedModel::asset)
    }

    pub fn inline_mount(&self) -> &MountTarget {
        &self.inline
    }

    pub fn modal_mount(&self) -> &MountTarget {
        &self.modal
    }

    pub fn inline_session(&self) -> Option<&ViewerSession> {
        self.inline_session.as_ref()
    }

    pub fn modal_session(&self) -> Option<&ViewerSession> {
        self.modal_session.as_ref()
    }

    pub fn is_modal_open(&self) -> bool {
        self.modal_session.is_some()
    }

    /// Start a new generation cycle. Every open session is disposed before
    /// the request is handed out.
    pub fn submit(&mut self, text: &str) -> Result<Submission, CoordinatorError> {
        if self.phase == Phase::Requesting {
            return Err(CoordinatorError::RequestPending);
        }
        let prompt = Prompt::new(text).ok_or(CoordinatorError::EmptyPrompt)?;

        self.teardown();
        self.phase = Phase::Requesting;
        self.ticket += 1;
        info!(target: "coordinator", ticket = self.ticket, prompt = prompt.as_str(), "generation requested");
        Ok(Submission {
            ticket: Ticket(self.ticket),
            request: prompt.into(),
        })
    }

    /// Deliver the outcome of a submission. Stale tickets are ignored.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        outcome: Result<ModelAsset, TransportError>,
    ) -> Result<(), CoordinatorError> {
        if ticket.0 != self.ticket || self.phase != Phase::Requesting {
            debug!(target: "coordinator", ticket = ticket.0, current = self.ticket, "ignoring stale completion");
            return Ok(());
        }
        match outcome {
            Ok(asset) => self.load_asset(asset),
            Err(err) => {
                error!(target: "coordinator", ticket = ticket.0, error = %err, "generation failed");
                self.phase = Phase::Failed;
                self.notice = Some(format!("Generation failed: {err}"));
                Ok(())
            }
        }
    }

    /// Make `asset` the current model and open the inline viewer on it.
    /// Also used for assets that did not come from a generation request.
    pub fn load_asset(&mut self, asset: ModelAsset) -> Result<(), CoordinatorError> {
        self.teardown();
        // A pending request can no longer complete into this state.
        self.ticket += 1;

        let model = LoadedModel::from_asset(asset);
        self.notice = model
            .decode_error()
            .map(|err| format!("Could not read model ({err}); showing a placeholder"));
        self.phase = Phase::Ready;

        let model = self.model.insert(model);
        let session = ViewerSession::open(&self.inline, model, &self.ctx)?;
        self.inline_session = Some(session);
        self.reveal_at = self.auto_reveal.map(|delay| Instant::now() + delay);
        Ok(())
    }

    /// Run due deferred work; currently the automatic modal reveal.
    pub fn tick(&mut self, now: Instant) -> Result<(), CoordinatorError> {
        match self.reveal_at {
            Some(at) if now >= at => {
                self.reveal_at = None;
                if self.phase == Phase::Ready && !self.is_modal_open() {
                    self.open_modal()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Open a second, independent session on the current model.
    pub fn open_modal(&mut self) -> Result<(), CoordinatorError> {
        if self.is_modal_open() {
            return Ok(());
        }
        let model = match (&self.model, self.phase) {
            (Some(model), Phase::Ready) => model,
            _ => return Err(CoordinatorError::NotReady),
        };
        self.reveal_at = None;
        self.modal.attach();
        match ViewerSession::open(&self.modal, model, &self.ctx) {
            Ok(session) => {
                self.modal_session = Some(session);
                Ok(())
            }
            Err(err) => {
                self.modal.detach();
                Err(err.into())
            }
        }
    }

    pub fn close_modal(&mut self) {
        if let Some(mut session) = self.modal_session.take() {
            session.dispose();
        }
        self.modal.detach();
    }

    pub fn toggle_modal(&mut self) -> Result<(), CoordinatorError> {
        if self.is_modal_open() {
            self.close_modal();
            Ok(())
        } else {
            self.open_modal()
        }
    }

    /// Re-layout both mounts and notify sessions of the new sizes.
    pub fn set_area(&mut self, area: Rect) {
        self.inline.set_rect(area);
        self.modal.set_rect(area.centered(MODAL_PERCENT));
        self.ctx.input.dispatch_resize();
    }

    /// Dispose every session; the coordinator returns to `Idle`.
    pub fn shutdown(&mut self) {
        self.teardown();
        self.phase = Phase::Idle;
        self.ticket += 1;
    }

    fn teardown(&mut self) {
        let had_sessions = self.inline_session.is_some() || self.modal_session.is_some();
        self.close_modal();
        if let Some(mut session) = self.inline_session.take() {
            session.dispose();
        }
        if self.inline.clear() {
            warn!(target: "coordinator", "inline mount held content without a session");
        }
        self.model = None;
        self.notice = None;
        self.reveal_at = None;
        if had_sessions {
            debug!(target: "coordinator", "disposed open sessions");
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}

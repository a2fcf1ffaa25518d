//! Interactive terminal shell around the session coordinator.

use std::io::{self, stdout, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::{
    cursor,
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        MouseButton, MouseEvent, MouseEventKind,
    },
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use promptmesh_core::TransportError;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::ViewerConfig;
use crate::coordinator::{CoordinatorError, Phase, SessionCoordinator, Submission, Ticket};
use crate::download::save_copy;
use crate::input::PointerEvent;
use crate::model::ModelAsset;
use crate::service::{retrieve_asset, AssetFetcher, CommandGenerator, FileFetcher};
use crate::session::ViewerContext;
use crate::surface::{MountTarget, Rect};

type Completion = (Ticket, Result<ModelAsset, TransportError>);

/// What to do once the terminal is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Startup {
    Empty,
    View(PathBuf),
    Generate(String),
}

pub struct TerminalApp {
    config: ViewerConfig,
    coordinator: SessionCoordinator,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    prompt: String,
    editing: bool,
    message: Option<String>,
    running: bool,
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

impl TerminalApp {
    pub fn new(config: ViewerConfig) -> io::Result<Self> {
        let (width, height) = terminal::size()?;
        let ctx = ViewerContext::new(config.settings());
        let coordinator =
            SessionCoordinator::new(ctx, viewer_area(width, height)).with_auto_reveal(config.auto_reveal());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            coordinator,
            completions_tx,
            completions_rx,
            prompt: String::new(),
            editing: false,
            message: None,
            running: true,
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        })
    }

    /// Must be polled inside a `tokio::task::LocalSet`.
    pub async fn run(&mut self, startup: Startup) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            stdout(),
            terminal::EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide
        )?;

        let result = self.main_loop(startup).await;

        // Cleanup
        self.coordinator.shutdown();
        terminal::disable_raw_mode()?;
        execute!(
            stdout(),
            DisableMouseCapture,
            terminal::LeaveAlternateScreen,
            cursor::Show
        )?;

        result
    }

    async fn main_loop(&mut self, startup: Startup) -> io::Result<()> {
        match startup {
            Startup::Empty => {}
            Startup::View(path) => self.open_local(path).await,
            Startup::Generate(prompt) => {
                self.prompt = prompt;
                self.submit();
            }
        }

        let mut ticker = tokio::time::interval(self.config.frame_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while self.running {
            ticker.tick().await;

            while event::poll(Duration::ZERO)? {
                let event = event::read()?;
                self.handle_event(event);
            }

            while let Ok((ticket, outcome)) = self.completions_rx.try_recv() {
                let result = self.coordinator.complete(ticket, outcome);
                self.report(result);
            }
            let result = self.coordinator.tick(Instant::now());
            self.report(result);

            self.coordinator.context().scheduler.run_frame();
            self.render()?;

            self.frame_count += 1;
            let now = Instant::now();
            if (now - self.last_frame).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_frame).as_secs_f32();
                self.frame_count = 0;
                self.last_frame = now;
            }
        }

        Ok(())
    }

    async fn open_local(&mut self, path: PathBuf) {
        let url = path.to_string_lossy().into_owned();
        match FileFetcher.fetch(&url).await {
            Ok(raw_text) => {
                let result = self.coordinator.load_asset(ModelAsset {
                    source_url: url,
                    raw_text,
                });
                self.report(result);
            }
            Err(err) => {
                error!(target: "service", error = %err, "could not open local asset");
                self.message = Some(err.to_string());
            }
        }
    }

    fn submit(&mut self) {
        match self.coordinator.submit(&self.prompt) {
            Ok(Submission { ticket, request }) => {
                self.message = None;
                let generator = CommandGenerator::new(self.config.generator.clone(), self.config.output_dir.clone());
                let limit = self.config.request_timeout();
                let tx = self.completions_tx.clone();
                tokio::task::spawn_local(async move {
                    let outcome = retrieve_asset(&generator, &FileFetcher, request, limit).await;
                    // The receiver only goes away on shutdown.
                    let _ = tx.send((ticket, outcome));
                });
            }
            Err(err) => self.message = Some(err.to_string()),
        }
    }

    fn download(&mut self) {
        let Some(asset) = self.coordinator.current_asset() else {
            self.message = Some("Nothing to download yet".into());
            return;
        };
        self.message = Some(match save_copy(asset, &self.config.download_dir) {
            Ok(path) => format!("Saved {}", path.display()),
            Err(err) => {
                warn!(target: "service", error = %err, "download failed");
                format!("Download failed: {err:#}")
            }
        });
    }

    fn report(&mut self, result: Result<(), CoordinatorError>) {
        if let Err(err) = result {
            warn!(target: "coordinator", error = %err, "viewer action failed");
            self.message = Some(err.to_string());
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key),
            Event::Mouse(mouse) => {
                if let Some(pointer) = pointer_event(&mouse) {
                    self.coordinator.context().input.dispatch_pointer(pointer);
                }
            }
            Event::Resize(width, height) => {
                self.coordinator.set_area(viewer_area(width, height));
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, KeyEvent { code, .. }: KeyEvent) {
        if self.editing {
            match code {
                KeyCode::Enter => {
                    self.editing = false;
                    self.submit();
                }
                KeyCode::Esc => self.editing = false,
                KeyCode::Backspace => {
                    self.prompt.pop();
                }
                KeyCode::Char(c) => self.prompt.push(c),
                _ => {}
            }
            return;
        }
        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                info!(target: "coordinator", "quit requested");
                self.running = false;
            }
            KeyCode::Char('/') => self.editing = true,
            KeyCode::Char('m') => {
                let result = self.coordinator.toggle_modal();
                self.report(result);
            }
            KeyCode::Char('d') => self.download(),
            _ => {}
        }
    }

    fn render(&mut self) -> io::Result<()> {
        let mut stdout = stdout();
        let (width, height) = terminal::size()?;

        draw_mount(&mut stdout, self.coordinator.inline_mount())?;
        if self.coordinator.is_modal_open() {
            draw_mount(&mut stdout, self.coordinator.modal_mount())?;
        }

        // Status line
        let phase = match self.coordinator.phase() {
            Phase::Idle => "idle",
            Phase::Requesting => "generating…",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
        };
        let notice = self
            .message
            .as_deref()
            .or_else(|| self.coordinator.notice())
            .unwrap_or("");
        queue!(
            stdout,
            cursor::MoveTo(0, 0),
            terminal::Clear(ClearType::CurrentLine),
            SetForegroundColor(Color::Yellow),
            Print(fit(
                &format!("promptmesh | {phase} | FPS: {:.1} | {notice}", self.fps),
                width
            )),
            ResetColor
        )?;

        // Prompt line
        let hint = if self.editing {
            "Enter=Generate Esc=Cancel"
        } else {
            "/=Prompt Drag=Rotate M=Modal D=Download Q=Quit"
        };
        let marker = if self.editing { ">" } else { " " };
        queue!(
            stdout,
            cursor::MoveTo(0, height.saturating_sub(1)),
            terminal::Clear(ClearType::CurrentLine),
            SetForegroundColor(if self.editing { Color::White } else { Color::DarkGrey }),
            Print(fit(&format!("{marker} {} | {hint}", self.prompt), width)),
            ResetColor
        )?;

        stdout.flush()?;
        Ok(())
    }
}

/// Region below the status line and above the prompt line.
pub fn viewer_area(width: u16, height: u16) -> Rect {
    Rect::new(0, 1, width, height.saturating_sub(2))
}

/// Map a mouse report to a pointer event; only the left button drags.
pub fn pointer_event(mouse: &MouseEvent) -> Option<PointerEvent> {
    let (x, y) = (mouse.column as f32, mouse.row as f32);
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => Some(PointerEvent::Down { x, y }),
        MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Moved => Some(PointerEvent::Move { x, y }),
        MouseEventKind::Up(MouseButton::Left) => Some(PointerEvent::Up { x, y }),
        _ => None,
    }
}

fn draw_mount<W: Write>(out: &mut W, mount: &MountTarget) -> io::Result<()> {
    let rect = mount.rect();
    match mount.content() {
        Some(surface) => {
            let surface = surface.borrow();
            surface.renderer().draw_at(out, rect.x, rect.y)
        }
        None => {
            let blank = " ".repeat(rect.width as usize);
            for row in 0..rect.height {
                queue!(out, cursor::MoveTo(rect.x, rect.y + row), Print(&blank))?;
            }
            Ok(())
        }
    }
}

fn fit(text: &str, width: u16) -> String {
    text.chars().take(width as usize).collect()
}

//! Terminal viewer runtime: frame scheduling, pointer input, mount targets,
//! viewer sessions and the generation cycle that drives them.

pub mod app;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod download;
pub mod frame;
pub mod input;
pub mod model;
pub mod renderer;
pub mod scene;
pub mod service;
pub mod session;
pub mod surface;
pub mod telemetry;

pub use app::{Startup, TerminalApp};
pub use config::ViewerConfig;
pub use coordinator::{CoordinatorError, Phase, SessionCoordinator};
pub use model::{LoadedModel, ModelAsset};
pub use renderer::AsciiRenderer;
pub use session::{ViewerContext, ViewerError, ViewerSession, ViewerSettings};
pub use surface::{MountTarget, Rect};

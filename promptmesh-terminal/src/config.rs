//! Viewer configuration loaded from config/promptmesh.toml with env overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use serde::Deserialize;
use tracing::warn;

use crate::scene::SceneSettings;
use crate::session::ViewerSettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/promptmesh.toml";

/// Above this the frame interval would round down to zero.
const MAX_FPS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Radians per cell of drag.
    pub sensitivity: f32,
    pub smoothing: f32,
    pub fps: u32,
    pub request_timeout_secs: u64,
    /// Delay before the modal opens by itself; `None` disables it.
    pub auto_reveal_modal_ms: Option<u64>,
    /// argv with `{prompt}` and `{out}` placeholders.
    pub generator: Vec<String>,
    pub output_dir: PathBuf,
    pub download_dir: PathBuf,
    pub log_file: PathBuf,
    pub ambient: f32,
    pub directional: f32,
    pub light_direction: [f32; 3],
    pub fov_deg: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.01,
            smoothing: 0.1,
            fps: 30,
            request_timeout_secs: 300,
            auto_reveal_modal_ms: Some(800),
            generator: [
                "python",
                "-m",
                "point_e.evals.scripts.generate",
                "--prompt",
                "{prompt}",
                "--out",
                "{out}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            output_dir: PathBuf::from("data/outputs"),
            download_dir: PathBuf::from("downloads"),
            log_file: PathBuf::from("promptmesh.log"),
            ambient: 0.3,
            directional: 0.8,
            light_direction: [-0.5, -1.0, -1.0],
            fov_deg: 45.0,
        }
    }
}

impl ViewerConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.clamp(1, MAX_FPS)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn auto_reveal(&self) -> Option<Duration> {
        self.auto_reveal_modal_ms.map(Duration::from_millis)
    }

    pub fn settings(&self) -> ViewerSettings {
        let [x, y, z] = self.light_direction;
        ViewerSettings {
            sensitivity: self.sensitivity,
            smoothing: self.smoothing.clamp(0.0, 1.0),
            scene: SceneSettings {
                ambient: self.ambient,
                directional: self.directional,
                light_direction: Vector3::new(x, y, z),
                fov: self.fov_deg.clamp(1.0, 179.0).to_radians(),
            },
        }
    }

    /// Apply `PROMPTMESH_*` overrides, returning the ones that did not parse.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Vec<RejectedOverride> {
        let mut rejected = Vec::new();
        override_with(&var, "PROMPTMESH_SENSITIVITY", &mut self.sensitivity, &mut rejected);
        override_with(&var, "PROMPTMESH_SMOOTHING", &mut self.smoothing, &mut rejected);
        override_with(&var, "PROMPTMESH_FPS", &mut self.fps, &mut rejected);
        override_with(&var, "PROMPTMESH_TIMEOUT_SECS", &mut self.request_timeout_secs, &mut rejected);
        if let Some(cmd) = var("PROMPTMESH_GENERATOR") {
            let argv: Vec<String> = cmd.split_whitespace().map(String::from).collect();
            if argv.is_empty() {
                rejected.push(RejectedOverride {
                    key: "PROMPTMESH_GENERATOR",
                    value: cmd,
                });
            } else {
                self.generator = argv;
            }
        }
        rejected
    }
}

fn override_with<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
    rejected: &mut Vec<RejectedOverride>,
) {
    let Some(value) = var(key) else {
        return;
    };
    match value.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => rejected.push(RejectedOverride { key, value }),
    }
}

/// An environment override whose value could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOverride {
    pub key: &'static str,
    pub value: String,
}

/// Configuration plus the overrides that were ignored while loading it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ViewerConfig,
    pub rejected: Vec<RejectedOverride>,
}

impl LoadedConfig {
    /// Report ignored overrides; call once logging is installed.
    pub fn log_rejected(&self) {
        for r in &self.rejected {
            warn!(target: "config", key = r.key, value = %r.value, "ignoring unusable environment override");
        }
    }
}

/// Load `path`, or the default location when `None`. A missing default file
/// yields defaults; an explicitly named file must exist.
pub fn load(path: Option<&Path>) -> Result<LoadedConfig> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let mut cfg = if required || path.is_file() {
        let txt = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str::<ViewerConfig>(&txt).with_context(|| format!("parse {}", path.display()))?
    } else {
        ViewerConfig::default()
    };
    let rejected = cfg.apply_env(|key| std::env::var(key).ok());
    Ok(LoadedConfig {
        config: cfg,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: ViewerConfig = toml::from_str("fps = 60\nauto_reveal_modal_ms = 1200\n").unwrap();
        assert_eq!(cfg.fps, 60);
        assert_eq!(cfg.auto_reveal(), Some(Duration::from_millis(1200)));
        assert_eq!(cfg.sensitivity, 0.01);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = ViewerConfig::default();
        let rejected = cfg.apply_env(|key| match key {
            "PROMPTMESH_SENSITIVITY" => Some("0.02".into()),
            "PROMPTMESH_FPS" => Some("not a number".into()),
            "PROMPTMESH_TIMEOUT_SECS" => Some(" 60 ".into()),
            "PROMPTMESH_GENERATOR" => Some("./gen.sh {prompt} {out}".into()),
            _ => None,
        });
        assert_eq!(cfg.sensitivity, 0.02);
        assert_eq!(cfg.fps, 30);
        assert_eq!(cfg.request_timeout_secs, 60);
        assert_eq!(cfg.generator, vec!["./gen.sh", "{prompt}", "{out}"]);
        assert_eq!(
            rejected,
            vec![RejectedOverride {
                key: "PROMPTMESH_FPS",
                value: "not a number".into(),
            }]
        );

        let blank = ViewerConfig::default().apply_env(|key| (key == "PROMPTMESH_GENERATOR").then(|| "  ".into()));
        assert_eq!(blank.len(), 1);
        assert_eq!(blank[0].key, "PROMPTMESH_GENERATOR");
    }

    #[test]
    fn test_settings_conversion() {
        let cfg = ViewerConfig {
            fps: 0,
            smoothing: 3.0,
            ..ViewerConfig::default()
        };
        assert_eq!(cfg.frame_interval(), Duration::from_millis(1000));
        let settings = cfg.settings();
        assert_eq!(settings.smoothing, 1.0);
        assert!((settings.scene.fov - std::f32::consts::FRAC_PI_4).abs() < 1e-6);
    }

    #[test]
    fn test_high_fps_keeps_a_nonzero_interval() {
        let mut cfg = ViewerConfig::default();
        let rejected = cfg.apply_env(|key| (key == "PROMPTMESH_FPS").then(|| "2000".into()));
        assert!(rejected.is_empty());
        assert_eq!(cfg.fps, 2000);
        assert_eq!(cfg.frame_interval(), Duration::from_millis(1));

        let max = ViewerConfig {
            fps: u32::MAX,
            ..ViewerConfig::default()
        };
        assert!(!max.frame_interval().is_zero());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/promptmesh.toml"))).is_err());
    }
}

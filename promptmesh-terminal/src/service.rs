//! Generation and asset retrieval collaborators.
//!
//! Both are opaque async boundaries: the coordinator only sees a
//! [`ModelAsset`] or a [`TransportError`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use promptmesh_core::TransportError;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::model::ModelAsset;

const STDERR_TAIL: usize = 400;

/// Non-empty, trimmed prompt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
}

impl From<Prompt> for GenerationRequest {
    fn from(prompt: Prompt) -> Self {
        Self { prompt: prompt.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub url: String,
}

#[allow(async_fn_in_trait)]
pub trait GenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, TransportError>;
}

#[allow(async_fn_in_trait)]
pub trait AssetFetcher {
    async fn fetch(&self, url: &str) -> Result<String, TransportError>;
}

/// Run one generation and fetch its result, bounded by `limit`.
pub async fn retrieve_asset<G, F>(
    generator: &G,
    fetcher: &F,
    request: GenerationRequest,
    limit: Duration,
) -> Result<ModelAsset, TransportError>
where
    G: GenerationService,
    F: AssetFetcher,
{
    let work = async {
        let response = generator.generate(&request).await?;
        debug!(target: "service", url = %response.url, "generation finished");
        let raw_text = fetcher.fetch(&response.url).await?;
        Ok(ModelAsset {
            source_url: response.url,
            raw_text,
        })
    };
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            after_secs: limit.as_secs(),
        }),
    }
}

/// Generator backed by an external command line.
///
/// `{prompt}` and `{out}` in the arguments are replaced with the prompt text
/// and the path the command is expected to write.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    argv: Vec<String>,
    output_dir: PathBuf,
    working_dir: Option<PathBuf>,
}

impl CommandGenerator {
    pub fn new(argv: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            output_dir: output_dir.into(),
            working_dir: None,
        }
    }

    /// Run the command in `dir`; relative paths it reports resolve there.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn output_path(&self, job: u128) -> PathBuf {
        self.output_dir.join(format!("{job:x}.ply"))
    }
}

impl GenerationService for CommandGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, TransportError> {
        let (program, args) = self.argv.split_first().ok_or_else(|| TransportError::Request {
            reason: "no generator command configured".into(),
        })?;
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| TransportError::Request {
                reason: format!("create {}: {e}", self.output_dir.display()),
            })?;

        let job = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let out = self.output_path(job);
        let out_str = out.to_string_lossy();
        let args: Vec<String> = args
            .iter()
            .map(|a| a.replace("{prompt}", &request.prompt).replace("{out}", &out_str))
            .collect();

        info!(target: "service", program = %program, out = %out.display(), "running generator");
        let mut command = Command::new(program);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let output = command
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TransportError::Request {
                reason: format!("spawn {program}: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::Request {
                reason: format!("{program} exited with {}: {}", output.status, tail(&stderr, STDERR_TAIL)),
            });
        }

        resolve_locator(&stdout, &out, self.working_dir.as_deref()).ok_or_else(|| TransportError::BadResponse {
            reason: format!("generator reported no output and {} was not written", out.display()),
        })
    }
}

/// Find the asset locator in the generator's output: a JSON `{"url": ..}`
/// line, then a `Saved: <path>.ply` line, then the expected output file.
/// Relative `Saved:` paths are resolved against `base`.
fn resolve_locator(stdout: &str, expected: &Path, base: Option<&Path>) -> Option<GenerationResponse> {
    let lines: Vec<&str> = stdout.lines().map(str::trim).collect();
    if let Some(response) = lines
        .iter()
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str::<GenerationResponse>(l).ok())
    {
        return Some(response);
    }
    if let Some(path) = lines
        .iter()
        .filter_map(|l| l.strip_prefix("Saved:"))
        .find_map(saved_path)
    {
        let path = match base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        return Some(GenerationResponse {
            url: path.to_string_lossy().into_owned(),
        });
    }
    expected.is_file().then(|| GenerationResponse {
        url: expected.to_string_lossy().into_owned(),
    })
}

/// Path up to and including the last `.ply`, which may contain spaces.
fn saved_path(rest: &str) -> Option<&Path> {
    let end = rest.rfind(".ply")? + ".ply".len();
    let path = rest[..end].trim();
    (path.len() > ".ply".len()).then(|| Path::new(path))
}

fn tail(text: &str, max: usize) -> &str {
    let text = text.trim();
    let mut start = text.len().saturating_sub(max);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Fetches `file://` URLs and plain filesystem paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl AssetFetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<String, TransportError> {
        let path = match url.split_once("://") {
            Some(("file", path)) => path,
            Some((scheme, _)) => {
                return Err(TransportError::Fetch {
                    url: url.to_string(),
                    reason: format!("unsupported scheme `{scheme}`"),
                })
            }
            None => url,
        };
        let bytes = tokio::fs::read(path).await.map_err(|e| TransportError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(target: "service", url, "asset is not valid UTF-8; decoding lossily");
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("promptmesh-service-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    struct FixedGenerator(Result<GenerationResponse, TransportError>);

    impl GenerationService for FixedGenerator {
        async fn generate(&self, _: &GenerationRequest) -> Result<GenerationResponse, TransportError> {
            self.0.clone()
        }
    }

    struct StalledGenerator;

    impl GenerationService for StalledGenerator {
        async fn generate(&self, _: &GenerationRequest) -> Result<GenerationResponse, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(TransportError::Request { reason: "unreachable".into() })
        }
    }

    fn request() -> GenerationRequest {
        Prompt::new("  a red chair ").unwrap().into()
    }

    #[test]
    fn test_prompt_is_trimmed_and_non_empty() {
        assert_eq!(Prompt::new("  chair\n").unwrap().as_str(), "chair");
        assert!(Prompt::new("   ").is_none());
        assert_eq!(request().prompt, "a red chair");
    }

    #[test]
    fn test_locator_resolution_order() {
        let missing = Path::new("/nonexistent/promptmesh/out.ply");
        let json = "loading\n{\"url\": \"file:///tmp/a.ply\"}\nSaved: /tmp/b.ply points: 4096\n";
        assert_eq!(resolve_locator(json, missing, None).unwrap().url, "file:///tmp/a.ply");

        let saved = "Using device: cpu\nSaved: /tmp/b.ply points: 4096\n";
        assert_eq!(resolve_locator(saved, missing, None).unwrap().url, "/tmp/b.ply");

        assert!(resolve_locator("nothing useful\n", missing, None).is_none());
        assert!(resolve_locator("Saved: nothing\n", missing, None).is_none());
    }

    #[test]
    fn test_saved_path_keeps_spaces_and_resolves_relative() {
        let missing = Path::new("/nonexistent/promptmesh/out.ply");
        let spaced = "Saved: /tmp/my models/red chair.ply points: 4096\n";
        assert_eq!(
            resolve_locator(spaced, missing, None).unwrap().url,
            "/tmp/my models/red chair.ply"
        );

        let relative = "Saved: outputs/chair.ply points: 10\n";
        let base = Path::new("/srv/generator");
        assert_eq!(
            resolve_locator(relative, missing, Some(base)).unwrap().url,
            base.join("outputs/chair.ply").to_string_lossy()
        );
        let absolute = "Saved: /tmp/chair.ply\n";
        assert_eq!(resolve_locator(absolute, missing, Some(base)).unwrap().url, "/tmp/chair.ply");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ééé", 3), "é");
        assert_eq!(tail("ok", 10), "ok");
    }

    #[tokio::test]
    async fn test_file_fetcher_reads_paths_and_urls() {
        let dir = scratch("fetch");
        let path = dir.join("cube.ply");
        std::fs::write(&path, "ply\n").unwrap();

        let plain = FileFetcher.fetch(path.to_str().unwrap()).await.unwrap();
        let url = FileFetcher.fetch(&format!("file://{}", path.display())).await.unwrap();
        assert_eq!(plain, "ply\n");
        assert_eq!(url, plain);

        let missing = FileFetcher.fetch("/nonexistent/promptmesh.ply").await;
        assert!(matches!(missing, Err(TransportError::Fetch { .. })));
        let remote = FileFetcher.fetch("https://example.com/a.ply").await;
        assert!(matches!(remote, Err(TransportError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_retrieve_asset_chains_generator_and_fetcher() {
        let dir = scratch("retrieve");
        let path = dir.join("model.ply");
        std::fs::write(&path, "ply\nformat ascii 1.0\n").unwrap();
        let url = path.to_string_lossy().into_owned();

        let generator = FixedGenerator(Ok(GenerationResponse { url: url.clone() }));
        let asset = retrieve_asset(&generator, &FileFetcher, request(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(asset.source_url, url);
        assert!(asset.raw_text.starts_with("ply"));

        let failing = FixedGenerator(Err(TransportError::BadResponse { reason: "500".into() }));
        let err = retrieve_asset(&failing, &FileFetcher, request(), Duration::from_secs(5)).await;
        assert!(matches!(err, Err(TransportError::BadResponse { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrieve_asset_times_out() {
        let err = retrieve_asset(&StalledGenerator, &FileFetcher, request(), Duration::from_secs(2)).await;
        assert_eq!(err, Err(TransportError::Timeout { after_secs: 2 }));
    }

    #[tokio::test]
    async fn test_command_generator_uses_expected_output() {
        let dir = scratch("command");
        let generator = CommandGenerator::new(
            vec![
                "sh".into(),
                "-c".into(),
                "printf 'ply\\n' > \"$1\"".into(),
                "gen".into(),
                "{out}".into(),
            ],
            &dir,
        );
        let response = generator.generate(&request()).await.unwrap();
        assert!(response.url.starts_with(dir.to_str().unwrap()));
        assert_eq!(std::fs::read_to_string(&response.url).unwrap(), "ply\n");
    }

    #[tokio::test]
    async fn test_command_generator_resolves_saved_path_in_working_dir() {
        let dir = scratch("workdir");
        let generator = CommandGenerator::new(
            vec![
                "sh".into(),
                "-c".into(),
                "printf 'ply\\n' > 'out file.ply' && echo 'Saved: out file.ply points: 1'".into(),
            ],
            scratch("workdir-out"),
        )
        .with_working_dir(&dir);
        let response = generator.generate(&request()).await.unwrap();
        assert_eq!(response.url, dir.join("out file.ply").to_string_lossy());
        assert_eq!(FileFetcher.fetch(&response.url).await.unwrap(), "ply\n");
    }

    #[tokio::test]
    async fn test_command_generator_reports_failure() {
        let generator = CommandGenerator::new(
            vec!["sh".into(), "-c".into(), "echo boom >&2; exit 3".into()],
            scratch("failure"),
        );
        match generator.generate(&request()).await {
            Err(TransportError::Request { reason }) => assert!(reason.contains("boom")),
            other => panic!("unexpected result: {other:?}"),
        }

        let empty = CommandGenerator::new(Vec::new(), scratch("empty"));
        assert!(matches!(empty.generate(&request()).await, Err(TransportError::Request { .. })));
    }
}

//! Saving the current asset to disk.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::info;

use crate::model::ModelAsset;

/// `model-<unix-millis>.ply`
pub fn download_file_name(at: SystemTime) -> String {
    let millis = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("model-{millis}.ply")
}

/// Write the asset's raw text into `dir` under a timestamped name.
pub fn save_copy(asset: &ModelAsset, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(download_file_name(SystemTime::now()));
    std::fs::write(&path, &asset.raw_text).with_context(|| format!("write {}", path.display()))?;
    info!(target: "service", url = %asset.source_url, path = %path.display(), "asset downloaded");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_file_name_uses_millis() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(download_file_name(at), "model-1700000000123.ply");
    }

    #[test]
    fn test_save_copy_writes_raw_text() {
        let dir = std::env::temp_dir().join(format!("promptmesh-download-{}", std::process::id()));
        let asset = ModelAsset {
            source_url: "file:///tmp/a.ply".into(),
            raw_text: "ply\nformat ascii 1.0\n".into(),
        };
        let path = save_copy(&asset, &dir).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("model-"));
        assert_eq!(path.extension().unwrap(), "ply");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), asset.raw_text);
    }
}

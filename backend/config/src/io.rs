//! Config file read/write with atomic backup rotation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::schema::HudBridgeConfig;

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "hudbridge.yaml";

/// Number of rolling backups to keep.
const MAX_BACKUPS: usize = 5;

/// Resolve the HudBridge config directory.
/// Priority: `HUDBRIDGE_CONFIG_DIR` env > `~/.hudbridge/`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HUDBRIDGE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".hudbridge");
    }
    PathBuf::from(".hudbridge")
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Load and parse the config from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
pub async fn load_config(path: &Path) -> Result<HudBridgeConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file does not exist; using defaults");
        return Ok(HudBridgeConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: HudBridgeConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Write config to disk atomically (write to temp file, rename).
///
/// Creates a rolling backup of the previous config before overwriting.
pub async fn write_config(config: &HudBridgeConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;
    }

    if path.exists() {
        rotate_backups(path).await?;
    }

    let yaml = serde_yaml::to_string(config).context("failed to serialize config to YAML")?;

    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, yaml.as_bytes())
        .await
        .with_context(|| format!("failed to write temp config: {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("failed to rename temp config to: {}", path.display()))?;

    info!(path = %path.display(), "wrote config");
    Ok(())
}

/// Rotate backup files: hudbridge.yaml.bak.1 → .bak.2 → ... → .bak.N
async fn rotate_backups(path: &Path) -> Result<()> {
    for i in (1..MAX_BACKUPS).rev() {
        let old = path.with_extension(format!("yaml.bak.{}", i));
        let new = path.with_extension(format!("yaml.bak.{}", i + 1));
        if old.exists() {
            if let Err(e) = fs::rename(&old, &new).await {
                warn!("failed to rotate backup {}: {}", old.display(), e);
            }
        }
    }

    let bak = path.with_extension("yaml.bak.1");
    if let Err(e) = fs::copy(path, &bak).await {
        warn!("failed to create backup {}: {}", bak.display(), e);
    }

    Ok(())
}

/// Patch config with a JSON Merge Patch (RFC 7396).
///
/// The host adapter uses this for partial updates such as switching the
/// default view.
pub fn apply_merge_patch(
    config: &HudBridgeConfig,
    patch: &serde_json::Value,
) -> Result<HudBridgeConfig> {
    let mut value =
        serde_json::to_value(config).context("failed to serialize config for merge patch")?;
    json_merge_patch(&mut value, patch);
    let updated: HudBridgeConfig =
        serde_json::from_value(value).context("failed to deserialize config after merge patch")?;
    Ok(updated)
}

/// RFC 7396 JSON Merge Patch algorithm.
fn json_merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    if let serde_json::Value::Object(patch_map) = patch {
        if let serde_json::Value::Object(target_map) = target {
            for (key, patch_val) in patch_map {
                if patch_val.is_null() {
                    target_map.remove(key);
                } else {
                    let entry = target_map
                        .entry(key.clone())
                        .or_insert(serde_json::Value::Null);
                    json_merge_patch(entry, patch_val);
                }
            }
        } else {
            *target = patch.clone();
        }
    } else {
        *target = patch.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hudbridge.yaml");

        let config = HudBridgeConfig {
            listen_port: Some(9000.0),
            default_view: Some("matrix".into()),
            ..Default::default()
        };
        write_config(&config, &path).await.unwrap();

        let loaded = load_config(&path).await.unwrap();
        assert_eq!(loaded.listen_port, Some(9000.0));
        assert_eq!(loaded.default_view.as_deref(), Some("matrix"));
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(&dir.path().join("nope.yaml")).await.unwrap();
        assert!(loaded.views.is_empty());
    }

    #[tokio::test]
    async fn overwrite_creates_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hudbridge.yaml");

        write_config(&HudBridgeConfig::default(), &path).await.unwrap();
        write_config(&HudBridgeConfig::default(), &path).await.unwrap();
        assert!(path.with_extension("yaml.bak.1").exists());
    }

    #[test]
    fn merge_patch_updates_scalar() {
        let base = HudBridgeConfig::default();
        let patch = serde_json::json!({ "defaultView": "clock" });
        let result = apply_merge_patch(&base, &patch).unwrap();
        assert_eq!(result.default_view.as_deref(), Some("clock"));
    }

    #[test]
    fn merge_patch_removes_key() {
        let base = HudBridgeConfig {
            default_view: Some("clock".into()),
            ..Default::default()
        };
        let patch = serde_json::json!({ "defaultView": null });
        let result = apply_merge_patch(&base, &patch).unwrap();
        assert!(result.default_view.is_none());
    }
}

use crate::sessions::CacheConfig;
use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Env var naming the config directory when `--config-dir` is not given.
pub const CONFIG_DIR_ENV: &str = "MERCHANT_ADVISOR_CONFIG_DIR";
pub const DEFAULT_OTEL_ENDPOINT: &str = "http://localhost:4318";
pub const DEFAULT_OTEL_SERVICE_NAME: &str = "merchant-advisor";

const CONFIG_FILE_NAME: &str = "config.toml";
const SUPPORTED_OBSERVABILITY_BACKENDS: &[&str] = &["none", "log", "otel"];
const SUPPORTED_CHECKPOINT_BACKENDS: &[&str] = &["sqlite", "memory"];

// ── Top-level config ──────────────────────────────────────────────

/// Top-level configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` → `MERCHANT_ADVISOR_CONFIG_DIR` → `~/.merchant-advisor`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Directory holding config.toml - computed, not serialized
    #[serde(skip)]
    pub config_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Cache TTLs per data type (`[cache]`), keyed `<type>_ttl_seconds`.
    /// A present table replaces the defaults; unlisted types get 300s.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Trace side-channel configuration (`[observability]`).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Conversation checkpoint store (`[checkpoint]`).
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

// ── Observability ─────────────────────────────────────────────────

/// Observability backend configuration (`[observability]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObservabilityConfig {
    /// "none" | "log" | "otel"
    #[serde(default = "default_observability_backend")]
    pub backend: String,

    /// OTLP/HTTP endpoint. Only used when backend = "otel".
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: Option<String>,

    /// Service name reported to the collector. Defaults to "merchant-advisor".
    #[serde(default)]
    pub otel_service_name: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            backend: default_observability_backend(),
            otel_endpoint: default_otel_endpoint(),
            otel_service_name: None,
        }
    }
}

impl ObservabilityConfig {
    pub fn service_name(&self) -> &str {
        self.otel_service_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_OTEL_SERVICE_NAME)
    }
}

fn default_observability_backend() -> String {
    "none".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_otel_endpoint() -> Option<String> {
    Some(DEFAULT_OTEL_ENDPOINT.to_string())
}

// ── Checkpoints ───────────────────────────────────────────────────

/// Checkpoint store configuration (`[checkpoint]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointConfig {
    /// Record conversation turns. Default: `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// "sqlite" | "memory"
    #[serde(default = "default_checkpoint_backend")]
    pub backend: String,

    /// SQLite file. Relative paths are resolved under the config directory.
    #[serde(default = "default_checkpoint_path")]
    pub path: String,

    /// Most recent turns handed to the agent with each query. Default: `20`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_checkpoint_backend(),
            path: default_checkpoint_path(),
            history_limit: default_history_limit(),
        }
    }
}

impl CheckpointConfig {
    pub fn resolved_path(&self, config_dir: &Path) -> PathBuf {
        let path = PathBuf::from(self.path.trim());
        if path.is_absolute() {
            path
        } else {
            config_dir.join(path)
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_checkpoint_backend() -> String {
    "sqlite".to_string()
}

fn default_checkpoint_path() -> String {
    "checkpoints.db".to_string()
}

fn default_history_limit() -> usize {
    20
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let config_dir = UserDirs::new().map_or_else(
            || PathBuf::from(".merchant-advisor"),
            |u| u.home_dir().join(".merchant-advisor"),
        );

        Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            cache: CacheConfig::default(),
            observability: ObservabilityConfig::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".merchant-advisor"))
}

/// Pick the config directory: explicit override, then env, then home.
pub fn resolve_config_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir.trim())),
        _ => default_config_dir(),
    }
}

impl Config {
    /// Load `config.toml` from the resolved config directory, writing the
    /// defaults there first if it does not exist yet.
    pub async fn load_or_init(override_dir: Option<&Path>) -> Result<Self> {
        let config_dir = resolve_config_dir(override_dir)?;
        Self::load_or_init_in(&config_dir).await
    }

    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let config = Config {
                config_dir: config_dir.to_path_buf(),
                config_path: config_path.clone(),
                ..Config::default()
            };
            config.save().await?;
            config
        } else {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            // Set computed paths that are skipped during serialization
            config.config_dir = config_dir.to_path_buf();
            config.config_path = config_path;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            observability = %config.observability.backend,
            checkpoint = %config.checkpoint.backend,
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Absolute location of the checkpoint database.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint.resolved_path(&self.config_dir)
    }

    /// Validate configuration values that would cause runtime failures.
    ///
    /// Called after TOML deserialization and env-override application to catch
    /// obviously invalid values early instead of failing mid-session.
    pub fn validate(&self) -> Result<()> {
        // Cache
        self.cache.validate()?;

        // Observability
        let backend = self.observability.backend.trim().to_ascii_lowercase();
        if !SUPPORTED_OBSERVABILITY_BACKENDS.contains(&backend.as_str()) {
            anyhow::bail!(
                "observability.backend '{}' is not supported; expected one of: {}",
                self.observability.backend,
                SUPPORTED_OBSERVABILITY_BACKENDS.join(", ")
            );
        }
        if backend == "otel"
            && self
                .observability
                .otel_endpoint
                .as_deref()
                .map_or(true, |ep| ep.trim().is_empty())
        {
            anyhow::bail!("observability.otel_endpoint is required when backend = \"otel\"");
        }

        // Checkpoint
        let backend = self.checkpoint.backend.trim().to_ascii_lowercase();
        if !SUPPORTED_CHECKPOINT_BACKENDS.contains(&backend.as_str()) {
            anyhow::bail!(
                "checkpoint.backend '{}' is not supported; expected one of: {}",
                self.checkpoint.backend,
                SUPPORTED_CHECKPOINT_BACKENDS.join(", ")
            );
        }
        if self.checkpoint.path.trim().is_empty() {
            anyhow::bail!("checkpoint.path must not be empty");
        }
        if self.checkpoint.history_limit == 0 {
            anyhow::bail!("checkpoint.history_limit must be greater than 0");
        }

        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // Observability backend: MERCHANT_ADVISOR_OBSERVABILITY
        if let Ok(backend) = std::env::var("MERCHANT_ADVISOR_OBSERVABILITY") {
            if !backend.trim().is_empty() {
                self.observability.backend = backend.trim().to_ascii_lowercase();
            }
        }

        // OTLP endpoint: MERCHANT_ADVISOR_OTEL_ENDPOINT or legacy PHOENIX_ENDPOINT
        if let Ok(endpoint) = std::env::var("MERCHANT_ADVISOR_OTEL_ENDPOINT")
            .or_else(|_| std::env::var("PHOENIX_ENDPOINT"))
        {
            if !endpoint.trim().is_empty() {
                self.observability.otel_endpoint = Some(endpoint.trim().to_string());
            }
        }

        // PHOENIX_ENABLED=false turns tracing off regardless of the file.
        if let Ok(enabled) = std::env::var("PHOENIX_ENABLED") {
            if parse_enabled(&enabled) == Some(false) {
                self.observability.backend = "none".to_string();
            }
        }

        // Checkpoint database: MERCHANT_ADVISOR_CHECKPOINT_PATH
        if let Ok(path) = std::env::var("MERCHANT_ADVISOR_CHECKPOINT_PATH") {
            if !path.trim().is_empty() {
                self.checkpoint.path = path.trim().to_string();
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        Ok(())
    }
}

fn parse_enabled(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

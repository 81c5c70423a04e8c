//! Configuration module for framechain
//!
//! Stages are configured through their constructors. This module holds the
//! file-backed settings used by the `framechain` binary and by constructors
//! that accept a settings section:
//! - Logging filter and optional log directory
//! - Buffer isolation defaults (thread or sidecar process)
//! - Trigger pacing
//! - Demo chain parameters
//!
//! # Config Location
//!
//! The default config file lives in the platform config directory:
//! - **Linux**: `~/.config/dev.framechain/framechain.toml`
//! - **macOS**: `~/Library/Application Support/dev.framechain/framechain.toml`
//! - **Windows**: `%APPDATA%\dev.framechain\framechain.toml`
//!
//! Files ending in `.json` are read and written as JSON, everything else as
//! TOML.
//!
//! # Example
//!
//! ```ignore
//! use framechain::config::ChainConfig;
//!
//! let config = ChainConfig::load_or_default("framechain.toml");
//! let trigger = Trigger::from_settings(&config.trigger);
//! ```

use crate::backend::sidecar::SidecarOptions;
use crate::error::{FrameChainError, Result};
use crate::pipeline::stages::Isolation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.framechain";

/// Default config filename
pub const CONFIG_FILE: &str = "framechain.toml";

/// Default Trigger rate in pulls per second
pub const DEFAULT_TRIGGER_RATE_HZ: f64 = 30.0;

/// Default interval between Trigger rate reports
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 5;

/// Default time allowed for a sidecar to build and start its stage
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Environment variable marking a process as a sidecar worker
pub const WORKER_ENV_VAR: &str = "FRAMECHAIN_WORKER";

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info,framechain=debug";

// ==================== Config Directory ====================

/// Get the application config directory path
pub fn app_config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Sections ====================

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    pub filter: String,
    /// Directory for daily-rolling log files; stderr only when unset
    pub log_dir: Option<PathBuf>,
    /// Log file name prefix
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
            file_prefix: "framechain.log".to_string(),
        }
    }
}

/// Where buffered stages run by default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    #[default]
    Thread,
    Process,
}

/// Buffer defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    pub isolation: IsolationMode,
    /// Sidecar executable; the running executable when unset
    pub worker_program: Option<PathBuf>,
    pub handshake_timeout_ms: u64,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            isolation: IsolationMode::Thread,
            worker_program: None,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }
}

impl BufferSettings {
    pub fn sidecar_options(&self) -> SidecarOptions {
        SidecarOptions {
            program: self.worker_program.clone(),
            args: Vec::new(),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
        }
    }

    pub fn isolation(&self) -> Isolation {
        match self.isolation {
            IsolationMode::Thread => Isolation::Thread,
            IsolationMode::Process => Isolation::Process(self.sidecar_options()),
        }
    }
}

/// Trigger pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSettings {
    pub rate_hz: f64,
    /// Seconds between achieved-rate log lines; 0 disables them
    pub report_interval_secs: u64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_TRIGGER_RATE_HZ,
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
        }
    }
}

/// Parameters of the demo chain run by `framechain run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    pub width: u32,
    pub height: u32,
    /// Rate at which the binary polls the viewer
    pub view_fps: f64,
    pub detector_latency_ms: u64,
    pub inlay_factor: u32,
    pub sbs_factor: u32,
    /// Where periodic PNG snapshots are written; disabled when unset
    pub snapshot_dir: Option<PathBuf>,
    pub snapshot_interval_secs: u64,
    /// Run time; 0 runs until interrupted
    pub run_secs: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            view_fps: 15.0,
            detector_latency_ms: 250,
            inlay_factor: 4,
            sbs_factor: 2,
            snapshot_dir: None,
            snapshot_interval_secs: 2,
            run_secs: 10,
        }
    }
}

// ==================== Chain Config ====================

/// Complete runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub logging: LoggingConfig,
    pub buffer: BufferSettings,
    pub trigger: TriggerSettings,
    pub demo: DemoSettings,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

impl ChainConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FrameChainError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                FrameChainError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                FrameChainError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        }
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to disk, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FrameChainError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| FrameChainError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            self.to_toml()?
        };

        std::fs::write(path, content).map_err(|e| {
            FrameChainError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| FrameChainError::Config(format!("Failed to serialize config: {}", e)))
    }
}

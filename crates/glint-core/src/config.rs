//! Configuration system for Glint.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $GLINT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/glint/config.toml
//!   3. ~/.config/glint/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::block::DEFAULT_BLOCK_SIZE;
use crate::encoder::{EncodingPolicy, DEFAULT_OVERPROVISION};
use crate::wire::WireFormat;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlintConfig {
    pub transfer: TransferConfig,
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes per block.
    pub block_size: usize,
    pub policy: PolicyKind,
    /// Symbols per block under the redundant policy.
    pub overprovision: u32,
    pub wire_format: WireFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Direct,
    Redundant,
}

/// Highest symbol rate `validate` accepts.
pub const MAX_FPS: u32 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Symbols rendered per second.
    pub fps: u32,
    pub mode: SendMode,
    /// Render surfaces. Symbol `i` goes to surface `i % surfaces`.
    pub surfaces: usize,
}

/// What the scheduler does at the end of its send list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Stop and go idle.
    #[default]
    SingleShot,
    /// Wrap around and keep cycling until paused or reset.
    Looping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub completion: CompletionMode,
    /// Fraction of symbols that completes a tolerant transfer.
    pub tolerant_ratio: f64,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Every index must arrive.
    #[default]
    Strict,
    /// `ceil(total * tolerant_ratio)` indices suffice.
    Tolerant,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            policy: PolicyKind::Direct,
            overprovision: DEFAULT_OVERPROVISION,
            wire_format: WireFormat::Compact,
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            fps: 20,
            mode: SendMode::SingleShot,
            surfaces: 1,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            completion: CompletionMode::Strict,
            tolerant_ratio: 0.8,
            output_dir: data_dir().join("received"),
        }
    }
}

impl TransferConfig {
    pub fn encoding_policy(&self) -> EncodingPolicy {
        match self.policy {
            PolicyKind::Direct => EncodingPolicy::Direct,
            PolicyKind::Redundant => EncodingPolicy::Redundant {
                overprovision: self.overprovision,
            },
        }
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(PolicyKind::Direct),
            "redundant" => Ok(PolicyKind::Redundant),
            other => Err(ConfigError::Invalid(format!("unknown policy: {other}"))),
        }
    }
}

impl std::str::FromStr for SendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_shot" => Ok(SendMode::SingleShot),
            "looping" => Ok(SendMode::Looping),
            other => Err(ConfigError::Invalid(format!("unknown send mode: {other}"))),
        }
    }
}

impl std::str::FromStr for CompletionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(CompletionMode::Strict),
            "tolerant" => Ok(CompletionMode::Tolerant),
            other => Err(ConfigError::Invalid(format!(
                "unknown completion mode: {other}"
            ))),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("glint")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("glint")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GlintConfig {
    /// Load config: env vars → file → defaults, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            GlintConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("GLINT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&GlintConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer.block_size == 0 {
            return Err(ConfigError::Invalid("transfer.block_size must be > 0".into()));
        }
        if self.transfer.overprovision == 0 {
            return Err(ConfigError::Invalid(
                "transfer.overprovision must be > 0".into(),
            ));
        }
        if self.sender.fps == 0 || self.sender.fps > MAX_FPS {
            return Err(ConfigError::Invalid(format!(
                "sender.fps must be in 1..={MAX_FPS}, got {}",
                self.sender.fps
            )));
        }
        if self.sender.surfaces == 0 {
            return Err(ConfigError::Invalid("sender.surfaces must be > 0".into()));
        }
        let ratio = self.receiver.tolerant_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "receiver.tolerant_ratio must be in (0, 1], got {ratio}"
            )));
        }
        Ok(())
    }

    /// Apply GLINT_* env var overrides. Unparseable values are ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GLINT_TRANSFER__BLOCK_SIZE") {
            if let Ok(n) = v.parse() {
                self.transfer.block_size = n;
            }
        }
        if let Ok(v) = std::env::var("GLINT_TRANSFER__POLICY") {
            if let Ok(p) = v.parse() {
                self.transfer.policy = p;
            }
        }
        if let Ok(v) = std::env::var("GLINT_TRANSFER__WIRE_FORMAT") {
            if let Ok(f) = v.parse() {
                self.transfer.wire_format = f;
            }
        }
        if let Ok(v) = std::env::var("GLINT_SENDER__FPS") {
            if let Ok(n) = v.parse() {
                self.sender.fps = n;
            }
        }
        if let Ok(v) = std::env::var("GLINT_SENDER__MODE") {
            if let Ok(m) = v.parse() {
                self.sender.mode = m;
            }
        }
        if let Ok(v) = std::env::var("GLINT_RECEIVER__COMPLETION") {
            if let Ok(m) = v.parse() {
                self.receiver.completion = m;
            }
        }
        if let Ok(v) = std::env::var("GLINT_RECEIVER__OUTPUT_DIR") {
            self.receiver.output_dir = PathBuf::from(v);
        }
    }
}

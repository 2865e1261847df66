//! Configuration system
//!
//! [`GfxConfig`] carries the tunables of the command/memory layer. Any
//! configuration type can be loaded from and saved to TOML or RON files
//! through the [`Config`] trait; the format is picked from the file extension.

use std::path::Path;
use std::time::Duration;

use ash::vk;
pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Supported on-disk formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// # Command and memory layer configuration
///
/// Shared by every object created from one [`crate::GfxContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GfxConfig {
    /// Upper bound for the fence wait in `CommandBuffer::record`, in
    /// milliseconds. `None` waits forever.
    pub fence_timeout_ms: Option<u64>,
    /// Hint the driver that pool allocations are short-lived
    pub transient_command_pools: bool,
    /// Bind to memory type 0 when no type satisfies a request instead of
    /// failing the allocation
    pub memory_type_fallback: bool,
    /// Log a warning whenever an oversized push constant is dropped
    pub push_constant_warnings: bool,
}

impl GfxConfig {
    /// Fence wait bound, `None` for an unbounded wait
    pub fn fence_timeout(&self) -> Option<Duration> {
        self.fence_timeout_ms.map(Duration::from_millis)
    }

    /// Builder-style setter for the fence wait bound
    #[must_use]
    pub fn with_fence_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fence_timeout_ms = timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Builder-style setter for the memory type fallback
    #[must_use]
    pub const fn with_memory_type_fallback(mut self, enabled: bool) -> Self {
        self.memory_type_fallback = enabled;
        self
    }

    /// Creation flags for every command pool of the registry
    ///
    /// `RESET_COMMAND_BUFFER` is always set: slots are re-begun without an
    /// explicit reset, and pools are shared by every buffer of a thread.
    pub fn command_pool_flags(&self) -> vk::CommandPoolCreateFlags {
        let mut flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        if self.transient_command_pools {
            flags |= vk::CommandPoolCreateFlags::TRANSIENT;
        }
        flags
    }
}

impl Default for GfxConfig {
    fn default() -> Self {
        Self {
            fence_timeout_ms: None,
            transient_command_pools: false,
            memory_type_fallback: false,
            push_constant_warnings: true,
        }
    }
}

impl Config for GfxConfig {}

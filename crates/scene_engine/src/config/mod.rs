//! Configuration system
//!
//! Engine settings are plain serde structs that can be loaded from and saved
//! to TOML or RON files through the [`Config`] trait.

pub use serde::{Deserialize, Serialize};

use crate::render::InstanceUniforms;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
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

    /// A value is out of its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// # Render Group Configuration
///
/// Every element queued in a render-group bucket owns one slot of the
/// bucket's uniform buffer. The slot size and the total uniform budget fix
/// how many elements a bucket can hold before a sibling bucket is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderGroupConfig {
    /// Bytes of uniform buffer available to one bucket
    pub uniform_budget_bytes: u64,
    /// Bytes reserved per element (already rounded to the device alignment)
    pub instance_slot_bytes: u64,
}

impl RenderGroupConfig {
    /// Maximum number of elements a single bucket may hold
    pub const fn capacity(&self) -> usize {
        if self.instance_slot_bytes == 0 {
            return 0;
        }
        (self.uniform_budget_bytes / self.instance_slot_bytes) as usize
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let record = std::mem::size_of::<InstanceUniforms>() as u64;
        if self.instance_slot_bytes < record {
            return Err(ConfigError::Invalid(format!(
                "instance slot of {} bytes cannot hold a {record}-byte instance record",
                self.instance_slot_bytes
            )));
        }
        if self.uniform_budget_bytes < self.instance_slot_bytes {
            return Err(ConfigError::Invalid(format!(
                "uniform budget of {} bytes is smaller than one {}-byte slot",
                self.uniform_budget_bytes, self.instance_slot_bytes
            )));
        }
        if self.uniform_budget_bytes > u64::from(u32::MAX) {
            return Err(ConfigError::Invalid(format!(
                "uniform budget of {} bytes exceeds the 32-bit dynamic offset range",
                self.uniform_budget_bytes
            )));
        }
        Ok(())
    }
}

impl Default for RenderGroupConfig {
    fn default() -> Self {
        Self {
            uniform_budget_bytes: 65_536,
            instance_slot_bytes: 256,
        }
    }
}

/// Culling switches for the cull traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    /// Master switch for frustum culling
    pub enabled: bool,
    /// Test each primitive set's own bound after the drawable passes
    pub primitive_set_culling: bool,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            primitive_set_culling: true,
        }
    }
}

/// # Engine Configuration
///
/// Top-level settings for the scene engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine
    pub log_level: String,
    /// Render group bucket sizing
    pub render_groups: RenderGroupConfig,
    /// Culling behaviour
    pub culling: CullingConfig,
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.is_empty() {
            return Err(ConfigError::Invalid("log level cannot be empty".to_string()));
        }
        self.render_groups.validate()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            render_groups: RenderGroupConfig::default(),
            culling: CullingConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

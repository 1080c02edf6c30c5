//! Configuration module

use crate::{client::ConflictPolicy, BindError, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Upload settings
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Connection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection used when a binding names none: a store URL, or the name of
    /// an environment variable holding one
    pub default: Option<String>,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Write buffer size in bytes (0 = every write is its own chunk)
    #[serde(default = "default_buffer_size", deserialize_with = "deserialize_size")]
    pub buffer_size: u64,
    /// What to do when the destination already exists
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

fn default_buffer_size() -> u64 {
    8 * 1024 * 1024 // 8MiB
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl UploadConfig {
    /// Buffer size as an in-memory capacity
    pub fn buffer_capacity(&self) -> usize {
        usize::try_from(self.buffer_size).unwrap_or(usize::MAX)
    }
}

/// Size given either as a number of bytes or as a string like "8MiB"
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Numeric(u64),
    String(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Numeric(bytes) => Ok(bytes),
        SizeValue::String(text) => parse_size(&text)
            .map_err(|e| D::Error::custom(format!("Failed to parse size: {}", e))),
    }
}

/// Parse size string like "100MiB" to bytes
pub fn parse_size(size_str: &str) -> Result<u64> {
    let size_str = size_str.trim();

    // Try to parse as plain number first
    if let Ok(bytes) = size_str.parse::<u64>() {
        return Ok(bytes);
    }

    // Find where the number ends and unit begins
    let split_pos = size_str
        .chars()
        .position(|c| !c.is_ascii_digit() && c != '.')
        .unwrap_or(size_str.len());

    if split_pos == 0 {
        return Err(BindError::Config(format!("Invalid size format: {}", size_str)));
    }

    let (number_part, unit_part) = size_str.split_at(split_pos);
    let number: f64 = number_part
        .parse()
        .map_err(|_| BindError::Config(format!("Invalid number in size: {}", number_part)))?;

    let multiplier: u64 = match unit_part.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "ki" | "kib" => 1_024,
        "mi" | "mib" => 1_048_576,
        "gi" | "gib" => 1_073_741_824,
        _ => {
            return Err(BindError::Config(format!(
                "Unknown size unit: {}",
                unit_part
            )))
        }
    };

    Ok((number * multiplier as f64) as u64)
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir().ok_or_else(|| {
            BindError::Config("Unable to determine config directory".to_string())
        })?;

        let app_dir = config_dir.join("dropbind");
        if !app_dir.exists() {
            fs::create_dir_all(&app_dir)?;
        }

        Ok(app_dir.join("config.toml"))
    }

    /// Get default configuration content with examples
    pub fn default_config_content() -> String {
        r#"# Dropbind Configuration File

[connection]
# Store URL used when a binding names no connection, e.g. "file:///srv/files"
# or "s3://bucket/prefix". A value without "://" names an environment
# variable that holds the URL.
# default = "DROPBIND_CONNECTION"

[upload]
# Bytes collected before a chunk is sent ("8MiB", "512KiB" or a number).
# 0 sends every write as its own chunk.
buffer_size = "8MiB"
# "overwrite" replaces an existing destination, "fail" keeps it
conflict_policy = "overwrite"
"#
        .to_string()
    }

    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            fs::write(&path, Self::default_config_content())?;
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| BindError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| BindError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Load configuration or use defaults if loading fails
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

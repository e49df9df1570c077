use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use wgpu::TextureFormat;

use crate::gpu::context::{self, ContextOptions};
use crate::gpu::format;
use crate::image_io::THUMB_SIZE;

#[derive(Debug, Default, Serialize, Deserialize)]
/// Persisted settings for the texconv tool.
pub struct ToolConfig {
    pub thumbnail_size: Option<u32>,
    pub thumbnail_cache_dir: Option<PathBuf>,
    pub power_preference: Option<String>,
    pub allow_software_adapter: Option<bool>,
    pub default_format: Option<String>,
}

impl ToolConfig {
    /// Returns the user config file path, if a config directory is available.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("texconv").join("config.toml"))
    }

    /// Loads config from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Self {
        toml::from_str(contents).unwrap_or_else(|err| {
            tracing::warn!(%err, "ignoring malformed config");
            Self::default()
        })
    }

    /// Writes config to disk, ignoring filesystem/serialization errors.
    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(s) = toml::to_string_pretty(self) {
            let _ = std::fs::write(&path, s);
        }
    }

    pub fn thumbnail_size(&self) -> u32 {
        self.thumbnail_size.filter(|s| *s > 0).unwrap_or(THUMB_SIZE)
    }

    /// Configured cache directory, else the platform cache dir.
    pub fn thumbnail_cache_dir(&self) -> PathBuf {
        self.thumbnail_cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("texconv").join("thumbnails")))
            .unwrap_or_else(|| PathBuf::from(".texconv-thumbnails"))
    }

    /// Output format used when none is given on the command line.
    pub fn default_format(&self) -> TextureFormat {
        self.default_format
            .as_deref()
            .and_then(format::parse)
            .unwrap_or(TextureFormat::Rgba8Unorm)
    }

    /// Adapter options from the config file, overridden by the environment.
    pub fn context_options(&self) -> ContextOptions {
        let mut options = ContextOptions::default();
        if let Some(pref) = self
            .power_preference
            .as_deref()
            .and_then(context::parse_power_preference)
        {
            options.power_preference = pref;
        }
        if let Some(allow) = self.allow_software_adapter {
            options.allow_software_adapter = allow;
        }
        options.with_env_overrides()
    }
}

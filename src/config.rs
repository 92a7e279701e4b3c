// Configuration - load settings from config.toml
//
// Provides sensible defaults if the config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub engine: EngineConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Cobalt".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Engine settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target update (input/tick) rate, decoupled from render rate
    pub updates_per_second: u32,
    pub validation_enabled: bool,
    pub vsync_enabled: bool,
    /// Requested swap-chain depth; clamped to surface capabilities
    pub image_count: u32,
    /// Preferred adapter name; empty picks the first suitable adapter
    pub device_name: String,
    /// Vulkan API version to request ("1.0" through "1.3")
    pub api_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            updates_per_second: 30,
            validation_enabled: true,
            vsync_enabled: true,
            image_count: 3,
            device_name: String::new(),
            api_version: "1.1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }
}

impl EngineConfig {
    /// Present mode derived from the vsync setting.
    /// FIFO is the only mode with guaranteed support.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        if self.vsync_enabled {
            vk::PresentModeKHR::FIFO
        } else {
            vk::PresentModeKHR::IMMEDIATE
        }
    }

    /// Packed Vulkan API version to request at instance creation
    pub fn api_version(&self) -> u32 {
        match self.api_version.as_str() {
            "1.0" => vk::API_VERSION_1_0,
            "1.1" => vk::API_VERSION_1_1,
            "1.2" => vk::API_VERSION_1_2,
            "1.3" => vk::API_VERSION_1_3,
            other => {
                log::warn!("Unknown api_version '{}', defaulting to 1.1", other);
                vk::API_VERSION_1_1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_section_missing() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.engine.updates_per_second, 30);
        assert_eq!(config.engine.image_count, 3);
        assert!(config.engine.vsync_enabled);
        assert!(config.engine.device_name.is_empty());
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn parses_engine_section() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            updates_per_second = 60
            vsync_enabled = false
            image_count = 2
            device_name = "Radeon"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.updates_per_second, 60);
        assert_eq!(config.engine.image_count, 2);
        assert_eq!(config.engine.device_name, "Radeon");
        assert_eq!(config.engine.present_mode(), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn api_version_mapping() {
        let mut engine = EngineConfig::default();
        assert_eq!(engine.api_version(), vk::API_VERSION_1_1);
        engine.api_version = "1.3".to_string();
        assert_eq!(engine.api_version(), vk::API_VERSION_1_3);
        engine.api_version = "2.0".to_string();
        assert_eq!(engine.api_version(), vk::API_VERSION_1_1);
    }

    #[test]
    fn vsync_selects_fifo() {
        let engine = EngineConfig::default();
        assert_eq!(engine.present_mode(), vk::PresentModeKHR::FIFO);
    }
}

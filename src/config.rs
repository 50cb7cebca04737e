use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::monitor::{MonitorConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_SETTLE_DELAY};
use crate::pixel::validate_brightness;

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Raspberry Pi GPIO through rppal.
    Rpi,
    /// In-memory recorder, nothing touches hardware.
    Memory,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub brightness: Option<f64>,
    pub idle_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub backend: Backend,
}

impl Config {
    pub fn defaults() -> Self {
        Self {
            brightness: None,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT.as_millis() as u64,
            settle_delay_ms: DEFAULT_SETTLE_DELAY.as_millis() as u64,
            backend: Backend::Rpi,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        if let Some(brightness) = config.brightness {
            validate_brightness(brightness)?;
        }
        Ok(config)
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

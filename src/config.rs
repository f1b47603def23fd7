//! Load-time parameters.
//!
//! Values come from an optional JSON file, then from `name=value` arguments
//! which override it, the way module parameters are passed to `insmod`.

use crate::error::ConfigError;
use log::LevelFilter;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_GPIO_LED: u32 = 21;
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:44210";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// GPIO character device.
    Cdev,
    /// Legacy `/sys/class/gpio`.
    Sysfs,
    /// In-process lines, no hardware.
    Memory,
}

impl Backend {
    fn parse(value: &str) -> Option<Backend> {
        match value {
            "cdev" => Some(Backend::Cdev),
            "sysfs" => Some(Backend::Sysfs),
            "memory" => Some(Backend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadParams {
    #[serde(rename = "gpioLED")]
    pub gpio_led: u32,
    #[serde(rename = "blinkPeriod")]
    pub blink_period: u32,
    #[serde(rename = "gpioChip")]
    pub gpio_chip: String,
    pub backend: Backend,
    #[serde(rename = "control")]
    pub control_addr: String,
    #[serde(rename = "logLevel")]
    pub log_level: String,
}

/// Parameter names and their descriptions, for `--help`.
pub const PARAM_DESCRIPTIONS: &[(&str, &str)] = &[
    ("gpioLED", "GPIO LED number (default=21)"),
    (
        "blinkPeriod",
        "LED blink period in ms (min=1, default=1000, max=10000)",
    ),
    ("gpioChip", "GPIO character device (default=/dev/gpiochip0)"),
    ("backend", "GPIO backend: cdev, sysfs or memory"),
    ("control", "UDP address of the control endpoint (default=127.0.0.1:44210)"),
    ("logLevel", "off, error, warn, info, debug or trace (default=info)"),
];

impl Default for LoadParams {
    fn default() -> Self {
        LoadParams {
            gpio_led: DEFAULT_GPIO_LED,
            blink_period: crate::core_led::state::DEFAULT_PERIOD_MS,
            gpio_chip: DEFAULT_GPIO_CHIP.to_string(),
            backend: crate::platform::DEFAULT_BACKEND,
            control_addr: DEFAULT_CONTROL_ADDR.to_string(),
            log_level: "info".to_string(),
        }
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

impl LoadParams {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::File(e.to_string()))
    }

    /// Applies one `name=value` argument.
    pub fn apply(&mut self, arg: &str) -> Result<(), ConfigError> {
        let (name, value) = arg
            .split_once('=')
            .ok_or_else(|| ConfigError::UnknownParam(arg.to_string()))?;
        match name {
            "gpioLED" => self.gpio_led = value.parse().map_err(|_| invalid(name, value))?,
            "blinkPeriod" => {
                self.blink_period = value.parse().map_err(|_| invalid(name, value))?
            }
            "gpioChip" => self.gpio_chip = value.to_string(),
            "backend" => self.backend = Backend::parse(value).ok_or_else(|| invalid(name, value))?,
            "control" => self.control_addr = value.to_string(),
            "logLevel" => {
                value
                    .parse::<LevelFilter>()
                    .map_err(|_| invalid(name, value))?;
                self.log_level = value.to_string();
            }
            _ => return Err(ConfigError::UnknownParam(name.to_string())),
        }
        Ok(())
    }

    /// Builds the parameters from command-line arguments: an optional
    /// `--config <file>` followed by `name=value` overrides.
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = LoadParams::default();
        let mut overrides = Vec::new();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            if arg == "--config" {
                let path = args
                    .next()
                    .ok_or_else(|| invalid("--config", ""))?;
                params = Self::from_json_file(Path::new(path.as_ref()))?;
            } else {
                overrides.push(arg.to_string());
            }
        }
        for arg in &overrides {
            params.apply(arg)?;
        }
        Ok(params)
    }

    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    pub fn describe() -> String {
        PARAM_DESCRIPTIONS
            .iter()
            .map(|(name, desc)| format!("  {:<12} {}\n", name, desc))
            .collect()
    }
}

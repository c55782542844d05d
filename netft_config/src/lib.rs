//! Typed preferences for the netft stack.
//!
//! The GUI/CLI collaborators persist this structure externally (TOML); the
//! core consumes it through the `From` bridges in `netft_core::conversions`.
//! Every group has serde defaults so a partial file deserializes cleanly, and
//! `Preferences::validate` enforces the documented ranges before anything is
//! handed to the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Connection {
    pub last_ip: String,
    pub udp_port: u16,
    pub tcp_port: u16,
    pub http_port: u16,
    pub connect_timeout_ms: u64,
    pub auto_reconnect: bool,
    pub discovery_subnets: Vec<String>,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            last_ip: String::new(),
            udp_port: 49152,
            tcp_port: 49151,
            http_port: 80,
            connect_timeout_ms: 2000,
            auto_reconnect: true,
            discovery_subnets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Visualization {
    /// Channel names from {Fx, Fy, Fz, Tx, Ty, Tz}.
    pub channels_enabled: Vec<String>,
    /// Plot window in seconds, within [1, 604800] (1 s to 7 days).
    pub time_window_seconds: f64,
    pub y_autoscale: bool,
    pub y_manual_min: Option<f64>,
    pub y_manual_max: Option<f64>,
    pub show_grid: bool,
    pub show_crosshair: bool,
    pub max_points_per_channel: usize,
}

impl Default for Visualization {
    fn default() -> Self {
        Self {
            channels_enabled: vec!["Fx".into(), "Fy".into(), "Fz".into()],
            time_window_seconds: 10.0,
            y_autoscale: true,
            y_manual_min: None,
            y_manual_max: None,
            show_grid: true,
            show_crosshair: false,
            max_points_per_channel: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceUnit {
    #[serde(alias = "N")]
    N,
    Lbf,
    Kgf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TorqueUnit {
    #[serde(alias = "Nm")]
    Nm,
    #[serde(alias = "Nmm")]
    Nmm,
    LbfIn,
    LbfFt,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Units {
    pub force: ForceUnit,
    pub torque: TorqueUnit,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            force: ForceUnit::N,
            torque: TorqueUnit::Nm,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Filtering {
    pub enabled: bool,
    /// Low-pass cutoff in Hz, within [0.7, 120].
    pub cutoff_hz: f64,
}

impl Default for Filtering {
    fn default() -> Self {
        Self {
            enabled: false,
            cutoff_hz: 120.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasMode {
    Device,
    Soft,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Bias {
    pub mode: BiasMode,
}

impl Default for Bias {
    fn default() -> Self {
        Self {
            mode: BiasMode::Device,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Csv,
    Tsv,
    ExcelCompatible,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    pub output_directory: String,
    pub filename_prefix: String,
    pub format: LogFormat,
    pub flush_interval_ms: u64,
    /// Keep every Nth datagram; 1 = full rate. Full-fidelity logging
    /// requires 1.
    pub decimation_factor: u32,
    pub rotation_enabled: bool,
    pub rotation_size_bytes: u64,
    pub rotation_time_minutes: u64,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            output_directory: String::new(),
            filename_prefix: String::new(),
            format: LogFormat::Csv,
            flush_interval_ms: 250,
            decimation_factor: 1,
            rotation_enabled: true,
            rotation_size_bytes: 2_000_000_000,
            rotation_time_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ToolTransform {
    pub dx_mm: f64,
    pub dy_mm: f64,
    pub dz_mm: f64,
    pub rx_deg: f64,
    pub ry_deg: f64,
    pub rz_deg: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Preferences {
    pub connection: Connection,
    pub visualization: Visualization,
    pub units: Units,
    pub filtering: Filtering,
    pub bias: Bias,
    pub logging: Logging,
    pub tool_transform: ToolTransform,
}

const VALID_CHANNELS: [&str; 6] = ["Fx", "Fy", "Fz", "Tx", "Ty", "Tz"];

impl Preferences {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1.0..=604_800.0).contains(&self.visualization.time_window_seconds) {
            return Err(ConfigError::Invalid(
                "time_window_seconds must be in [1, 604800]",
            ));
        }
        if self.visualization.max_points_per_channel == 0 {
            return Err(ConfigError::Invalid("max_points_per_channel must be > 0"));
        }
        for ch in &self.visualization.channels_enabled {
            if !VALID_CHANNELS.contains(&ch.as_str()) {
                return Err(ConfigError::Invalid(
                    "channels_enabled entries must be one of Fx, Fy, Fz, Tx, Ty, Tz",
                ));
            }
        }
        if let (Some(lo), Some(hi)) = (
            self.visualization.y_manual_min,
            self.visualization.y_manual_max,
        ) {
            if lo >= hi {
                return Err(ConfigError::Invalid("manual Y range must have min < max"));
            }
        }
        if !(0.7..=120.0).contains(&self.filtering.cutoff_hz) {
            return Err(ConfigError::Invalid("cutoff_hz must be in [0.7, 120]"));
        }
        if self.logging.decimation_factor == 0 {
            return Err(ConfigError::Invalid("decimation_factor must be >= 1"));
        }
        if self.logging.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid("flush_interval_ms must be >= 1"));
        }
        if self.logging.rotation_enabled {
            if self.logging.rotation_size_bytes == 0 {
                return Err(ConfigError::Invalid("rotation_size_bytes must be > 0"));
            }
            if self.logging.rotation_time_minutes == 0 {
                return Err(ConfigError::Invalid("rotation_time_minutes must be > 0"));
            }
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect_timeout_ms must be >= 1"));
        }
        Ok(())
    }
}

pub fn load_toml(s: &str) -> Result<Preferences, toml::de::Error> {
    toml::from_str::<Preferences>(s)
}

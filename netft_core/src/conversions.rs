//! `From` implementations bridging `netft_config` types to core types.
//!
//! These keep the preference schema serde-only and the pipeline types plain,
//! with the field-by-field mapping in one place instead of scattered through
//! the CLI.

use std::time::Duration;

use crate::filter::FilterCfg;
use crate::formats::LogFormat;
use crate::receiver::ReceiverCfg;
use crate::supervisor::{BiasMode, SupervisorCfg};
use crate::units::{ForceUnit, TorqueUnit};
use crate::writer::{RotationPolicy, WriterCfg};

// ── Units ────────────────────────────────────────────────────────────────────

impl From<netft_config::ForceUnit> for ForceUnit {
    fn from(u: netft_config::ForceUnit) -> Self {
        match u {
            netft_config::ForceUnit::N => ForceUnit::N,
            netft_config::ForceUnit::Lbf => ForceUnit::Lbf,
            netft_config::ForceUnit::Kgf => ForceUnit::Kgf,
        }
    }
}

impl From<netft_config::TorqueUnit> for TorqueUnit {
    fn from(u: netft_config::TorqueUnit) -> Self {
        match u {
            netft_config::TorqueUnit::Nm => TorqueUnit::Nm,
            netft_config::TorqueUnit::Nmm => TorqueUnit::Nmm,
            netft_config::TorqueUnit::LbfIn => TorqueUnit::LbfIn,
            netft_config::TorqueUnit::LbfFt => TorqueUnit::LbfFt,
        }
    }
}

// ── Formats ──────────────────────────────────────────────────────────────────

impl From<netft_config::LogFormat> for LogFormat {
    fn from(f: netft_config::LogFormat) -> Self {
        match f {
            netft_config::LogFormat::Csv => LogFormat::Csv,
            netft_config::LogFormat::Tsv => LogFormat::Tsv,
            netft_config::LogFormat::ExcelCompatible => LogFormat::ExcelCompatible,
        }
    }
}

// ── Bias ─────────────────────────────────────────────────────────────────────

impl From<netft_config::BiasMode> for BiasMode {
    fn from(m: netft_config::BiasMode) -> Self {
        match m {
            netft_config::BiasMode::Device => BiasMode::Device,
            netft_config::BiasMode::Soft => BiasMode::Soft,
        }
    }
}

// ── Filtering ────────────────────────────────────────────────────────────────

impl From<&netft_config::Filtering> for FilterCfg {
    fn from(f: &netft_config::Filtering) -> Self {
        Self {
            enabled: f.enabled,
            cutoff_hz: f.cutoff_hz,
        }
    }
}

// ── Logging → writer ─────────────────────────────────────────────────────────

impl From<&netft_config::Logging> for WriterCfg {
    fn from(l: &netft_config::Logging) -> Self {
        Self {
            format: l.format.into(),
            flush_interval: Duration::from_millis(l.flush_interval_ms.max(1)),
            rotation: if l.rotation_enabled {
                RotationPolicy::Enabled {
                    max_bytes: l.rotation_size_bytes,
                    max_age: Duration::from_secs(l.rotation_time_minutes * 60),
                }
            } else {
                RotationPolicy::Disabled
            },
            ..Self::default()
        }
    }
}

// ── Preferences → supervisor ─────────────────────────────────────────────────

impl From<&netft_config::Preferences> for SupervisorCfg {
    fn from(p: &netft_config::Preferences) -> Self {
        Self {
            udp_port: p.connection.udp_port,
            tcp_port: p.connection.tcp_port,
            http_port: p.connection.http_port,
            connect_timeout: Duration::from_millis(p.connection.connect_timeout_ms.max(1)),
            auto_reconnect: p.connection.auto_reconnect,
            receiver: ReceiverCfg {
                decimation_factor: p.logging.decimation_factor.max(1),
                ..ReceiverCfg::default()
            },
            filter: (&p.filtering).into(),
            force_unit: p.units.force.into(),
            torque_unit: p.units.torque.into(),
            writer: (&p.logging).into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_round_trip_into_supervisor_cfg() {
        let prefs = netft_config::load_toml(
            r#"
            [connection]
            udp_port = 50000
            connect_timeout_ms = 750
            auto_reconnect = false

            [units]
            force = "kgf"
            torque = "nmm"

            [filtering]
            enabled = true
            cutoff_hz = 15.0

            [logging]
            format = "tsv"
            decimation_factor = 10
            flush_interval_ms = 100
            rotation_enabled = true
            rotation_size_bytes = 1024
            rotation_time_minutes = 5
            "#,
        )
        .unwrap();
        let cfg = SupervisorCfg::from(&prefs);
        assert_eq!(cfg.udp_port, 50000);
        assert_eq!(cfg.connect_timeout, Duration::from_millis(750));
        assert!(!cfg.auto_reconnect);
        assert_eq!(cfg.receiver.decimation_factor, 10);
        assert!(cfg.filter.enabled);
        assert_eq!(cfg.filter.cutoff_hz, 15.0);
        assert_eq!(cfg.force_unit, ForceUnit::Kgf);
        assert_eq!(cfg.torque_unit, TorqueUnit::Nmm);
        assert_eq!(cfg.writer.format, LogFormat::Tsv);
        assert_eq!(cfg.writer.flush_interval, Duration::from_millis(100));
        match cfg.writer.rotation {
            RotationPolicy::Enabled { max_bytes, max_age } => {
                assert_eq!(max_bytes, 1024);
                assert_eq!(max_age, Duration::from_secs(300));
            }
            RotationPolicy::Disabled => panic!("rotation should be enabled"),
        }
    }

    #[test]
    fn disabled_rotation_maps_to_disabled_policy() {
        let mut prefs = netft_config::Preferences::default();
        prefs.logging.rotation_enabled = false;
        let cfg: WriterCfg = (&prefs.logging).into();
        assert!(matches!(cfg.rotation, RotationPolicy::Disabled));
    }
}

//! Shared data models for sensor samples and calibration.

use crate::error::{ProtoError, Result};

/// A single force/torque sample as received from the RDT stream.
///
/// `counts` is always in the fixed order [Fx, Fy, Fz, Tx, Ty, Tz]. The
/// derived SI fields are `None` until the processing stage converts the
/// sample; once set they are canonical newtons / newton-meters. Records are
/// immutable after creation and stored by value everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    /// Monotonic reception timestamp in nanoseconds (process-lifetime epoch).
    pub t_mono_ns: u64,
    /// RDT packet sequence number, used for packet-loss detection.
    pub rdt_sequence: u32,
    /// Internal sensor sample sequence number.
    pub ft_sequence: u32,
    /// Sensor status word.
    pub status: u32,
    /// Raw counts [Fx, Fy, Fz, Tx, Ty, Tz].
    pub counts: [i32; 6],
    /// Converted force in newtons [Fx, Fy, Fz], if processed.
    pub force_n: Option<[f64; 3]>,
    /// Converted torque in newton-meters [Tx, Ty, Tz], if processed.
    pub torque_nm: Option<[f64; 3]>,
}

impl SampleRecord {
    /// Construct a raw (unconverted) record.
    pub fn raw(t_mono_ns: u64, rdt_sequence: u32, ft_sequence: u32, status: u32, counts: [i32; 6]) -> Self {
        Self {
            t_mono_ns,
            rdt_sequence,
            ft_sequence,
            status,
            counts,
            force_n: None,
            torque_nm: None,
        }
    }
}

/// Calibration scale factors and identity read from the sensor.
///
/// Construct through [`CalibrationInfo::new`]; `cpf`/`cpt` are validated
/// strictly positive and finite so every downstream division is well-defined.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationInfo {
    /// Raw counts per newton.
    pub counts_per_force: f64,
    /// Raw counts per newton-meter.
    pub counts_per_torque: f64,
    pub serial: Option<String>,
    pub firmware: Option<String>,
    /// Sensor force unit code (1=lbf, 2=N, 5=kgf).
    pub force_units_code: Option<u8>,
    /// Sensor torque unit code (1=lbf-in, 2=lbf-ft, 3=N-m, 4=N-mm).
    pub torque_units_code: Option<u8>,
}

impl CalibrationInfo {
    pub fn new(counts_per_force: f64, counts_per_torque: f64) -> Result<Self> {
        if !(counts_per_force.is_finite() && counts_per_force > 0.0) {
            return Err(ProtoError::InvalidCalibration {
                field: "counts_per_force",
                value: counts_per_force.to_string(),
            });
        }
        if !(counts_per_torque.is_finite() && counts_per_torque > 0.0) {
            return Err(ProtoError::InvalidCalibration {
                field: "counts_per_torque",
                value: counts_per_torque.to_string(),
            });
        }
        Ok(Self {
            counts_per_force,
            counts_per_torque,
            serial: None,
            firmware: None,
            force_units_code: None,
            torque_units_code: None,
        })
    }

    /// Convert six raw counts to SI force and torque.
    pub fn convert_counts(&self, counts: &[i32; 6]) -> ([f64; 3], [f64; 3]) {
        let force = [
            f64::from(counts[0]) / self.counts_per_force,
            f64::from(counts[1]) / self.counts_per_force,
            f64::from(counts[2]) / self.counts_per_force,
        ];
        let torque = [
            f64::from(counts[3]) / self.counts_per_torque,
            f64::from(counts[4]) / self.counts_per_torque,
            f64::from(counts[5]) / self.counts_per_torque,
        ];
        (force, torque)
    }
}

/// Tool transform parameters: distances in mm, angles in degrees.
///
/// Encoded on the wire as int16 value*100; values outside +/-327.67 cannot be
/// represented and are rejected by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ToolTransform {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl ToolTransform {
    pub fn as_array(&self) -> [f64; 6] {
        [self.dx, self.dy, self.dz, self.rx, self.ry, self.rz]
    }
}

impl From<&netft_config::ToolTransform> for ToolTransform {
    fn from(t: &netft_config::ToolTransform) -> Self {
        Self {
            dx: t.dx_mm,
            dy: t.dy_mm,
            dz: t.dz_mm,
            rx: t.rx_deg,
            ry: t.ry_deg,
            rz: t.rz_deg,
        }
    }
}

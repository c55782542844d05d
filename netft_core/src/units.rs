//! Display unit conversion for force and torque.
//!
//! Canonical internal units are newtons and newton-meters; conversion to the
//! configured display units happens only at the egress boundary (log rows,
//! plot series labels).

/// Newtons per pound-force (exact definition).
pub const N_PER_LBF: f64 = 4.448_221_615_260_5;
/// Newtons per kilogram-force (standard gravity, exact definition).
pub const N_PER_KGF: f64 = 9.806_65;
/// Meters per inch / per foot, for the torque compounds.
const M_PER_IN: f64 = 0.0254;
const M_PER_FT: f64 = 0.3048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceUnit {
    N,
    Lbf,
    Kgf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorqueUnit {
    Nm,
    Nmm,
    LbfIn,
    LbfFt,
}

impl ForceUnit {
    /// Newtons per one of this unit.
    fn factor(self) -> f64 {
        match self {
            ForceUnit::N => 1.0,
            ForceUnit::Lbf => N_PER_LBF,
            ForceUnit::Kgf => N_PER_KGF,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ForceUnit::N => "N",
            ForceUnit::Lbf => "lbf",
            ForceUnit::Kgf => "kgf",
        }
    }

    /// Map a sensor force unit code (1=lbf, 2=N, 5=kgf).
    pub fn from_sensor_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ForceUnit::Lbf),
            2 => Some(ForceUnit::N),
            5 => Some(ForceUnit::Kgf),
            _ => None,
        }
    }
}

impl TorqueUnit {
    /// Newton-meters per one of this unit.
    fn factor(self) -> f64 {
        match self {
            TorqueUnit::Nm => 1.0,
            TorqueUnit::Nmm => 1e-3,
            TorqueUnit::LbfIn => N_PER_LBF * M_PER_IN,
            TorqueUnit::LbfFt => N_PER_LBF * M_PER_FT,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TorqueUnit::Nm => "Nm",
            TorqueUnit::Nmm => "Nmm",
            TorqueUnit::LbfIn => "lbf-in",
            TorqueUnit::LbfFt => "lbf-ft",
        }
    }

    /// Map a sensor torque unit code (1=lbf-in, 2=lbf-ft, 3=N-m, 4=N-mm).
    pub fn from_sensor_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(TorqueUnit::LbfIn),
            2 => Some(TorqueUnit::LbfFt),
            3 => Some(TorqueUnit::Nm),
            4 => Some(TorqueUnit::Nmm),
            _ => None,
        }
    }
}

pub fn force_from_newtons(newtons: f64, unit: ForceUnit) -> f64 {
    newtons / unit.factor()
}

pub fn force_to_newtons(value: f64, unit: ForceUnit) -> f64 {
    value * unit.factor()
}

pub fn torque_from_newton_meters(newton_meters: f64, unit: TorqueUnit) -> f64 {
    newton_meters / unit.factor()
}

pub fn torque_to_newton_meters(value: f64, unit: TorqueUnit) -> f64 {
    value * unit.factor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtons_to_lbf_uses_exact_factor() {
        assert!((force_from_newtons(4.448_221_615_260_5, ForceUnit::Lbf) - 1.0).abs() < 1e-12);
        assert!((force_from_newtons(9.806_65, ForceUnit::Kgf) - 1.0).abs() < 1e-12);
        assert_eq!(force_from_newtons(2.5, ForceUnit::N), 2.5);
    }

    #[test]
    fn torque_compound_factors() {
        assert!((torque_from_newton_meters(1.0, TorqueUnit::Nmm) - 1000.0).abs() < 1e-9);
        // 1 lbf-in = 0.1129848290276167 N-m
        assert!((torque_to_newton_meters(1.0, TorqueUnit::LbfIn) - 0.112_984_829_027_616_7).abs() < 1e-12);
        // 1 lbf-ft = 1.3558179483314004 N-m
        assert!((torque_to_newton_meters(1.0, TorqueUnit::LbfFt) - 1.355_817_948_331_400_4).abs() < 1e-12);
    }

    #[test]
    fn round_trip_is_identity() {
        for unit in [ForceUnit::N, ForceUnit::Lbf, ForceUnit::Kgf] {
            let v = force_to_newtons(force_from_newtons(12.34, unit), unit);
            assert!((v - 12.34).abs() < 1e-12);
        }
        for unit in [TorqueUnit::Nm, TorqueUnit::Nmm, TorqueUnit::LbfIn, TorqueUnit::LbfFt] {
            let v = torque_to_newton_meters(torque_from_newton_meters(-0.56, unit), unit);
            assert!((v - -0.56).abs() < 1e-12);
        }
    }

    #[test]
    fn sensor_codes_map_to_units() {
        assert_eq!(ForceUnit::from_sensor_code(2), Some(ForceUnit::N));
        assert_eq!(ForceUnit::from_sensor_code(1), Some(ForceUnit::Lbf));
        assert_eq!(ForceUnit::from_sensor_code(5), Some(ForceUnit::Kgf));
        assert_eq!(ForceUnit::from_sensor_code(3), None);
        assert_eq!(TorqueUnit::from_sensor_code(3), Some(TorqueUnit::Nm));
        assert_eq!(TorqueUnit::from_sensor_code(4), Some(TorqueUnit::Nmm));
        assert_eq!(TorqueUnit::from_sensor_code(9), None);
    }
}

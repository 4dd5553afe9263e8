//! Altitude unit conversion for display.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::resolver::HeightKind;

/// Feet per kilometre.
pub const FEET_PER_KM: f64 = 3280.84;
/// Metres per kilometre.
pub const METERS_PER_KM: f64 = 1000.0;

/// Output units. `gp` variants label geopotential heights and share the
/// conversion factor of their geometric counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudeUnit {
    Km,
    M,
    Ft,
    Gpkm,
    Gpm,
    Gpft,
}

impl AltitudeUnit {
    /// Multiplier from kilometres to this unit.
    pub fn factor(self) -> f64 {
        match self {
            AltitudeUnit::Km | AltitudeUnit::Gpkm => 1.0,
            AltitudeUnit::M | AltitudeUnit::Gpm => METERS_PER_KM,
            AltitudeUnit::Ft | AltitudeUnit::Gpft => FEET_PER_KM,
        }
    }

    pub fn is_geopotential(self) -> bool {
        matches!(
            self,
            AltitudeUnit::Gpkm | AltitudeUnit::Gpm | AltitudeUnit::Gpft
        )
    }

    /// The label variant matching a height kind.
    pub fn with_height_kind(self, kind: HeightKind) -> Self {
        match (self, kind) {
            (AltitudeUnit::Km | AltitudeUnit::Gpkm, HeightKind::Geometric) => AltitudeUnit::Km,
            (AltitudeUnit::M | AltitudeUnit::Gpm, HeightKind::Geometric) => AltitudeUnit::M,
            (AltitudeUnit::Ft | AltitudeUnit::Gpft, HeightKind::Geometric) => AltitudeUnit::Ft,
            (AltitudeUnit::Km | AltitudeUnit::Gpkm, HeightKind::Geopotential) => AltitudeUnit::Gpkm,
            (AltitudeUnit::M | AltitudeUnit::Gpm, HeightKind::Geopotential) => AltitudeUnit::Gpm,
            (AltitudeUnit::Ft | AltitudeUnit::Gpft, HeightKind::Geopotential) => AltitudeUnit::Gpft,
        }
    }

    pub fn km_to_unit(self, value_km: f64) -> f64 {
        value_km * self.factor()
    }

    pub fn unit_to_km(self, value: f64) -> f64 {
        value / self.factor()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AltitudeUnit::Km => "km",
            AltitudeUnit::M => "m",
            AltitudeUnit::Ft => "ft",
            AltitudeUnit::Gpkm => "gpkm",
            AltitudeUnit::Gpm => "gpm",
            AltitudeUnit::Gpft => "gpft",
        }
    }
}

/// Convert kilometres into `unit`.
pub fn convert(value_km: f64, unit: AltitudeUnit) -> f64 {
    unit.km_to_unit(value_km)
}

impl fmt::Display for AltitudeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized unit string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown altitude unit '{0}' (expected km, m, ft, gpkm, gpm or gpft)")]
pub struct UnknownUnit(pub String);

impl FromStr for AltitudeUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "km" => Ok(AltitudeUnit::Km),
            "m" => Ok(AltitudeUnit::M),
            "ft" | "feet" => Ok(AltitudeUnit::Ft),
            "gpkm" => Ok(AltitudeUnit::Gpkm),
            "gpm" => Ok(AltitudeUnit::Gpm),
            "gpft" => Ok(AltitudeUnit::Gpft),
            other => Err(UnknownUnit(other.to_string())),
        }
    }
}

//! Reverse density-altitude lookup.
//!
//! Walks a profile from the surface upward computing density altitude at
//! each level and interpolates the height at which the target is crossed.
//! Density altitude is assumed to increase with height. When an inversion
//! makes it non-monotonic the first crossing from the surface wins.

use serde::{Deserialize, Serialize};

use crate::error::{DaError, Result};
use crate::physics::{air_density, density_altitude_km, geopotential_to_geometric_km};
use crate::profile::{LevelSample, VerticalProfile};

/// Which height the resolver reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeightKind {
    #[default]
    Geometric,
    Geopotential,
}

impl HeightKind {
    pub fn from_geopotential_flag(report_geopotential: bool) -> Self {
        if report_geopotential {
            HeightKind::Geopotential
        } else {
            HeightKind::Geometric
        }
    }

    /// Convert a level's geopotential height (km) into this kind.
    pub fn height_km(self, geopotential_km: f64) -> Result<f64> {
        match self {
            HeightKind::Geopotential => Ok(geopotential_km),
            HeightKind::Geometric => geopotential_to_geometric_km(geopotential_km),
        }
    }
}

/// Whether to stop at the first crossing or compute every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    #[default]
    FirstCrossing,
    /// Records every level for display. The resolved altitude is the same.
    FullScan,
}

/// Computed values for one profile level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelDiagnostic {
    pub sample: LevelSample,
    pub density_g_m3: f64,
    pub density_altitude_km: f64,
    pub height_km: f64,
}

impl LevelDiagnostic {
    pub fn compute(sample: &LevelSample, height: HeightKind) -> Result<Self> {
        let density_g_m3 = air_density(
            sample.pressure_hpa,
            sample.temperature_k,
            sample.relative_humidity,
        )
        .map_err(|e| e.at_level(sample))?;
        let density_altitude_km =
            density_altitude_km(density_g_m3).map_err(|e| e.at_level(sample))?;
        let height_km = height
            .height_km(sample.geopotential_height_km())
            .map_err(|e| e.at_level(sample))?;

        Ok(Self {
            sample: *sample,
            density_g_m3,
            density_altitude_km,
            height_km,
        })
    }
}

/// One side of the interpolation bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub pressure_hpa: f64,
    pub density_altitude_km: f64,
    pub height_km: f64,
}

impl From<&LevelDiagnostic> for Bracket {
    fn from(level: &LevelDiagnostic) -> Self {
        Self {
            pressure_hpa: level.sample.pressure_hpa,
            density_altitude_km: level.density_altitude_km,
            height_km: level.height_km,
        }
    }
}

/// A resolved altitude and the levels it was interpolated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaResult {
    pub target_da_km: f64,
    pub height_km: f64,
    pub height_kind: HeightKind,
    pub lower: Bracket,
    pub upper: Bracket,
    /// Every level's values; empty unless resolved with [`ScanMode::FullScan`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<LevelDiagnostic>,
}

/// Where the target density altitude falls within a sequence of levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub lower: Bracket,
    pub upper: Bracket,
    pub height_km: f64,
}

/// Search surface-up levels for the first crossing of `target_da_km`.
///
/// A level whose density altitude equals the target resolves to that level's
/// height exactly.
pub fn find_crossing(levels: &[LevelDiagnostic], target_da_km: f64) -> Result<Crossing> {
    let mut prev: Option<&LevelDiagnostic> = None;

    for level in levels {
        if let Some(crossing) = check_level(prev, level, target_da_km)? {
            return Ok(crossing);
        }
        prev = Some(level);
    }

    Err(above_profile(prev, target_da_km))
}

fn check_level(
    prev: Option<&LevelDiagnostic>,
    level: &LevelDiagnostic,
    target_da_km: f64,
) -> Result<Option<Crossing>> {
    let da = level.density_altitude_km;

    if da == target_da_km {
        let exact = Bracket::from(level);
        return Ok(Some(Crossing {
            lower: prev.map(Bracket::from).unwrap_or(exact),
            upper: exact,
            height_km: level.height_km,
        }));
    }
    if da < target_da_km {
        return Ok(None);
    }

    match prev {
        None => Err(DaError::BelowProfile {
            target_da_km,
            lowest_da_km: da,
        }),
        Some(p) => {
            let fraction = (target_da_km - p.density_altitude_km) / (da - p.density_altitude_km);
            Ok(Some(Crossing {
                lower: Bracket::from(p),
                upper: Bracket::from(level),
                height_km: p.height_km + fraction * (level.height_km - p.height_km),
            }))
        }
    }
}

fn above_profile(top: Option<&LevelDiagnostic>, target_da_km: f64) -> DaError {
    DaError::AboveProfile {
        target_da_km,
        highest_da_km: top.map_or(f64::NAN, |l| l.density_altitude_km),
    }
}

/// Compute every level of a profile, surface first.
pub fn diagnose(profile: &VerticalProfile, height: HeightKind) -> Result<Vec<LevelDiagnostic>> {
    profile
        .levels()
        .iter()
        .map(|sample| LevelDiagnostic::compute(sample, height))
        .collect()
}

/// Resolves the altitude at which a profile reaches a target density altitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseResolver {
    pub mode: ScanMode,
    pub height: HeightKind,
}

impl ReverseResolver {
    pub fn new(mode: ScanMode, height: HeightKind) -> Self {
        Self { mode, height }
    }

    pub fn resolve(&self, profile: &VerticalProfile, target_da_km: f64) -> Result<DaResult> {
        if !target_da_km.is_finite() {
            return Err(DaError::domain(format!(
                "target density altitude {} is not finite",
                target_da_km
            )));
        }

        let (crossing, levels) = match self.mode {
            ScanMode::FirstCrossing => (self.scan_until_crossing(profile, target_da_km)?, Vec::new()),
            ScanMode::FullScan => {
                let crossing = self.scan_until_crossing(profile, target_da_km)?;
                (crossing, self.displayable_levels(profile))
            }
        };

        Ok(DaResult {
            target_da_km,
            height_km: crossing.height_km,
            height_kind: self.height,
            lower: crossing.lower,
            upper: crossing.upper,
            levels,
        })
    }

    fn scan_until_crossing(&self, profile: &VerticalProfile, target_da_km: f64) -> Result<Crossing> {
        let mut prev: Option<LevelDiagnostic> = None;

        for sample in profile.levels() {
            let level = LevelDiagnostic::compute(sample, self.height)?;
            if let Some(crossing) = check_level(prev.as_ref(), &level, target_da_km)? {
                return Ok(crossing);
            }
            prev = Some(level);
        }

        Err(above_profile(prev.as_ref(), target_da_km))
    }

    /// Levels from the surface up to the first one that cannot be computed.
    /// Levels above the crossing never affect the resolved altitude.
    fn displayable_levels(&self, profile: &VerticalProfile) -> Vec<LevelDiagnostic> {
        profile
            .levels()
            .iter()
            .map_while(|sample| LevelDiagnostic::compute(sample, self.height).ok())
            .collect()
    }
}

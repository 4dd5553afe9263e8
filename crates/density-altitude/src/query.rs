//! End-to-end query: locate, build, resolve, convert.

use serde::{Deserialize, Serialize};

use crate::error::{DaError, Result};
use crate::grid::GridIndex;
use crate::profile::{FieldLevel, ProfileBuilder, VerticalProfile};
use crate::resolver::{diagnose, DaResult, HeightKind, LevelDiagnostic, ReverseResolver, ScanMode};
use crate::units::AltitudeUnit;

/// Isobaric temperature, geopotential height and relative humidity levels
/// decoded from one model file.
#[derive(Debug, Clone, Default)]
pub struct IsobaricFields {
    /// Kelvin
    pub temperature: Vec<FieldLevel>,
    /// Geopotential metres
    pub height: Vec<FieldLevel>,
    /// Percent
    pub humidity: Vec<FieldLevel>,
}

impl IsobaricFields {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_empty() && self.height.is_empty() && self.humidity.is_empty()
    }

    /// Nearest cell to a query point, using the temperature grid.
    pub fn locate(&self, lat: f64, lon: f64) -> Result<GridIndex> {
        let first = self.temperature.first().ok_or_else(|| {
            DaError::InvalidGrid("no isobaric temperature levels decoded".to_string())
        })?;
        first.field.locate(lat, lon)
    }

    /// Surface-up profile at a cell.
    pub fn profile_at(&self, index: GridIndex) -> Result<VerticalProfile> {
        ProfileBuilder::build(&self.temperature, &self.height, &self.humidity, index)
    }

    /// Grid position (lat, lon) of a cell.
    pub fn coordinate_at(&self, index: GridIndex) -> Option<(f64, f64)> {
        self.temperature
            .first()
            .and_then(|level| level.field.coordinate_at(index))
    }
}

/// A pilot's question: at what altitude does density altitude reach `target_da_km`?
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DaQuery {
    pub target_da_km: f64,
    pub lat: f64,
    pub lon: f64,
    pub unit: AltitudeUnit,
    pub height_kind: HeightKind,
    #[serde(default)]
    pub verbose: bool,
}

impl DaQuery {
    /// Query with a target expressed in `unit`.
    pub fn new(target_da: f64, lat: f64, lon: f64, unit: AltitudeUnit) -> Self {
        let height_kind = if unit.is_geopotential() {
            HeightKind::Geopotential
        } else {
            HeightKind::Geometric
        };
        Self {
            target_da_km: unit.unit_to_km(target_da),
            lat,
            lon,
            unit,
            height_kind,
            verbose: false,
        }
    }

    pub fn with_height_kind(mut self, kind: HeightKind) -> Self {
        self.height_kind = kind;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn resolver(&self) -> ReverseResolver {
        let mode = if self.verbose {
            ScanMode::FullScan
        } else {
            ScanMode::FirstCrossing
        };
        ReverseResolver::new(mode, self.height_kind)
    }

    /// Resolve against a profile already extracted for the query point.
    pub fn resolve(&self, profile: &VerticalProfile) -> Result<DaResult> {
        self.resolver().resolve(profile, self.target_da_km)
    }

    /// Run the full lookup against decoded model fields.
    pub fn evaluate(&self, fields: &IsobaricFields) -> Result<DaReport> {
        let index = fields.locate(self.lat, self.lon)?;
        let profile = fields.profile_at(index)?;
        let result = self.resolve(&profile)?;
        let unit = self.unit.with_height_kind(self.height_kind);

        Ok(DaReport {
            altitude: unit.km_to_unit(result.height_km),
            unit,
            grid_index: index,
            grid_point: fields.coordinate_at(index),
            result,
        })
    }

    /// Per-level values at the query point for display, regardless of whether
    /// the target can be resolved.
    pub fn diagnose(&self, fields: &IsobaricFields) -> Result<Vec<LevelDiagnostic>> {
        let index = fields.locate(self.lat, self.lon)?;
        let profile = fields.profile_at(index)?;
        diagnose(&profile, self.height_kind)
    }
}

/// Resolved altitude expressed in the requested unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaReport {
    pub altitude: f64,
    pub unit: AltitudeUnit,
    pub grid_index: GridIndex,
    /// (lat, lon) of the selected cell
    pub grid_point: Option<(f64, f64)>,
    pub result: DaResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_converts_target_to_km() {
        let q = DaQuery::new(3280.84, 43.1, -89.5, AltitudeUnit::Ft);
        assert!((q.target_da_km - 1.0).abs() < 1e-12);
        assert_eq!(q.height_kind, HeightKind::Geometric);
    }

    #[test]
    fn test_geopotential_unit_selects_geopotential_height() {
        let q = DaQuery::new(1500.0, 43.1, -89.5, AltitudeUnit::Gpm);
        assert_eq!(q.height_kind, HeightKind::Geopotential);
        assert!((q.target_da_km - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_fields_is_invalid_grid() {
        let q = DaQuery::new(1.0, 43.1, -89.5, AltitudeUnit::Km);
        let err = q.evaluate(&IsobaricFields::default()).unwrap_err();
        assert!(matches!(err, DaError::InvalidGrid(_)));
    }
}

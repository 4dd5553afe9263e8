//! Vertical profiles assembled from isobaric grid fields.

use serde::{Deserialize, Serialize};

use crate::error::{DaError, Result};
use crate::grid::{GridField, GridIndex};

/// Atmospheric state at one pressure level of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSample {
    pub pressure_hpa: f64,
    pub temperature_k: f64,
    /// 0-1 fraction
    pub relative_humidity: f64,
    pub geopotential_height_m: f64,
}

impl LevelSample {
    /// Create a sample, checking the physical invariants.
    pub fn new(
        pressure_hpa: f64,
        temperature_k: f64,
        relative_humidity: f64,
        geopotential_height_m: f64,
    ) -> Result<Self> {
        let sample = Self {
            pressure_hpa,
            temperature_k,
            relative_humidity,
            geopotential_height_m,
        };

        let finite = pressure_hpa.is_finite()
            && temperature_k.is_finite()
            && relative_humidity.is_finite()
            && geopotential_height_m.is_finite();
        if !finite {
            return Err(DaError::domain("level contains non-finite values").at_level(&sample));
        }
        if pressure_hpa <= 0.0 {
            return Err(DaError::domain("pressure must be positive").at_level(&sample));
        }
        if temperature_k <= 0.0 {
            return Err(DaError::domain("temperature must be positive").at_level(&sample));
        }
        if !(0.0..=1.0).contains(&relative_humidity) {
            return Err(DaError::domain("relative humidity outside 0-1").at_level(&sample));
        }

        Ok(sample)
    }

    /// Geopotential height in km.
    pub fn geopotential_height_km(&self) -> f64 {
        self.geopotential_height_m / 1000.0
    }
}

/// Levels of one grid cell ordered from the surface upward.
///
/// Pressure strictly decreases from the first level to the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalProfile {
    levels: Vec<LevelSample>,
}

impl VerticalProfile {
    pub fn new(levels: Vec<LevelSample>) -> Result<Self> {
        if levels.is_empty() {
            return Err(DaError::ProfileMismatch("profile has no levels".to_string()));
        }
        for pair in levels.windows(2) {
            if pair[1].pressure_hpa >= pair[0].pressure_hpa {
                return Err(DaError::ProfileMismatch(format!(
                    "pressure must strictly decrease upward: {} hPa followed by {} hPa",
                    pair[0].pressure_hpa, pair[1].pressure_hpa
                )));
            }
        }
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[LevelSample] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Lowest (highest pressure) level.
    pub fn surface(&self) -> &LevelSample {
        &self.levels[0]
    }

    /// Highest (lowest pressure) level.
    pub fn top(&self) -> &LevelSample {
        &self.levels[self.levels.len() - 1]
    }
}

/// One isobaric level of a decoded field.
#[derive(Debug, Clone)]
pub struct FieldLevel {
    pub pressure_hpa: f64,
    pub field: GridField,
}

impl FieldLevel {
    pub fn new(pressure_hpa: f64, field: GridField) -> Self {
        Self {
            pressure_hpa,
            field,
        }
    }
}

/// Assembles a [`VerticalProfile`] for one cell from per-level fields.
pub struct ProfileBuilder;

impl ProfileBuilder {
    /// Align temperature (K), geopotential height (m) and relative humidity (%)
    /// levels and extract the values at `index`.
    ///
    /// Each field is sorted surface-up before alignment. All three must carry
    /// the same pressure sequence. Humidity is converted from percent to a
    /// fraction here and clamped to [0, 1], since models report slight
    /// supersaturation.
    pub fn build(
        temperature: &[FieldLevel],
        height: &[FieldLevel],
        humidity: &[FieldLevel],
        index: GridIndex,
    ) -> Result<VerticalProfile> {
        let temperature = sorted_surface_up(temperature);
        let height = sorted_surface_up(height);
        let humidity = sorted_surface_up(humidity);

        if temperature.len() != height.len() || temperature.len() != humidity.len() {
            return Err(DaError::ProfileMismatch(format!(
                "level counts differ: temperature {}, height {}, humidity {}",
                temperature.len(),
                height.len(),
                humidity.len()
            )));
        }

        let mut levels = Vec::with_capacity(temperature.len());
        for ((t, z), rh) in temperature.iter().zip(&height).zip(&humidity) {
            if t.pressure_hpa != z.pressure_hpa || t.pressure_hpa != rh.pressure_hpa {
                return Err(DaError::ProfileMismatch(format!(
                    "level sequence differs: temperature {} hPa, height {} hPa, humidity {} hPa",
                    t.pressure_hpa, z.pressure_hpa, rh.pressure_hpa
                )));
            }

            let temp_k = cell_value(t, index, "temperature")?;
            let height_m = cell_value(z, index, "geopotential height")?;
            let rh_fraction = (cell_value(rh, index, "relative humidity")? / 100.0).clamp(0.0, 1.0);

            levels.push(LevelSample::new(t.pressure_hpa, temp_k, rh_fraction, height_m)?);
        }

        VerticalProfile::new(levels)
    }
}

fn sorted_surface_up(levels: &[FieldLevel]) -> Vec<&FieldLevel> {
    let mut sorted: Vec<&FieldLevel> = levels.iter().collect();
    sorted.sort_by(|a, b| b.pressure_hpa.total_cmp(&a.pressure_hpa));
    sorted
}

fn cell_value(level: &FieldLevel, index: GridIndex, name: &str) -> Result<f64> {
    let shape = level.field.shape();
    if index.row >= shape.rows || index.col >= shape.cols {
        return Err(DaError::InvalidGrid(format!(
            "cell ({}, {}) outside the {}x{} {} grid",
            index.row, index.col, shape.rows, shape.cols, name
        )));
    }
    level.field.value_at(index).ok_or_else(|| {
        DaError::domain(format!(
            "{} missing at cell ({}, {}) on {} hPa",
            name, index.row, index.col, level.pressure_hpa
        ))
    })
}

//! Horizontal grid fields and nearest-cell lookup.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DaError, Result};

/// Dimensions of a rectangular grid as (rows, cols).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

/// A (row, col) cell address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridIndex {
    pub row: usize,
    pub col: usize,
}

impl GridIndex {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Row-major offset into a flattened array of the given shape.
    pub fn flat(&self, shape: GridShape) -> usize {
        self.row * shape.cols + self.col
    }

    fn from_flat(offset: usize, shape: GridShape) -> Self {
        Self {
            row: offset / shape.cols,
            col: offset % shape.cols,
        }
    }
}

/// One 2-D scalar field with its geographic coordinates.
///
/// Values and coordinates are stored flattened in row-major order. The
/// coordinate arrays are reference counted because every level decoded from
/// the same model file shares them.
#[derive(Debug, Clone)]
pub struct GridField {
    shape: GridShape,
    values: Vec<f32>,
    lats: Arc<[f64]>,
    lons: Arc<[f64]>,
}

impl GridField {
    /// Build a field, checking that values and coordinates match the shape.
    pub fn new(
        shape: GridShape,
        values: Vec<f32>,
        lats: Arc<[f64]>,
        lons: Arc<[f64]>,
    ) -> Result<Self> {
        check_coordinates(shape, &lats, &lons)?;
        if values.len() != shape.len() {
            return Err(DaError::InvalidGrid(format!(
                "{} values for a {}x{} grid",
                values.len(),
                shape.rows,
                shape.cols
            )));
        }

        Ok(Self {
            shape,
            values,
            lats,
            lons,
        })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    /// Value at a cell, `None` when the index is outside the grid or the value is missing.
    pub fn value_at(&self, index: GridIndex) -> Option<f64> {
        if index.row >= self.shape.rows || index.col >= self.shape.cols {
            return None;
        }
        let v = self.values[index.flat(self.shape)];
        if v.is_nan() {
            None
        } else {
            Some(v as f64)
        }
    }

    /// Geographic position of a cell as (lat, lon), longitude normalized.
    pub fn coordinate_at(&self, index: GridIndex) -> Option<(f64, f64)> {
        if index.row >= self.shape.rows || index.col >= self.shape.cols {
            return None;
        }
        let i = index.flat(self.shape);
        Some((self.lats[i], normalize_longitude(self.lons[i])))
    }

    /// Nearest cell to a query point.
    pub fn locate(&self, lat: f64, lon: f64) -> Result<GridIndex> {
        locate(self.shape, &self.lats, &self.lons, lat, lon)
    }
}

/// Map a longitude into [-180, 180).
pub fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Find the grid cell nearest to (lat, lon).
///
/// Distance is squared Euclidean distance in degree space after normalizing
/// longitudes into [-180, 180). Ties resolve to the first point in row-major
/// order. Points with non-finite coordinates are skipped.
pub fn locate(shape: GridShape, lats: &[f64], lons: &[f64], lat: f64, lon: f64) -> Result<GridIndex> {
    check_coordinates(shape, lats, lons)?;
    if shape.is_empty() {
        return Err(DaError::InvalidGrid("grid has no points".to_string()));
    }
    if !lat.is_finite() || !lon.is_finite() {
        return Err(DaError::InvalidGrid(format!(
            "query point ({}, {}) is not finite",
            lat, lon
        )));
    }

    let lon = normalize_longitude(lon);
    let mut best: Option<(usize, f64)> = None;

    for (i, (&plat, &plon)) in lats.iter().zip(lons.iter()).enumerate() {
        if !plat.is_finite() || !plon.is_finite() {
            continue;
        }
        let dlat = plat - lat;
        let dlon = normalize_longitude(plon) - lon;
        let dist = dlat * dlat + dlon * dlon;

        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((i, dist)),
        }
    }

    best.map(|(i, _)| GridIndex::from_flat(i, shape))
        .ok_or_else(|| DaError::InvalidGrid("grid has no finite coordinates".to_string()))
}

fn check_coordinates(shape: GridShape, lats: &[f64], lons: &[f64]) -> Result<()> {
    let expected = shape.len();
    if lats.len() != expected || lons.len() != expected {
        return Err(DaError::InvalidGrid(format!(
            "expected {} coordinates for a {}x{} grid, got {} lats and {} lons",
            expected,
            shape.rows,
            shape.cols,
            lats.len(),
            lons.len()
        )));
    }
    Ok(())
}

//! Lambert Conformal Conic projection.
//!
//! Used by the NCEP CONUS grids (HRRR 3 km, RAP grid 130 at 13 km). GRIB2
//! template 3.30 describes the grid by its first point, the orientation
//! meridian (LoV), one or two standard parallels, and the grid spacing.

use std::f64::consts::PI;

use crate::{ProjectionError, Result};

/// Radius of the spherical earth used by NCEP grids (GRIB2 shape of earth 6).
pub const NCEP_EARTH_RADIUS_M: f64 = 6_371_229.0;

/// Grid definition in the units GRIB2 template 3.30 carries once decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertParams {
    /// Latitude of the first grid point (degrees)
    pub lat1: f64,
    /// Longitude of the first grid point (degrees, either 0..360 or -180..180)
    pub lon1: f64,
    /// Orientation meridian (degrees)
    pub lov: f64,
    pub latin1: f64,
    pub latin2: f64,
    /// Grid spacing along i (metres)
    pub dx: f64,
    /// Grid spacing along j (metres)
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    pub earth_radius: f64,
}

/// A Lambert Conformal grid with precomputed cone constants.
///
/// Grid index `i` increases eastward and `j` northward from the first grid
/// point.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    params: LambertParams,
    lon0: f64,
    /// Cone constant
    n: f64,
    f: f64,
    /// Projected position of the first grid point
    x1: f64,
    y1: f64,
}

impl LambertConformal {
    pub fn new(params: LambertParams) -> Result<Self> {
        validate(&params)?;

        let to_rad = PI / 180.0;
        let lat1 = params.lat1 * to_rad;
        let latin1 = params.latin1 * to_rad;
        let latin2 = params.latin2 * to_rad;
        let lon0 = params.lov * to_rad;

        let n = if (latin1 - latin2).abs() < 1e-10 {
            latin1.sin()
        } else {
            (latin1.cos() / latin2.cos()).ln()
                / ((PI / 4.0 + latin2 / 2.0).tan() / (PI / 4.0 + latin1 / 2.0).tan()).ln()
        };
        let f = latin1.cos() * (PI / 4.0 + latin1 / 2.0).tan().powf(n) / n;
        let rho1 = params.earth_radius * f / (PI / 4.0 + lat1 / 2.0).tan().powf(n);

        let theta1 = n * wrap_radians(params.lon1 * to_rad - lon0);
        let x1 = rho1 * theta1.sin();
        let y1 = -rho1 * theta1.cos();

        Ok(Self {
            params,
            lon0,
            n,
            f,
            x1,
            y1,
        })
    }

    /// Fractional grid position (i, j) of a geographic point.
    pub fn geo_to_grid(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat_deg * to_rad;
        let theta = self.n * wrap_radians(lon_deg * to_rad - self.lon0);
        let rho = self.params.earth_radius * self.f / (PI / 4.0 + lat / 2.0).tan().powf(self.n);

        let x = rho * theta.sin();
        let y = -rho * theta.cos();

        ((x - self.x1) / self.params.dx, (y - self.y1) / self.params.dy)
    }

    /// Geographic position (lat, lon) in degrees of grid point (i, j).
    /// Longitude is returned in [-180, 180).
    pub fn grid_to_geo(&self, i: f64, j: f64) -> (f64, f64) {
        let to_deg = 180.0 / PI;
        let x = self.x1 + i * self.params.dx;
        let y = self.y1 + j * self.params.dy;

        let mut rho = (x * x + y * y).sqrt();
        if self.n < 0.0 {
            rho = -rho;
        }
        let theta = if self.n < 0.0 {
            (-x).atan2(y)
        } else {
            x.atan2(-y)
        };

        let lat = 2.0 * (self.params.earth_radius * self.f / rho).powf(1.0 / self.n).atan() - PI / 2.0;
        let lon = wrap_radians(self.lon0 + theta / self.n);

        (lat * to_deg, lon * to_deg)
    }
}

fn validate(p: &LambertParams) -> Result<()> {
    let finite = [p.lat1, p.lon1, p.lov, p.latin1, p.latin2, p.dx, p.dy, p.earth_radius]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err(ProjectionError::InvalidParameters(
            "non-finite Lambert parameter".to_string(),
        ));
    }
    if p.nx == 0 || p.ny == 0 {
        return Err(ProjectionError::InvalidParameters(format!(
            "empty grid {}x{}",
            p.nx, p.ny
        )));
    }
    if p.dx <= 0.0 || p.dy <= 0.0 || p.earth_radius <= 0.0 {
        return Err(ProjectionError::InvalidParameters(format!(
            "grid spacing {}x{} m and earth radius {} m must be positive",
            p.dx, p.dy, p.earth_radius
        )));
    }
    if p.latin1.abs() >= 90.0 || p.latin2.abs() >= 90.0 || (p.latin1 == 0.0 && p.latin2 == 0.0) {
        return Err(ProjectionError::InvalidParameters(format!(
            "standard parallels {} and {} do not define a cone",
            p.latin1, p.latin2
        )));
    }
    if p.lat1.abs() >= 90.0 {
        return Err(ProjectionError::InvalidParameters(format!(
            "first grid point latitude {} is a pole",
            p.lat1
        )));
    }
    Ok(())
}

/// Wrap an angle into [-π, π).
fn wrap_radians(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped >= PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The operational HRRR CONUS grid.
    fn hrrr_params() -> LambertParams {
        LambertParams {
            lat1: 21.138123,
            lon1: 237.280472,
            lov: 262.5,
            latin1: 38.5,
            latin2: 38.5,
            dx: 3000.0,
            dy: 3000.0,
            nx: 1799,
            ny: 1059,
            earth_radius: NCEP_EARTH_RADIUS_M,
        }
    }

    fn hrrr() -> LambertConformal {
        LambertConformal::new(hrrr_params()).unwrap()
    }

    /// Whether (i, j) falls on a grid cell.
    fn on_grid(params: &LambertParams, (i, j): (f64, f64)) -> bool {
        i >= -0.5 && i <= params.nx as f64 - 0.5 && j >= -0.5 && j <= params.ny as f64 - 0.5
    }

    #[test]
    fn test_hrrr_first_grid_point() {
        let proj = hrrr();
        let (i, j) = proj.geo_to_grid(21.138123, -122.719528);
        assert!(i.abs() < 1e-6, "i should be ~0, got {}", i);
        assert!(j.abs() < 1e-6, "j should be ~0, got {}", j);

        let (lat, lon) = proj.grid_to_geo(0.0, 0.0);
        assert!((lat - 21.138123).abs() < 1e-6);
        assert!((lon + 122.719528).abs() < 1e-6);
    }

    #[test]
    fn test_hrrr_roundtrip() {
        let proj = hrrr();
        for (ti, tj) in [(900.0, 500.0), (0.0, 1058.0), (1798.0, 0.0), (1798.0, 1058.0)] {
            let (lat, lon) = proj.grid_to_geo(ti, tj);
            let (i, j) = proj.geo_to_grid(lat, lon);
            assert!((i - ti).abs() < 1e-6, "i roundtrip failed: {} vs {}", ti, i);
            assert!((j - tj).abs() < 1e-6, "j roundtrip failed: {} vs {}", tj, j);
        }
    }

    #[test]
    fn test_lov_meridian_points_north() {
        let proj = hrrr();
        // Points on the orientation meridian share one i index
        let (i_south, _) = proj.geo_to_grid(30.0, -97.5);
        let (i_north, _) = proj.geo_to_grid(45.0, -97.5);
        assert!((i_south - i_north).abs() < 1e-6);
    }

    #[test]
    fn test_hrrr_covers_morey_airport() {
        let proj = hrrr();
        assert!(on_grid(&hrrr_params(), proj.geo_to_grid(43.113381, -89.528386)));
        assert!(!on_grid(&hrrr_params(), proj.geo_to_grid(-33.9, 151.2)));

        let (i, j) = proj.geo_to_grid(43.113381, -89.528386);
        let (lat, lon) = proj.grid_to_geo(i.round(), j.round());
        assert!((lat - 43.113381).abs() < 0.03);
        assert!((lon + 89.528386).abs() < 0.03);
    }

    #[test]
    fn test_rap_130_corner() {
        // NCEP grid 130, used by the RAP 13 km CONUS pressure files
        let params = LambertParams {
            lat1: 16.281,
            lon1: 233.862,
            lov: 265.0,
            latin1: 25.0,
            latin2: 25.0,
            dx: 13545.087,
            dy: 13545.087,
            nx: 451,
            ny: 337,
            earth_radius: NCEP_EARTH_RADIUS_M,
        };
        let proj = LambertConformal::new(params).unwrap();
        let (lat, lon) = proj.grid_to_geo(0.0, 0.0);
        assert!((lat - 16.281).abs() < 1e-6);
        assert!((lon - (233.862 - 360.0)).abs() < 1e-6);
        assert!(on_grid(&params, proj.geo_to_grid(39.0, -94.5)));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let mut params = hrrr_params();
        params.dx = 0.0;
        assert!(LambertConformal::new(params).is_err());

        let mut params = hrrr_params();
        params.nx = 0;
        assert!(LambertConformal::new(params).is_err());
    }

    #[test]
    fn test_wrap_radians() {
        assert!((wrap_radians(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap_radians(-PI / 4.0) + PI / 4.0).abs() < 1e-12);
    }
}

//! Air density and ISA density altitude.
//!
//! Formulas follow the ICAO standard atmosphere relations used for
//! density-altitude calculations in aviation. All functions are pure.

use crate::error::{DaError, Result};

/// MSL pressure (Pa)
pub const P0: f64 = 101_325.0;
/// MSL temperature (K)
pub const T0: f64 = 288.15;
/// Standard gravity (m/s^2)
pub const G: f64 = 9.80665;
/// Temperature lapse rate (K/km)
pub const L: f64 = 6.5;
/// Universal gas constant (J/(mol*K))
pub const R: f64 = 8.31432;
/// Molar mass of dry air (g/mol)
pub const M: f64 = 28.9644;

/// Gas constant for dry air (J/(kg*K))
pub const R_DRY: f64 = 287.05;
/// Gas constant for water vapor (J/(kg*K))
pub const R_VAPOR: f64 = 461.495;

/// Mean Earth radius used for geopotential conversion (km)
pub const EARTH_RADIUS_KM: f64 = 6356.766;

// Magnus-type saturation vapor pressure coefficients
const C0: f64 = 6.1078;
const C1: f64 = 7.5;
const C2: f64 = 237.3;

/// Saturation vapor pressure in Pa for a temperature in degrees Celsius.
pub fn saturation_vapor_pressure(temp_c: f64) -> f64 {
    let es_hpa = C0 * 10f64.powf(C1 * temp_c / (C2 + temp_c));
    es_hpa * 100.0
}

/// Moist air density in g/m^3.
///
/// `rh` is a 0-1 fraction. Total pressure is split into dry-air and
/// water-vapor partial pressures, each contributing via its own gas constant.
pub fn air_density(pressure_hpa: f64, temp_k: f64, rh: f64) -> Result<f64> {
    if !pressure_hpa.is_finite() || pressure_hpa <= 0.0 {
        return Err(DaError::domain(format!(
            "pressure must be positive, got {} hPa",
            pressure_hpa
        )));
    }
    if !temp_k.is_finite() || temp_k <= 0.0 {
        return Err(DaError::domain(format!(
            "temperature must be positive, got {} K",
            temp_k
        )));
    }
    if !(0.0..=1.0).contains(&rh) {
        return Err(DaError::domain(format!(
            "relative humidity must be a 0-1 fraction, got {}",
            rh
        )));
    }

    let pv = rh * saturation_vapor_pressure(temp_k - 273.15);
    let pd = pressure_hpa * 100.0 - pv;

    let density_kg_m3 = pd / (R_DRY * temp_k) + pv / (R_VAPOR * temp_k);
    Ok(density_kg_m3 * 1000.0)
}

/// Density altitude in km (geopotential) for an air density in g/m^3.
///
/// Inverts the ISA troposphere barometric relation. Density must be positive
/// since the base of the fractional power would otherwise be negative.
pub fn density_altitude_km(density_g_m3: f64) -> Result<f64> {
    if !density_g_m3.is_finite() || density_g_m3 <= 0.0 {
        return Err(DaError::domain(format!(
            "density must be positive, got {} g/m^3",
            density_g_m3
        )));
    }

    let base = R * T0 * density_g_m3 / (M * P0);
    let exponent = L * R / (G * M - L * R);
    Ok((T0 / L) * (1.0 - base.powf(exponent)))
}

/// Geometric altitude in km for a geopotential altitude in km.
pub fn geopotential_to_geometric_km(alt_km: f64) -> Result<f64> {
    if !alt_km.is_finite() || alt_km >= EARTH_RADIUS_KM {
        return Err(DaError::domain(format!(
            "geopotential altitude {} km is not below the Earth radius",
            alt_km
        )));
    }
    Ok(EARTH_RADIUS_KM * alt_km / (EARTH_RADIUS_KM - alt_km))
}

/// Geopotential altitude in km for a geometric altitude in km.
pub fn geometric_to_geopotential_km(alt_km: f64) -> f64 {
    EARTH_RADIUS_KM * alt_km / (EARTH_RADIUS_KM + alt_km)
}

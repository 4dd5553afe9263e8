//! Reference soundings and query points.

/// One pressure level of a single-column sounding, in the units a model
/// file carries them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundingLevel {
    pub pressure_hpa: f64,
    pub temperature_k: f64,
    pub rh_percent: f64,
    /// Geopotential metres
    pub height_m: f64,
}

impl SoundingLevel {
    pub const fn new(pressure_hpa: f64, temperature_k: f64, rh_percent: f64, height_m: f64) -> Self {
        Self {
            pressure_hpa,
            temperature_k,
            rh_percent,
            height_m,
        }
    }
}

/// Three low levels with a standard lapse rate. Density altitude is about
/// 0.170, 0.734 and 1.351 km at 1000, 925 and 850 hPa.
pub const STANDARD_SOUNDING: [SoundingLevel; 3] = [
    SoundingLevel::new(1000.0, 288.15, 50.0, 100.0),
    SoundingLevel::new(925.0, 281.65, 60.0, 800.0),
    SoundingLevel::new(850.0, 275.15, 70.0, 1500.0),
];

/// Mandatory levels from 1000 to 300 hPa close to the standard atmosphere.
pub const DEEP_SOUNDING: [SoundingLevel; 6] = [
    SoundingLevel::new(1000.0, 287.4, 50.0, 111.0),
    SoundingLevel::new(925.0, 283.4, 50.0, 762.0),
    SoundingLevel::new(850.0, 278.8, 50.0, 1457.0),
    SoundingLevel::new(700.0, 268.6, 40.0, 3012.0),
    SoundingLevel::new(500.0, 252.0, 30.0, 5574.0),
    SoundingLevel::new(300.0, 228.7, 20.0, 9164.0),
];

/// A strong low-level inversion: the 925 hPa layer is much warmer than the
/// surface, so density altitude there exceeds the value at 850 hPa.
pub const INVERSION_SOUNDING: [SoundingLevel; 3] = [
    SoundingLevel::new(1000.0, 270.0, 80.0, 100.0),
    SoundingLevel::new(925.0, 310.0, 20.0, 750.0),
    SoundingLevel::new(850.0, 280.0, 30.0, 1480.0),
];

/// Morey Airport, Middleton WI.
pub const MOREY_AIRPORT: (f64, f64) = (43.113381, -89.528386);

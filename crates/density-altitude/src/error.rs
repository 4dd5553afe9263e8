//! Error types for density-altitude resolution.

use thiserror::Error;

use crate::profile::LevelSample;

/// Result type alias using DaError.
pub type Result<T> = std::result::Result<T, DaError>;

/// Failures produced by the lookup engine.
///
/// `BelowProfile` and `AboveProfile` are expected outcomes for targets the
/// supplied profile cannot represent; the remaining variants indicate bad
/// input data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DaError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Profile mismatch: {0}")]
    ProfileMismatch(String),

    #[error("Domain error: {reason}{}", level_suffix(.level))]
    Domain {
        reason: String,
        level: Option<LevelSample>,
    },

    #[error(
        "Density altitude {target_da_km:.3} km is below the lowest profile level ({lowest_da_km:.3} km)"
    )]
    BelowProfile { target_da_km: f64, lowest_da_km: f64 },

    #[error(
        "Density altitude {target_da_km:.3} km is above the highest profile level ({highest_da_km:.3} km)"
    )]
    AboveProfile {
        target_da_km: f64,
        highest_da_km: f64,
    },
}

impl DaError {
    pub(crate) fn domain(reason: impl Into<String>) -> Self {
        DaError::Domain {
            reason: reason.into(),
            level: None,
        }
    }

    /// Attach the level that produced a domain error.
    pub fn at_level(self, sample: &LevelSample) -> Self {
        match self {
            DaError::Domain { reason, .. } => DaError::Domain {
                reason,
                level: Some(*sample),
            },
            other => other,
        }
    }

    /// True when the target lies outside the profile rather than the input being bad.
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            DaError::BelowProfile { .. } | DaError::AboveProfile { .. }
        )
    }
}

fn level_suffix(level: &Option<LevelSample>) -> String {
    match level {
        Some(s) => format!(
            " (level {} hPa, T={} K, RH={}, z={} m)",
            s.pressure_hpa, s.temperature_k, s.relative_humidity, s.geopotential_height_m
        ),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_classification() {
        let below = DaError::BelowProfile {
            target_da_km: 0.1,
            lowest_da_km: 0.5,
        };
        let above = DaError::AboveProfile {
            target_da_km: 5.0,
            highest_da_km: 4.0,
        };
        assert!(below.is_out_of_range());
        assert!(above.is_out_of_range());
        assert!(!DaError::InvalidGrid("x".into()).is_out_of_range());
    }

    #[test]
    fn test_domain_error_carries_level() {
        let sample = LevelSample {
            pressure_hpa: 500.0,
            temperature_k: 250.0,
            relative_humidity: 0.2,
            geopotential_height_m: 5500.0,
        };
        let err = DaError::domain("density must be positive").at_level(&sample);
        let message = err.to_string();
        assert!(message.contains("500 hPa"), "{}", message);
        assert!(matches!(err, DaError::Domain { level: Some(_), .. }));
    }
}

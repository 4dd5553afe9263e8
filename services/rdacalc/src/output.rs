//! Text and JSON rendering of lookup results.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use density_altitude::{AltitudeUnit, DaReport, LevelDiagnostic};

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Verbose,
    Json,
}

impl OutputFormat {
    pub fn from_flags(json: bool, verbose: bool) -> Self {
        match (json, verbose) {
            (true, _) => OutputFormat::Json,
            (false, true) => OutputFormat::Verbose,
            (false, false) => OutputFormat::Text,
        }
    }
}

fn decimals(unit: AltitudeUnit) -> usize {
    match unit {
        AltitudeUnit::Km | AltitudeUnit::Gpkm => 3,
        _ => 0,
    }
}

/// `14523 ft`, `4.427 km`
pub fn format_altitude(value: f64, unit: AltitudeUnit) -> String {
    format!("{:.*} {}", decimals(unit), value, unit)
}

/// Per-level table, surface first. Altitudes are shown in `unit`.
pub fn level_table(levels: &[LevelDiagnostic], unit: AltitudeUnit) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>8} {:>8} {:>6} {:>9} {:>10} {:>10}",
        "hPa",
        "T (K)",
        "RH",
        "g/m^3",
        format!("DA ({})", unit.with_height_kind(density_altitude::HeightKind::Geopotential)),
        format!("Z ({})", unit)
    );
    for level in levels {
        let sample = &level.sample;
        let _ = writeln!(
            out,
            "{:>8.1} {:>8.2} {:>6.2} {:>9.1} {:>10.*} {:>10.*}",
            sample.pressure_hpa,
            sample.temperature_k,
            sample.relative_humidity,
            level.density_g_m3,
            decimals(unit),
            unit.km_to_unit(level.density_altitude_km),
            decimals(unit),
            unit.km_to_unit(level.height_km),
        );
    }
    out
}

pub fn render(report: &DaReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialize result")
        }
        OutputFormat::Text => Ok(format_altitude(report.altitude, report.unit)),
        OutputFormat::Verbose => {
            let mut out = level_table(&report.result.levels, report.unit);
            let result = &report.result;
            if let Some((lat, lon)) = report.grid_point {
                let _ = writeln!(
                    out,
                    "\nGrid point ({}, {}) at {:.4}, {:.4}",
                    report.grid_index.row, report.grid_index.col, lat, lon
                );
            }
            let _ = writeln!(
                out,
                "Between {} hPa and {} hPa: {}",
                result.lower.pressure_hpa,
                result.upper.pressure_hpa,
                format_altitude(report.altitude, report.unit)
            );
            Ok(out)
        }
    }
}

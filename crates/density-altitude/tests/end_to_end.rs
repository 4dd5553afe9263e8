//! Full lookups over small synthetic grids.

use std::sync::Arc;

use density_altitude::{
    diagnose, AltitudeUnit, DaError, DaQuery, FieldLevel, GridField, GridIndex, GridShape,
    HeightKind, IsobaricFields, ProfileBuilder, ReverseResolver, ScanMode,
};
use test_utils::{
    assert_approx_eq, SoundingLevel, DEEP_SOUNDING, INVERSION_SOUNDING, STANDARD_SOUNDING,
};

/// Fields over a grid where each cell carries its own sounding. All
/// soundings must share one pressure sequence.
fn fields_for_cells(
    shape: GridShape,
    lats: Vec<f64>,
    lons: Vec<f64>,
    cells: &[&[SoundingLevel]],
) -> IsobaricFields {
    assert_eq!(cells.len(), shape.len());
    let lats: Arc<[f64]> = lats.into();
    let lons: Arc<[f64]> = lons.into();

    let mut fields = IsobaricFields::default();
    for (k, level) in cells[0].iter().enumerate() {
        let field = |value: fn(&SoundingLevel) -> f64| {
            let values = cells.iter().map(|c| value(&c[k]) as f32).collect();
            let grid = GridField::new(shape, values, lats.clone(), lons.clone()).unwrap();
            FieldLevel::new(level.pressure_hpa, grid)
        };
        fields.temperature.push(field(|l| l.temperature_k));
        fields.height.push(field(|l| l.height_m));
        fields.humidity.push(field(|l| l.rh_percent));
    }
    fields
}

fn single_cell(sounding: &[SoundingLevel]) -> IsobaricFields {
    fields_for_cells(GridShape::new(1, 1), vec![43.1], vec![270.5], &[sounding])
}

fn level_das(fields: &IsobaricFields) -> Vec<f64> {
    let profile = fields.profile_at(GridIndex::new(0, 0)).unwrap();
    diagnose(&profile, HeightKind::Geopotential)
        .unwrap()
        .iter()
        .map(|l| l.density_altitude_km)
        .collect()
}

#[test]
fn test_standard_sounding_density_altitudes() {
    let das = level_das(&single_cell(&STANDARD_SOUNDING));
    assert_approx_eq!(das[0], 0.170, 0.01);
    assert_approx_eq!(das[1], 0.734, 0.01);
    assert_approx_eq!(das[2], 1.351, 0.01);
}

#[test]
fn test_target_between_first_levels_interpolates_inside_bracket() {
    let fields = single_cell(&STANDARD_SOUNDING);
    let das = level_das(&fields);
    let target = (das[0] + das[1]) / 2.0;

    let report = DaQuery::new(target * 1000.0, 43.1, -89.5, AltitudeUnit::Gpm)
        .evaluate(&fields)
        .unwrap();
    assert!(report.altitude > 100.0 && report.altitude < 800.0, "{}", report.altitude);
    assert_eq!(report.unit, AltitudeUnit::Gpm);
    assert_approx_eq!(report.result.target_da_km, target, 1e-12);
    assert_eq!(report.result.lower.pressure_hpa, 1000.0);
    assert_eq!(report.result.upper.pressure_hpa, 925.0);

    // Geometric height sits slightly above the geopotential one
    let geometric = DaQuery::new(target * 1000.0, 43.1, -89.5, AltitudeUnit::M)
        .evaluate(&fields)
        .unwrap();
    assert!(geometric.altitude > report.altitude);
    assert!(geometric.altitude < 800.2);
}

#[test]
fn test_exact_level_match_returns_level_height() {
    let fields = single_cell(&STANDARD_SOUNDING);
    let das = level_das(&fields);

    let report = DaQuery::new(das[1], 43.1, -89.5, AltitudeUnit::Gpkm)
        .evaluate(&fields)
        .unwrap();
    assert_eq!(report.result.height_km, 0.8);
}

#[test]
fn test_strictly_between_brackets_for_deep_profile() {
    let fields = single_cell(&DEEP_SOUNDING);
    let das = level_das(&fields);

    for pair in das.windows(2) {
        let target = pair[0] + 0.3 * (pair[1] - pair[0]);
        let report = DaQuery::new(target, 43.1, -89.5, AltitudeUnit::Km)
            .evaluate(&fields)
            .unwrap();
        let r = &report.result;
        assert!(r.height_km > r.lower.height_km && r.height_km < r.upper.height_km);
        assert!(r.lower.density_altitude_km <= target && r.upper.density_altitude_km > target);
    }
}

#[test]
fn test_out_of_range_targets() {
    let fields = single_cell(&STANDARD_SOUNDING);

    let below = DaQuery::new(0.1, 43.1, -89.5, AltitudeUnit::Km)
        .evaluate(&fields)
        .unwrap_err();
    assert!(matches!(below, DaError::BelowProfile { .. }));

    let above = DaQuery::new(5.0, 43.1, -89.5, AltitudeUnit::Km)
        .evaluate(&fields)
        .unwrap_err();
    match above {
        DaError::AboveProfile { highest_da_km, .. } => assert_approx_eq!(highest_da_km, 1.351, 0.01),
        other => panic!("expected AboveProfile, got {:?}", other),
    }
    assert!(above_is_out_of_range(&fields));
}

fn above_is_out_of_range(fields: &IsobaricFields) -> bool {
    DaQuery::new(5.0, 43.1, -89.5, AltitudeUnit::Km)
        .evaluate(fields)
        .unwrap_err()
        .is_out_of_range()
}

#[test]
fn test_full_scan_matches_first_crossing() {
    let fields = single_cell(&DEEP_SOUNDING);
    let profile = fields.profile_at(GridIndex::new(0, 0)).unwrap();

    for target in [0.5, 1.0, 2.5, 4.0, 6.0] {
        let quick = ReverseResolver::new(ScanMode::FirstCrossing, HeightKind::Geometric)
            .resolve(&profile, target)
            .unwrap();
        let full = ReverseResolver::new(ScanMode::FullScan, HeightKind::Geometric)
            .resolve(&profile, target)
            .unwrap();
        assert_eq!(quick.height_km, full.height_km);
        assert_eq!(quick.lower, full.lower);
        assert!(quick.levels.is_empty());
        assert_eq!(full.levels.len(), DEEP_SOUNDING.len());
    }
}

#[test]
fn test_inversion_first_crossing_wins() {
    let fields = single_cell(&INVERSION_SOUNDING);
    let das = level_das(&fields);
    assert!(das[1] > das[2], "925 hPa should exceed 850 hPa: {:?}", das);

    // Crossed between 1000 and 925 hPa, and again between 925 and 850 hPa going back down
    let target = (das[1] + das[2]) / 2.0;
    let report = DaQuery::new(target, 43.1, -89.5, AltitudeUnit::Gpkm)
        .evaluate(&fields)
        .unwrap();
    assert_eq!(report.result.lower.pressure_hpa, 1000.0);
    assert_eq!(report.result.upper.pressure_hpa, 925.0);
}

#[test]
fn test_nearest_cell_drives_profile() {
    // Corners (40,-90) (40,-89) (41,-90) (41,-89); only (41,-89) is warm
    let shape = GridShape::new(2, 2);
    let lats = vec![40.0, 40.0, 41.0, 41.0];
    let lons = vec![270.0, 271.0, 270.0, 271.0];
    let warm: Vec<SoundingLevel> = STANDARD_SOUNDING
        .iter()
        .map(|l| SoundingLevel {
            temperature_k: l.temperature_k + 15.0,
            ..*l
        })
        .collect();
    let cells: [&[SoundingLevel]; 4] = [&STANDARD_SOUNDING, &STANDARD_SOUNDING, &STANDARD_SOUNDING, &warm];
    let fields = fields_for_cells(shape, lats, lons, &cells);

    let index = fields.locate(40.9, -89.1).unwrap();
    assert_eq!(index, GridIndex::new(1, 1));

    let query = DaQuery::new(1.0, 40.9, -89.1, AltitudeUnit::Km);
    let warm_report = query.evaluate(&fields).unwrap();
    assert_eq!(warm_report.grid_index, GridIndex::new(1, 1));
    assert_eq!(warm_report.grid_point, Some((41.0, -89.0)));

    let cool_report = DaQuery::new(1.0, 40.1, -89.9, AltitudeUnit::Km)
        .evaluate(&fields)
        .unwrap();
    assert_eq!(cool_report.grid_index, GridIndex::new(0, 0));
    // Warm air reaches the same density altitude lower down
    assert!(warm_report.altitude < cool_report.altitude);
}

#[test]
fn test_feet_round_trip_through_query() {
    let fields = single_cell(&STANDARD_SOUNDING);
    let report = DaQuery::new(1640.42, 43.1, -89.5, AltitudeUnit::Ft)
        .evaluate(&fields)
        .unwrap();
    assert_approx_eq!(report.result.target_da_km, 0.5, 1e-9);
    assert!(report.altitude > 328.0 && report.altitude < 2625.0);
    assert_approx_eq!(report.altitude, report.result.height_km * 3280.84, 1e-9);
}

#[test]
fn test_report_serializes_to_json() {
    let fields = single_cell(&STANDARD_SOUNDING);
    let report = DaQuery::new(0.5, 43.1, -89.5, AltitudeUnit::Km)
        .verbose(true)
        .evaluate(&fields)
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["unit"], "km");
    assert_eq!(json["result"]["height_kind"], "geometric");
    assert_eq!(json["result"]["levels"].as_array().map(|l| l.len()), Some(3));
}

#[test]
fn test_profile_mismatch_between_fields() {
    let mut fields = single_cell(&STANDARD_SOUNDING);
    fields.humidity.pop();
    let err = ProfileBuilder::build(
        &fields.temperature,
        &fields.height,
        &fields.humidity,
        GridIndex::new(0, 0),
    )
    .unwrap_err();
    assert!(matches!(err, DaError::ProfileMismatch(_)));
}

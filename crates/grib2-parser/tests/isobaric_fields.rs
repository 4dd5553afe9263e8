//! Field extraction and full lookups over synthetic model files.

use bytes::Bytes;
use density_altitude::{AltitudeUnit, DaError, DaQuery, GridIndex};
use grib2_parser::{extract_isobaric_fields, Grib2Error, Grib2Message, Grib2Reader};
use test_utils::{
    assert_approx_eq, isobaric_messages, isobaric_messages_with, require_test_file, Grib2Builder,
    IsobaricField, DEEP_SOUNDING, MOREY_AIRPORT, STANDARD_SOUNDING,
};

fn reader(file: Vec<u8>) -> Grib2Reader {
    Grib2Reader::new(Bytes::from(file))
}

#[test]
fn test_extracts_all_levels() {
    let template = Grib2Builder::lat_lon(3, 3, 44.0, 269.0, 1.0, 1.0);
    let fields = extract_isobaric_fields(reader(isobaric_messages(&template, &DEEP_SOUNDING))).unwrap();

    assert_eq!(fields.temperature.len(), 6);
    assert_eq!(fields.height.len(), 6);
    assert_eq!(fields.humidity.len(), 6);
    assert_eq!(fields.temperature[3].pressure_hpa, 700.0);
    assert_eq!(fields.height[0].field.values()[4], 111.0);
}

#[test]
fn test_fields_share_coordinates() {
    let template = Grib2Builder::lat_lon(2, 2, 44.0, 269.0, 1.0, 1.0);
    let fields = extract_isobaric_fields(reader(isobaric_messages(&template, &STANDARD_SOUNDING))).unwrap();

    let first = fields.temperature[0].field.lats();
    for level in fields.height.iter().chain(&fields.humidity) {
        assert!(std::ptr::eq(first, level.field.lats()));
    }
}

#[test]
fn test_other_products_skipped() {
    let template = Grib2Builder::lat_lon(2, 2, 44.0, 269.0, 1.0, 1.0);
    let mut file = isobaric_messages(&template, &STANDARD_SOUNDING);
    // Wind on an isobaric level and temperature at 2 m are ignored
    file.extend(template.clone().with_parameter(2, 2).with_isobaric_level(850.0).build());
    file.extend(
        template
            .clone()
            .with_field(IsobaricField::Temperature)
            .with_level(103, 0, 2)
            .build(),
    );

    let fields = extract_isobaric_fields(reader(file)).unwrap();
    assert_eq!(fields.temperature.len(), 3);
}

/// Set the bitmap indicator of a single message to 254 (previously defined
/// bitmap), which the in-crate decoder cannot unpack.
fn with_predefined_bitmap(mut message: Vec<u8>) -> Vec<u8> {
    let mut offset = 16;
    while offset + 5 <= message.len() {
        let length = u32::from_be_bytes(message[offset..offset + 4].try_into().unwrap()) as usize;
        if message[offset + 4] == 6 {
            message[offset + 5] = 254;
            return message;
        }
        offset += length;
    }
    panic!("message has no bitmap section");
}

#[test]
fn test_undecodable_bitmap_on_skipped_product() {
    let template = Grib2Builder::lat_lon(2, 2, 44.0, 269.0, 1.0, 1.0);
    let mut file = isobaric_messages(&template, &STANDARD_SOUNDING);
    file.extend(with_predefined_bitmap(
        template.clone().with_parameter(2, 2).with_isobaric_level(850.0).build(),
    ));

    let fields = extract_isobaric_fields(reader(file)).unwrap();
    assert_eq!(fields.temperature.len(), 3);
}

#[test]
fn test_undecodable_bitmap_fails_on_unpack() {
    let message = with_predefined_bitmap(
        Grib2Builder::lat_lon(2, 2, 44.0, 269.0, 1.0, 1.0)
            .with_field(IsobaricField::Temperature)
            .with_isobaric_level(850.0)
            .build(),
    );
    let message = Grib2Message::parse(Bytes::from(message)).unwrap();
    assert!(matches!(
        message.unpack_data(),
        Err(Grib2Error::InvalidSection { section: 6, .. })
    ));
}

#[test]
fn test_duplicate_level_keeps_first() {
    let template = Grib2Builder::lat_lon(2, 2, 44.0, 269.0, 1.0, 1.0);
    let mut file = isobaric_messages(&template, &STANDARD_SOUNDING);
    file.extend(
        template
            .clone()
            .with_field(IsobaricField::Temperature)
            .with_isobaric_level(1000.0)
            .with_constant_value(200.0)
            .build(),
    );

    let fields = extract_isobaric_fields(reader(file)).unwrap();
    assert_eq!(fields.temperature.len(), 3);
    assert_approx_eq!(fields.temperature[0].field.values()[0], 288.15, 1e-3);
}

#[test]
fn test_mixed_grids_rejected() {
    let a = Grib2Builder::lat_lon(2, 2, 44.0, 269.0, 1.0, 1.0);
    let b = Grib2Builder::lat_lon(3, 2, 44.0, 269.0, 1.0, 1.0);
    let mut file = isobaric_messages(&a, &STANDARD_SOUNDING[..1]);
    file.extend(isobaric_messages(&b, &STANDARD_SOUNDING[1..]));

    assert!(matches!(
        extract_isobaric_fields(reader(file)),
        Err(Grib2Error::InvalidFormat(_))
    ));
}

#[test]
fn test_empty_file_yields_no_fields() {
    let fields = extract_isobaric_fields(reader(Vec::new())).unwrap();
    assert!(fields.is_empty());

    let query = DaQuery::new(0.5, 43.0, -89.0, AltitudeUnit::Km);
    assert!(matches!(query.evaluate(&fields), Err(DaError::InvalidGrid(_))));
}

#[test]
fn test_lookup_on_lat_lon_file() {
    let template = Grib2Builder::lat_lon(3, 3, 44.0, 269.0, 1.0, 1.0);
    let fields = extract_isobaric_fields(reader(isobaric_messages(&template, &STANDARD_SOUNDING))).unwrap();

    let (lat, lon) = MOREY_AIRPORT;
    let report = DaQuery::new(0.5, lat, lon, AltitudeUnit::Km)
        .evaluate(&fields)
        .unwrap();

    // Nearest cell to (43.11, -89.53) is (43N, 90W): row 1, col 1
    assert_eq!(report.grid_index, GridIndex::new(1, 1));
    let (cell_lat, cell_lon) = report.grid_point.unwrap();
    assert_approx_eq!(cell_lat, 43.0, 1e-9);
    assert_approx_eq!(cell_lon, -90.0, 1e-9);

    assert_eq!(report.result.lower.pressure_hpa, 1000.0);
    assert_eq!(report.result.upper.pressure_hpa, 925.0);
    assert!(report.altitude > 0.1 && report.altitude < 0.8);
}

#[test]
fn test_lookup_selects_cell_values() {
    // The centre column is 15 K warmer, lifting its density altitude
    let template = Grib2Builder::lat_lon(3, 1, 43.0, 269.0, 1.0, 1.0);
    let file = isobaric_messages_with(&template, &STANDARD_SOUNDING, |field, level, i| {
        let base = field.value(level);
        if field == IsobaricField::Temperature && i == 1 {
            base + 15.0
        } else {
            base
        }
    });
    let fields = extract_isobaric_fields(reader(file)).unwrap();

    let cold = DaQuery::new(0.9, 43.0, -91.0, AltitudeUnit::Km)
        .evaluate(&fields)
        .unwrap();
    let warm = DaQuery::new(0.9, 43.0, -90.0, AltitudeUnit::Km)
        .evaluate(&fields)
        .unwrap();

    assert_eq!(warm.grid_index, GridIndex::new(0, 1));
    assert!(warm.altitude < cold.altitude);
}

#[test]
fn test_lookup_on_lambert_file() {
    let template = Grib2Builder::lambert_hrrr(5, 5);
    let fields = extract_isobaric_fields(reader(isobaric_messages(&template, &STANDARD_SOUNDING))).unwrap();

    // Near the south-west corner of the HRRR domain
    let report = DaQuery::new(2000.0, 21.17, -122.70, AltitudeUnit::Ft)
        .evaluate(&fields)
        .unwrap();
    assert_eq!(report.unit, AltitudeUnit::Ft);
    assert!(report.altitude > 0.0);
    let (cell_lat, _) = report.grid_point.unwrap();
    assert!((cell_lat - 21.17).abs() < 0.05);
}

#[test]
fn test_target_above_profile() {
    let template = Grib2Builder::lat_lon(2, 2, 44.0, 269.0, 1.0, 1.0);
    let fields = extract_isobaric_fields(reader(isobaric_messages(&template, &STANDARD_SOUNDING))).unwrap();

    let err = DaQuery::new(5.0, 43.5, -90.5, AltitudeUnit::Km)
        .evaluate(&fields)
        .unwrap_err();
    assert!(matches!(err, DaError::AboveProfile { .. }));
}

#[test]
fn test_real_hrrr_file() {
    let path = require_test_file!("hrrr.t12z.wrfprsf01.grib2");
    let data = std::fs::read(&path).expect("read test file");
    let fields = extract_isobaric_fields(reader(data)).expect("extract fields");
    assert!(fields.temperature.len() >= 30);

    let (lat, lon) = MOREY_AIRPORT;
    let report = DaQuery::new(3000.0, lat, lon, AltitudeUnit::Ft)
        .evaluate(&fields)
        .expect("lookup");
    assert!(report.altitude > 0.0 && report.altitude < 10_000.0);
}

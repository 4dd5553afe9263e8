//! Decoding of synthetic messages: metadata, coordinates, scan order and
//! bitmaps.

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use grib2_parser::sections::GridTemplate;
use grib2_parser::unpacking::unpack_with_grib_crate;
use grib2_parser::{Grib2Error, Grib2Message};
use test_utils::{
    assert_approx_eq, assert_coords_approx_eq, create_index_grid, Grib2Builder, IsobaricField,
};

fn parse(data: Vec<u8>) -> Grib2Message {
    Grib2Message::parse(Bytes::from(data)).expect("message should parse")
}

#[test]
fn test_product_metadata() {
    let msg = parse(
        Grib2Builder::new_conus()
            .with_field(IsobaricField::Humidity)
            .with_isobaric_level(925.0)
            .with_reference_time(2025, 1, 15, 18)
            .with_forecast_hour(3)
            .build(),
    );

    assert_eq!(msg.indicator.edition, 2);
    assert_eq!(msg.indicator.discipline, 0);
    assert_eq!(msg.identification.center, 7);
    assert_eq!(msg.parameter(), "RH");
    assert_eq!(msg.pressure_hpa(), Some(925.0));
    assert_eq!(msg.product_definition.level_description, "925 mb");
    assert_eq!(
        msg.reference_time(),
        Utc.with_ymd_and_hms(2025, 1, 15, 18, 0, 0).unwrap()
    );
    assert_eq!(
        msg.valid_time(),
        Utc.with_ymd_and_hms(2025, 1, 15, 21, 0, 0).unwrap()
    );
    assert_eq!(msg.grid_dims(), (10, 10));
}

#[test]
fn test_non_isobaric_level_has_no_pressure() {
    // 2 m above ground
    let msg = parse(Grib2Builder::new_conus().with_level(103, 0, 2).build());
    assert_eq!(msg.pressure_hpa(), None);
    assert_eq!(msg.product_definition.level_description, "2 m above ground");
}

#[test]
fn test_lat_lon_grid_definition() {
    let msg = parse(Grib2Builder::new_conus().build());
    let gd = &msg.grid_definition;

    assert_eq!(gd.template_number, 0);
    assert_eq!(gd.num_data_points, 100);
    assert_eq!(gd.earth_radius_m, 6_371_229.0);
    match gd.template {
        GridTemplate::LatLon(grid) => {
            assert_approx_eq!(grid.la1, 48.0, 1e-6);
            assert_approx_eq!(grid.lo1, 260.0, 1e-6);
            assert_approx_eq!(grid.la2, 39.0, 1e-6);
            assert_approx_eq!(grid.lo2, 269.0, 1e-6);
            assert_approx_eq!(grid.di, 1.0, 1e-6);
        }
        other => panic!("expected lat/lon template, got {:?}", other),
    }
}

#[test]
fn test_lat_lon_coordinates_north_to_south() {
    let msg = parse(Grib2Builder::new_conus().build());
    let (lats, lons) = msg.coordinates().unwrap();

    assert_eq!(lats.len(), 100);
    assert_coords_approx_eq!((lats[0], lons[0]), (48.0, -100.0), 1e-9);
    assert_coords_approx_eq!((lats[9], lons[9]), (48.0, -91.0), 1e-9);
    assert_coords_approx_eq!((lats[10], lons[10]), (47.0, -100.0), 1e-9);
    assert_coords_approx_eq!((lats[99], lons[99]), (39.0, -91.0), 1e-9);
}

#[test]
fn test_negative_i_scanning() {
    let msg = parse(
        Grib2Builder::lat_lon(3, 2, 10.0, 20.0, 1.0, 1.0)
            .with_scanning_mode(0b1000_0000)
            .build(),
    );
    let (lats, lons) = msg.coordinates().unwrap();
    assert_coords_approx_eq!((lats[0], lons[0]), (10.0, 20.0), 1e-9);
    assert_coords_approx_eq!((lats[2], lons[2]), (10.0, 18.0), 1e-9);
    assert_coords_approx_eq!((lats[3], lons[3]), (9.0, 20.0), 1e-9);
}

#[test]
fn test_unsupported_scan_modes_rejected() {
    for mode in [0b0010_0000, 0b0001_0000] {
        let msg = parse(
            Grib2Builder::lat_lon(2, 2, 10.0, 20.0, 1.0, 1.0)
                .with_scanning_mode(mode)
                .build(),
        );
        match msg.coordinates() {
            Err(Grib2Error::UnsupportedScanMode(m)) => assert_eq!(m, mode),
            other => panic!("expected scan mode error, got {:?}", other),
        }
    }
}

#[test]
fn test_unsupported_grid_template() {
    let mut data = Grib2Builder::lat_lon(2, 2, 10.0, 20.0, 1.0, 1.0).build();
    // Section 3 starts at byte 37; its template number sits at octets 13-14
    data[49..51].copy_from_slice(&40u16.to_be_bytes());
    let msg = parse(data);

    assert_eq!(msg.grid_definition.template, GridTemplate::Unsupported(40));
    assert!(matches!(
        msg.coordinates(),
        Err(Grib2Error::UnsupportedTemplate {
            section: 3,
            template: 40
        })
    ));
}

#[test]
fn test_lambert_coordinates() {
    let msg = parse(Grib2Builder::lambert_hrrr(4, 3).build());
    let gd = &msg.grid_definition;
    assert_eq!(gd.template_number, 30);
    assert_eq!(msg.grid_dims(), (3, 4));
    match gd.template {
        GridTemplate::Lambert(grid) => {
            assert_approx_eq!(grid.lov, 262.5, 1e-6);
            assert_approx_eq!(grid.latin1, 38.5, 1e-6);
            assert_approx_eq!(grid.dx, 3000.0, 1e-6);
        }
        other => panic!("expected Lambert template, got {:?}", other),
    }

    let (lats, lons) = msg.coordinates().unwrap();
    assert_eq!(lats.len(), 12);
    assert_coords_approx_eq!((lats[0], lons[0]), (21.138123, -122.719528), 1e-4);

    // Scanned south to north: each row sits about 3 km north of the last
    for col in 0..4 {
        let dlat = lats[4 + col] - lats[col];
        assert!(dlat > 0.02 && dlat < 0.035, "dlat = {}", dlat);
    }
    // and each column lies east of the previous one
    assert!(lons[1] > lons[0]);
}

#[test]
fn test_scan_order_matches_values() {
    let msg = parse(
        Grib2Builder::lat_lon(4, 3, 45.0, 270.0, 0.5, 0.5)
            .with_data(create_index_grid(4, 3))
            .build(),
    );
    let values = msg.unpack_data().unwrap();
    assert_eq!(values.len(), 12);
    for row in 0..3 {
        for col in 0..4 {
            assert_approx_eq!(values[row * 4 + col], (row * 100 + col) as f64, 0.01);
        }
    }
}

#[test]
fn test_bitmap_marks_missing_points() {
    let msg = parse(
        Grib2Builder::lat_lon(3, 3, 10.0, 0.0, 1.0, 1.0)
            .with_data(create_index_grid(3, 3))
            .with_missing(&[0, 8])
            .build(),
    );
    assert!(msg.bitmap().unwrap().is_some());
    assert_eq!(msg.data_representation.num_packed_values, 7);

    let values = msg.unpack_data().unwrap();
    assert!(values[0].is_nan());
    assert!(values[8].is_nan());
    assert_approx_eq!(values[1], 1.0, 0.01);
    assert_approx_eq!(values[4], 101.0, 0.01);
    assert_approx_eq!(values[7], 201.0, 0.01);
}

#[test]
fn test_constant_field_uses_zero_bits() {
    let msg = parse(Grib2Builder::new_conus().with_constant_value(250.5).build());
    assert_eq!(msg.data_representation.bits_per_value, 0);
    let values = msg.unpack_data().unwrap();
    assert!(values.iter().all(|&v| v == 250.5));
}

#[test]
fn test_negative_binary_scale_precision() {
    // A narrow range packs with a negative binary scale factor
    let data: Vec<f32> = (0..4).map(|i| 280.0 + i as f32 * 0.25).collect();
    let msg = parse(
        Grib2Builder::lat_lon(2, 2, 10.0, 0.0, 1.0, 1.0)
            .with_data(data.clone())
            .build(),
    );
    assert!(msg.data_representation.binary_scale_factor < 0);
    let values = msg.unpack_data().unwrap();
    for (got, want) in values.iter().zip(&data) {
        assert_approx_eq!(*got, *want, 1e-3);
    }
}

// ============================================================================
// grib crate cross-check
// ============================================================================

fn assert_same_values(ours: &[f32], theirs: &[f32]) {
    assert_eq!(ours.len(), theirs.len());
    for (i, (a, b)) in ours.iter().zip(theirs).enumerate() {
        if a.is_nan() || b.is_nan() {
            assert!(a.is_nan() && b.is_nan(), "point {}: {} vs {}", i, a, b);
        } else {
            assert!((a - b).abs() < 1e-3, "point {}: {} vs {}", i, a, b);
        }
    }
}

#[test]
fn test_grib_crate_decodes_like_simple_unpacking() {
    let data: Vec<f32> = (0..100).map(|i| 250.0 + i as f32 * 0.37).collect();
    let raw = Grib2Builder::new_conus().with_data(data).build();
    let msg = parse(raw.clone());

    let ours = msg.unpack_data().unwrap();
    let theirs = unpack_with_grib_crate(&raw).unwrap();
    assert_same_values(&ours, &theirs);
}

#[test]
fn test_grib_crate_honours_bitmap() {
    let raw = Grib2Builder::lat_lon(3, 3, 10.0, 0.0, 1.0, 1.0)
        .with_data(create_index_grid(3, 3))
        .with_missing(&[0, 4, 8])
        .build();
    let msg = parse(raw.clone());

    let theirs = unpack_with_grib_crate(&raw).unwrap();
    assert!(theirs[0].is_nan() && theirs[4].is_nan() && theirs[8].is_nan());
    assert_same_values(&msg.unpack_data().unwrap(), &theirs);
}

#[test]
fn test_grib_crate_rejects_garbage() {
    let err = unpack_with_grib_crate(b"not a grib message").unwrap_err();
    assert!(matches!(err, Grib2Error::UnpackingError(_)));
}

//! GRIB2 section parsing.
//!
//! A message is section 0 (16 bytes) followed by length-prefixed sections
//! 1 through 7 and the `7777` trailer. Only the fields needed to place a
//! product on a grid and unpack its values are decoded.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{Grib2Error, Result};

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Template 3.0 geometry in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLonGrid {
    pub la1: f64,
    pub lo1: f64,
    pub la2: f64,
    pub lo2: f64,
    pub di: f64,
    pub dj: f64,
}

/// Template 3.30 geometry, angles in degrees and spacing in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertGrid {
    pub la1: f64,
    pub lo1: f64,
    pub lad: f64,
    pub lov: f64,
    pub dx: f64,
    pub dy: f64,
    pub latin1: f64,
    pub latin2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridTemplate {
    LatLon(LatLonGrid),
    Lambert(LambertGrid),
    Unsupported(u16),
}

/// Section 3: Grid Definition Section
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub num_data_points: u32,
    pub template_number: u16,
    pub shape_of_earth: u8,
    pub earth_radius_m: f64,
    /// Points along a parallel (columns)
    pub ni: u32,
    /// Points along a meridian (rows)
    pub nj: u32,
    pub scanning_mode: u8,
    pub template: GridTemplate,
    /// Raw section bytes; messages with equal bytes share one grid.
    pub raw: Bytes,
}

/// First fixed surface of a product (code table 4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSurface {
    pub surface_type: u8,
    pub scale_factor: i8,
    pub scaled_value: i32,
}

impl FixedSurface {
    /// Level value in the surface's native unit, `None` when missing.
    pub fn value(&self) -> Option<f64> {
        if self.surface_type == 255 || self.scaled_value == MISSING_SCALED_VALUE {
            return None;
        }
        Some(self.scaled_value as f64 * 10f64.powi(-(self.scale_factor as i32)))
    }

    /// Pressure in hPa for isobaric surfaces (stored in Pa).
    pub fn pressure_hpa(&self) -> Option<f64> {
        if self.surface_type == ISOBARIC_SURFACE {
            self.value().map(|pa| pa / 100.0)
        } else {
            None
        }
    }
}

/// Code table 4.5 entry for isobaric surfaces.
pub const ISOBARIC_SURFACE: u8 = 100;
const MISSING_SCALED_VALUE: i32 = -0x7FFF_FFFF;

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template_number: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub parameter_short_name: String,
    pub forecast_time: u32,
    /// `None` for templates without the horizontal-level layout.
    pub first_surface: Option<FixedSurface>,
    pub level_description: String,
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    /// Values actually packed in section 7
    pub num_packed_values: u32,
    pub template_number: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from the start of a message.
pub fn parse_indicator(data: &[u8]) -> Result<Indicator> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }
    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat("Invalid GRIB magic bytes".to_string()));
    }

    let discipline = data[6];
    let edition = data[7];
    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }
    let message_length = u64::from_be_bytes(be_array(&data[8..16]));

    Ok(Indicator {
        discipline,
        edition,
        message_length,
    })
}

/// Parse Section 1 (Identification), which always follows section 0.
pub fn parse_identification(data: &[u8]) -> Result<Identification> {
    let sec = section(data, 1)?;
    if sec.len() < 21 {
        return Err(invalid(1, format!("Section too short: {} bytes", sec.len())));
    }

    let year = u16::from_be_bytes([sec[12], sec[13]]);
    let (month, day, hour, minute, second) = (sec[14], sec[15], sec[16], sec[17], sec[18]);
    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| {
            invalid(
                1,
                format!(
                    "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                ),
            )
        })?;

    Ok(Identification {
        center: u16::from_be_bytes([sec[5], sec[6]]),
        sub_center: u16::from_be_bytes([sec[7], sec[8]]),
        significance_of_reference_time: sec[11],
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: sec[19],
        data_type: sec[20],
    })
}

/// Parse Section 3 (Grid Definition).
pub fn parse_grid_definition(message: &Bytes) -> Result<GridDefinition> {
    let offset = find_section(message, 3)?;
    let length = section_length(message, offset);
    let raw = message.slice(offset..offset + length);
    let sec = &raw[..];

    if sec.len() < 14 {
        return Err(invalid(3, "Section too short".to_string()));
    }

    let num_data_points = u32::from_be_bytes(be_array(&sec[6..10]));
    let template_number = u16::from_be_bytes([sec[12], sec[13]]);
    let gd = &sec[14..];

    let (shape_of_earth, earth_radius_m) = if gd.len() >= 6 {
        (gd[0], earth_radius(gd[0], signed8(gd[1]), u32::from_be_bytes(be_array(&gd[2..6]))))
    } else {
        (255, projection::NCEP_EARTH_RADIUS_M)
    };

    let (ni, nj, scanning_mode, template) = match template_number {
        0 => {
            // Template 3.0: regular latitude/longitude
            require_template_len(gd, 58, template_number)?;
            let grid = LatLonGrid {
                la1: micro_degrees(&gd[32..36]),
                lo1: micro_degrees(&gd[36..40]),
                la2: micro_degrees(&gd[41..45]),
                lo2: micro_degrees(&gd[45..49]),
                di: u32::from_be_bytes(be_array(&gd[49..53])) as f64 * 1e-6,
                dj: u32::from_be_bytes(be_array(&gd[53..57])) as f64 * 1e-6,
            };
            (
                u32::from_be_bytes(be_array(&gd[16..20])),
                u32::from_be_bytes(be_array(&gd[20..24])),
                gd[57],
                GridTemplate::LatLon(grid),
            )
        }
        30 => {
            // Template 3.30: Lambert conformal
            require_template_len(gd, 67, template_number)?;
            let grid = LambertGrid {
                la1: micro_degrees(&gd[24..28]),
                lo1: micro_degrees(&gd[28..32]),
                lad: micro_degrees(&gd[33..37]),
                lov: micro_degrees(&gd[37..41]),
                dx: u32::from_be_bytes(be_array(&gd[41..45])) as f64 * 1e-3,
                dy: u32::from_be_bytes(be_array(&gd[45..49])) as f64 * 1e-3,
                latin1: micro_degrees(&gd[51..55]),
                latin2: micro_degrees(&gd[55..59]),
            };
            (
                u32::from_be_bytes(be_array(&gd[16..20])),
                u32::from_be_bytes(be_array(&gd[20..24])),
                gd[50],
                GridTemplate::Lambert(grid),
            )
        }
        other => {
            // Dimensions sit at the same offsets for most templates
            let ni = gd.get(16..20).map(|b| u32::from_be_bytes(be_array(b))).unwrap_or(0);
            let nj = gd.get(20..24).map(|b| u32::from_be_bytes(be_array(b))).unwrap_or(0);
            (ni, nj, 0, GridTemplate::Unsupported(other))
        }
    };

    Ok(GridDefinition {
        num_data_points,
        template_number,
        shape_of_earth,
        earth_radius_m,
        ni,
        nj,
        scanning_mode,
        template,
        raw,
    })
}

/// Parse Section 4 (Product Definition).
pub fn parse_product_definition(data: &[u8], discipline: u8) -> Result<ProductDefinition> {
    let sec = section(data, 4)?;
    if sec.len() < 11 {
        return Err(invalid(4, "Section too short".to_string()));
    }

    let template_number = u16::from_be_bytes([sec[7], sec[8]]);
    let parameter_category = sec[9];
    let parameter_number = sec[10];

    // Templates 4.0-4.15 share the horizontal-level layout up to octet 34
    let (forecast_time, first_surface) = if template_number <= 15 && sec.len() >= 34 {
        let surface = FixedSurface {
            surface_type: sec[22],
            scale_factor: signed8(sec[23]),
            scaled_value: decode_grib2_signed(&sec[24..28]),
        };
        (u32::from_be_bytes(be_array(&sec[18..22])), Some(surface))
    } else {
        (0, None)
    };

    Ok(ProductDefinition {
        template_number,
        parameter_category,
        parameter_number,
        parameter_short_name: get_parameter_short_name(discipline, parameter_category, parameter_number),
        forecast_time,
        level_description: first_surface
            .map(|s| get_level_description(&s))
            .unwrap_or_else(|| format!("product template {}", template_number)),
        first_surface,
    })
}

/// Parse Section 5 (Data Representation).
pub fn parse_data_representation(data: &[u8]) -> Result<DataRepresentation> {
    let sec = section(data, 5)?;
    if sec.len() < 11 {
        return Err(invalid(5, "Section too short".to_string()));
    }

    let num_packed_values = u32::from_be_bytes(be_array(&sec[5..9]));
    let template_number = u16::from_be_bytes([sec[9], sec[10]]);

    // Templates 5.0, 5.2, 5.3, 5.40 and 5.41 begin with R, E, D and bit width
    let t = &sec[11..];
    let (reference_value, binary_scale_factor, decimal_scale_factor, bits_per_value, original_data_type) =
        if t.len() >= 10 {
            (
                f32::from_be_bytes(be_array(&t[0..4])),
                signed16(&t[4..6]),
                signed16(&t[6..8]),
                t[8],
                t[9],
            )
        } else {
            (0.0, 0, 0, 0, 0)
        };

    Ok(DataRepresentation {
        num_packed_values,
        template_number,
        reference_value,
        binary_scale_factor,
        decimal_scale_factor,
        bits_per_value,
        original_data_type,
    })
}

/// Parse Section 6 (Bitmap). `None` when the message has no bitmap.
pub fn parse_bitmap(message: &Bytes) -> Result<Option<Bitmap>> {
    let offset = find_section(message, 6)?;
    let length = section_length(message, offset);
    if length < 6 {
        return Err(invalid(6, "Section too short".to_string()));
    }

    match message[offset + 5] {
        255 => Ok(None),
        0 => Ok(Some(Bitmap {
            indicator: 0,
            data: message.slice(offset + 6..offset + length),
        })),
        other => Err(invalid(
            6,
            format!("Bitmap indicator {} (predefined or previously defined bitmaps) not supported", other),
        )),
    }
}

/// Parse Section 7 (Data).
pub fn parse_data_section(message: &Bytes) -> Result<DataSection> {
    let offset = find_section(message, 7)?;
    let length = section_length(message, offset);
    Ok(DataSection {
        data: message.slice(offset + 5..offset + length),
    })
}

// ===== Helper Functions =====

/// Decode a 4-byte GRIB2 sign-magnitude integer. Other lengths decode to 0.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    if bytes.len() != 4 {
        return 0;
    }
    let raw = u32::from_be_bytes(be_array(bytes));
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn signed16(bytes: &[u8]) -> i16 {
    let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn signed8(byte: u8) -> i8 {
    let magnitude = (byte & 0x7F) as i8;
    if byte & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn micro_degrees(bytes: &[u8]) -> f64 {
    decode_grib2_signed(bytes) as f64 * 1e-6
}

fn be_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Radius of the spherical earth for code table 3.2 shapes.
fn earth_radius(shape: u8, scale: i8, scaled_radius: u32) -> f64 {
    match shape {
        0 => 6_367_470.0,
        1 if scaled_radius > 0 => scaled_radius as f64 * 10f64.powi(-(scale as i32)),
        8 => 6_371_200.0,
        _ => projection::NCEP_EARTH_RADIUS_M,
    }
}

fn require_template_len(gd: &[u8], needed: usize, template: u16) -> Result<()> {
    if gd.len() < needed {
        return Err(invalid(
            3,
            format!("Template {} needs at least {} bytes, got {}", template, needed, gd.len()),
        ));
    }
    Ok(())
}

fn invalid(section: u8, reason: String) -> Grib2Error {
    Grib2Error::InvalidSection { section, reason }
}

fn section_length(data: &[u8], offset: usize) -> usize {
    u32::from_be_bytes(be_array(&data[offset..offset + 4])) as usize
}

/// The whole of section `section_num`, header included.
fn section(data: &[u8], section_num: u8) -> Result<&[u8]> {
    let offset = find_section(data, section_num)?;
    Ok(&data[offset..offset + section_length(data, offset)])
}

/// Offset of the first section with the given number. Lengths are validated
/// against the message so callers may slice the returned section directly.
pub fn find_section(data: &[u8], section_num: u8) -> Result<usize> {
    let mut offset = 16;

    loop {
        if offset + 4 <= data.len() && &data[offset..offset + 4] == b"7777" {
            return Err(invalid(section_num, "Section not found".to_string()));
        }
        if offset + 5 > data.len() {
            return Err(invalid(section_num, "Section not found".to_string()));
        }

        let length = section_length(data, offset);
        if length < 5 || offset + length > data.len() {
            return Err(invalid(
                data[offset + 4],
                format!("Invalid section length {} at offset {}", length, offset),
            ));
        }

        if data[offset + 4] == section_num {
            return Ok(offset);
        }
        offset += length;
    }
}

/// Short name for a (discipline, category, number) parameter.
pub fn get_parameter_short_name(discipline: u8, category: u8, number: u8) -> String {
    let name = match (discipline, category, number) {
        (0, 0, 0) => "TMP",
        (0, 0, 2) => "POT",
        (0, 0, 6) => "DPT",
        (0, 1, 0) => "SPFH",
        (0, 1, 1) => "RH",
        (0, 2, 2) => "UGRD",
        (0, 2, 3) => "VGRD",
        (0, 2, 8) => "VVEL",
        (0, 2, 10) => "ABSV",
        (0, 3, 0) => "PRES",
        (0, 3, 1) => "PRMSL",
        (0, 3, 5) => "HGT",
        (0, 6, 1) => "TCDC",
        (0, 19, 0) => "VIS",
        _ => return format!("P{}_{}_{}", discipline, category, number),
    };
    name.to_string()
}

fn get_level_description(surface: &FixedSurface) -> String {
    match (surface.surface_type, surface.value()) {
        (1, _) => "surface".to_string(),
        (ISOBARIC_SURFACE, Some(pa)) => format!("{} mb", pa / 100.0),
        (101, _) => "mean sea level".to_string(),
        (102, Some(m)) => format!("{} m above MSL", m),
        (103, Some(m)) => format!("{} m above ground", m),
        (200, _) => "entire atmosphere".to_string(),
        (t, Some(v)) => format!("Level type {} value {}", t, v),
        (t, None) => format!("Level type {}", t),
    }
}

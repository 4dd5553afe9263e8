//! GRIB2 data unpacking.
//!
//! Simple packing (template 5.0) is decoded here. Complex packing, JPEG2000
//! and PNG (templates 5.2, 5.3, 5.40, 5.41) go through the `grib` crate.

use std::io::Cursor;

use tracing::debug;

use crate::{Grib2Error, Result};

/// Unpack simple packed values into a full grid.
///
/// `value = (R + X * 2^E) / 10^D`. Only points flagged present in the bitmap
/// are packed; the rest come back as NaN.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: usize,
    bits_per_value: u8,
    reference_value: f32,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    bitmap: Option<&[u8]>,
) -> Result<Vec<f32>> {
    let binary_scale = 2f64.powi(binary_scale_factor as i32);
    let decimal_scale = 10f64.powi(-(decimal_scale_factor as i32));
    let reference = reference_value as f64;
    let bits = bits_per_value as usize;

    let mut values = Vec::with_capacity(num_points);
    let mut bit_position = 0;

    for i in 0..num_points {
        if let Some(bm) = bitmap {
            if !bitmap_bit(bm, i) {
                values.push(f32::NAN);
                continue;
            }
        }

        let packed = if bits == 0 {
            0
        } else {
            let x = extract_bits(packed_data, bit_position, bits)?;
            bit_position += bits;
            x
        };

        values.push(((reference + packed as f64 * binary_scale) * decimal_scale) as f32);
    }

    Ok(values)
}

fn bitmap_bit(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .get(index / 8)
        .map(|byte| (byte >> (7 - index % 8)) & 1 == 1)
        .unwrap_or(false)
}

/// Read `num_bits` (1-32) MSB-first starting at `start_bit`.
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32> {
    if num_bits == 0 || num_bits > 32 {
        return Err(Grib2Error::UnpackingError(format!(
            "Invalid number of bits: {}",
            num_bits
        )));
    }
    if (start_bit + num_bits).div_ceil(8) > data.len() {
        return Err(Grib2Error::UnpackingError(format!(
            "Not enough data to extract {} bits at bit {} from {} bytes",
            num_bits,
            start_bit,
            data.len()
        )));
    }

    let mut result = 0u32;
    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let bit = (data[absolute_bit / 8] >> (7 - absolute_bit % 8)) & 1;
        result = (result << 1) | bit as u32;
    }
    Ok(result)
}

/// Decode a whole message with the `grib` crate. Only the first submessage
/// is returned.
pub fn unpack_with_grib_crate(message: &[u8]) -> Result<Vec<f32>> {
    let grib_file = grib::from_reader(Cursor::new(message))
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate failed to read message: {}", e)))?;

    let ((_, submessage_index), submessage) = grib_file
        .iter()
        .next()
        .ok_or_else(|| Grib2Error::UnpackingError("message has no submessages".to_string()))?;
    debug!(submessage = submessage_index, "Decoding with grib crate");

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate decoder: {}", e)))?;
    let values = decoder
        .dispatch()
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate unpacking: {}", e)))?;
    Ok(values.collect())
}

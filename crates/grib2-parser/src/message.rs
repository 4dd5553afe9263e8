//! Message framing and per-message decoding.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use projection::{LambertConformal, LambertParams};

use crate::sections::{
    parse_bitmap, parse_data_representation, parse_data_section, parse_grid_definition,
    parse_identification, parse_indicator, parse_product_definition, Bitmap, DataRepresentation,
    DataSection, GridDefinition, GridTemplate, Identification, Indicator, ProductDefinition,
};
use crate::unpacking::{unpack_simple, unpack_with_grib_crate};
use crate::{Grib2Error, Result};

/// Scanning mode flag table 3.4 bits.
const SCAN_NEGATIVE_I: u8 = 0x80;
const SCAN_POSITIVE_J: u8 = 0x40;
const SCAN_J_CONSECUTIVE: u8 = 0x20;
const SCAN_BOUSTROPHEDON: u8 = 0x10;

/// One decoded GRIB2 message. Values are unpacked on demand.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub raw: Bytes,
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    pub data_section: DataSection,
}

impl Grib2Message {
    /// Parse a complete message, `GRIB` through `7777`. The bitmap is only
    /// read when values are unpacked.
    pub fn parse(raw: Bytes) -> Result<Self> {
        let indicator = parse_indicator(&raw)?;
        let identification = parse_identification(&raw)?;
        let grid_definition = parse_grid_definition(&raw)?;
        let product_definition = parse_product_definition(&raw, indicator.discipline)?;
        let data_representation = parse_data_representation(&raw)?;
        let data_section = parse_data_section(&raw)?;

        Ok(Self {
            raw,
            indicator,
            identification,
            grid_definition,
            product_definition,
            data_representation,
            data_section,
        })
    }

    /// Parameter short name such as `TMP`.
    pub fn parameter(&self) -> &str {
        &self.product_definition.parameter_short_name
    }

    /// Level in hPa when the product is on an isobaric surface.
    pub fn pressure_hpa(&self) -> Option<f64> {
        self.product_definition
            .first_surface
            .and_then(|s| s.pressure_hpa())
    }

    /// (rows, cols)
    pub fn grid_dims(&self) -> (usize, usize) {
        (
            self.grid_definition.nj as usize,
            self.grid_definition.ni as usize,
        )
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.identification.reference_time
    }

    /// Reference time plus forecast time, assuming hourly forecast units.
    pub fn valid_time(&self) -> DateTime<Utc> {
        self.reference_time() + Duration::hours(self.product_definition.forecast_time as i64)
    }

    /// Section 6, `None` when every point is present.
    pub fn bitmap(&self) -> Result<Option<Bitmap>> {
        parse_bitmap(&self.raw)
    }

    /// Unpacked values in scan order, NaN where the bitmap marks a point missing.
    pub fn unpack_data(&self) -> Result<Vec<f32>> {
        let num_points = self.grid_definition.num_data_points as usize;
        let dr = &self.data_representation;

        let values = if dr.template_number == 0 {
            let bitmap = self.bitmap()?;
            unpack_simple(
                &self.data_section.data,
                num_points,
                dr.bits_per_value,
                dr.reference_value,
                dr.binary_scale_factor,
                dr.decimal_scale_factor,
                bitmap.as_ref().map(|b| &b.data[..]),
            )?
        } else {
            debug!(
                template = dr.template_number,
                parameter = %self.parameter(),
                "Delegating data template to grib crate"
            );
            unpack_with_grib_crate(&self.raw)?
        };

        if values.len() != num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "decoded {} values for {} grid points",
                values.len(),
                num_points
            )));
        }
        Ok(values)
    }

    /// Flattened (lats, lons) in scan order, longitudes in [-180, 180).
    ///
    /// Rows follow j and columns follow i, so the arrays line up with
    /// [`Self::unpack_data`] as a row-major grid of [`Self::grid_dims`].
    pub fn coordinates(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        let gd = &self.grid_definition;
        let scan = gd.scanning_mode;
        if scan & (SCAN_J_CONSECUTIVE | SCAN_BOUSTROPHEDON) != 0 {
            return Err(Grib2Error::UnsupportedScanMode(scan));
        }

        let (rows, cols) = self.grid_dims();
        if rows * cols != gd.num_data_points as usize {
            return Err(Grib2Error::InvalidSection {
                section: 3,
                reason: format!(
                    "{}x{} grid does not hold {} points",
                    cols, rows, gd.num_data_points
                ),
            });
        }

        let i_sign = if scan & SCAN_NEGATIVE_I != 0 { -1.0 } else { 1.0 };
        let j_sign = if scan & SCAN_POSITIVE_J != 0 { 1.0 } else { -1.0 };

        let mut lats = Vec::with_capacity(rows * cols);
        let mut lons = Vec::with_capacity(rows * cols);

        match gd.template {
            GridTemplate::LatLon(grid) => {
                for row in 0..rows {
                    let lat = grid.la1 + j_sign * row as f64 * grid.dj;
                    for col in 0..cols {
                        lats.push(lat);
                        lons.push(density_altitude::normalize_longitude(
                            grid.lo1 + i_sign * col as f64 * grid.di,
                        ));
                    }
                }
            }
            GridTemplate::Lambert(grid) => {
                let proj = LambertConformal::new(LambertParams {
                    lat1: grid.la1,
                    lon1: grid.lo1,
                    lov: grid.lov,
                    latin1: grid.latin1,
                    latin2: grid.latin2,
                    dx: grid.dx,
                    dy: grid.dy,
                    nx: cols,
                    ny: rows,
                    earth_radius: gd.earth_radius_m,
                })?;
                // Projected j grows northward from the first point
                for row in 0..rows {
                    for col in 0..cols {
                        let (lat, lon) = proj.grid_to_geo(i_sign * col as f64, j_sign * row as f64);
                        lats.push(lat);
                        lons.push(lon);
                    }
                }
            }
            GridTemplate::Unsupported(template) => {
                return Err(Grib2Error::UnsupportedTemplate {
                    section: 3,
                    template,
                })
            }
        }

        Ok((lats, lons))
    }
}

/// Iterates the messages of a GRIB2 file held in memory.
///
/// Bytes between messages (padding, other formats) are skipped.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
}

impl Grib2Reader {
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Next message, or `None` once no further `GRIB` marker exists.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>> {
        let start = match find_magic(&self.data, self.offset) {
            Some(start) => start,
            None => {
                self.offset = self.data.len();
                return Ok(None);
            }
        };
        if start > self.offset {
            warn!(
                skipped = start - self.offset,
                offset = self.offset,
                "Skipping bytes before GRIB marker"
            );
        }

        let available = self.data.len() - start;
        if available < 16 {
            self.offset = self.data.len();
            return Err(Grib2Error::Truncated {
                offset: start,
                needed: 16,
                available,
            });
        }

        let indicator = parse_indicator(&self.data[start..start + 16])?;
        let length = indicator.message_length as usize;
        if length < 16 + 4 || length > available {
            self.offset = self.data.len();
            return Err(Grib2Error::Truncated {
                offset: start,
                needed: length,
                available,
            });
        }
        if &self.data[start + length - 4..start + length] != b"7777" {
            self.offset = self.data.len();
            return Err(Grib2Error::InvalidFormat(format!(
                "message at offset {} does not end with 7777",
                start
            )));
        }

        self.offset = start + length;
        Grib2Message::parse(self.data.slice(start..start + length)).map(Some)
    }
}

impl Iterator for Grib2Reader {
    type Item = Result<Grib2Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(4)
        .position(|w| w == b"GRIB")
        .map(|p| from + p)
}

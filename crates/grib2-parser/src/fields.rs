//! Extraction of the isobaric temperature, humidity and height fields.

use std::sync::Arc;

use tracing::{debug, info, warn};

use density_altitude::{FieldLevel, GridField, GridShape, IsobaricFields};

use crate::{Grib2Error, Grib2Message, Grib2Reader, Result};

/// Which output list a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Temperature,
    Height,
    Humidity,
}

impl FieldKind {
    fn of(message: &Grib2Message) -> Option<Self> {
        match message.parameter() {
            "TMP" => Some(FieldKind::Temperature),
            "HGT" => Some(FieldKind::Height),
            "RH" => Some(FieldKind::Humidity),
            _ => None,
        }
    }
}

/// Coordinates decoded once per distinct grid definition.
struct GridCoordinates {
    key: bytes::Bytes,
    shape: GridShape,
    lats: Arc<[f64]>,
    lons: Arc<[f64]>,
}

/// Decode every TMP, HGT and RH message on an isobaric level.
///
/// Other products are skipped without unpacking. Fields that share a grid
/// definition share one coordinate array. All selected fields must lie on the
/// same grid, and a repeated (parameter, level) pair keeps its first message.
pub fn extract_isobaric_fields(reader: Grib2Reader) -> Result<IsobaricFields> {
    let mut fields = IsobaricFields::default();
    let mut grids: Vec<GridCoordinates> = Vec::new();
    let mut scanned = 0usize;

    for message in reader {
        let message = message?;
        scanned += 1;

        let (kind, pressure_hpa) = match (FieldKind::of(&message), message.pressure_hpa()) {
            (Some(kind), Some(p)) => (kind, p),
            _ => continue,
        };

        let target = match kind {
            FieldKind::Temperature => &mut fields.temperature,
            FieldKind::Height => &mut fields.height,
            FieldKind::Humidity => &mut fields.humidity,
        };
        if target.iter().any(|l| l.pressure_hpa == pressure_hpa) {
            warn!(
                parameter = %message.parameter(),
                pressure_hpa,
                "Duplicate isobaric message, keeping the first"
            );
            continue;
        }

        let key = message.grid_definition.raw.clone();
        let coords = match grids.iter().position(|g| g.key == key) {
            Some(i) => &grids[i],
            None => {
                let (rows, cols) = message.grid_dims();
                let (lats, lons) = message.coordinates()?;
                debug!(rows, cols, template = message.grid_definition.template_number, "Decoded grid coordinates");
                grids.push(GridCoordinates {
                    key,
                    shape: GridShape::new(rows, cols),
                    lats: lats.into(),
                    lons: lons.into(),
                });
                &grids[grids.len() - 1]
            }
        };

        let values = message.unpack_data()?;
        let field = GridField::new(coords.shape, values, coords.lats.clone(), coords.lons.clone())?;
        target.push(FieldLevel::new(pressure_hpa, field));
    }

    if grids.len() > 1 {
        return Err(Grib2Error::InvalidFormat(format!(
            "isobaric fields span {} different grids",
            grids.len()
        )));
    }

    info!(
        messages = scanned,
        temperature_levels = fields.temperature.len(),
        height_levels = fields.height.len(),
        humidity_levels = fields.humidity.len(),
        "Extracted isobaric fields"
    );
    Ok(fields)
}

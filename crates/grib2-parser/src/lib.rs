//! GRIB2 (WMO FM 92 edition 2) reader for isobaric model output.
//!
//! Frames messages out of an in-memory file, decodes the sections needed
//! to place a product on a grid, and unpacks values. Simple packing is
//! handled here and other data templates are decoded with the `grib` crate.
//! [`extract_isobaric_fields`] collects the temperature, humidity and
//! geopotential height levels used by the density-altitude lookup.

pub mod fields;
pub mod message;
pub mod sections;
pub mod unpacking;

pub use fields::extract_isobaric_fields;
pub use message::{Grib2Message, Grib2Reader};
pub use unpacking::unpack_simple;

use density_altitude::DaError;
use projection::ProjectionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Grib2Error>;

#[derive(Debug, Error)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unsupported template {section}.{template}")]
    UnsupportedTemplate { section: u8, template: u16 },

    #[error("Unsupported scanning mode {0:#010b}")]
    UnsupportedScanMode(u8),

    #[error("Truncated message at offset {offset}: needs {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unpacking failed: {0}")]
    UnpackingError(String),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Grid(#[from] DaError),
}

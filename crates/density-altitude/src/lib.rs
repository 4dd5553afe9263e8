//! Reverse density-altitude lookup.
//!
//! Given isobaric temperature, humidity and geopotential height from a
//! gridded model snapshot, finds the altitude above mean sea level at which
//! a target density altitude occurs at a point.
//!
//! The pipeline is pure and synchronous:
//!
//! 1. [`grid::locate`] snaps the query point to the nearest grid cell.
//! 2. [`ProfileBuilder`] extracts a surface-up [`VerticalProfile`] at that cell.
//! 3. [`ReverseResolver`] computes density altitude per level with
//!    [`physics`] and interpolates the crossing height.
//! 4. [`AltitudeUnit`] converts the result for display.

pub mod error;
pub mod grid;
pub mod physics;
pub mod profile;
pub mod query;
pub mod resolver;
pub mod units;

pub use error::{DaError, Result};
pub use grid::{locate, normalize_longitude, GridField, GridIndex, GridShape};
pub use profile::{FieldLevel, LevelSample, ProfileBuilder, VerticalProfile};
pub use query::{DaQuery, DaReport, IsobaricFields};
pub use resolver::{
    diagnose, find_crossing, Bracket, Crossing, DaResult, HeightKind, LevelDiagnostic,
    ReverseResolver, ScanMode,
};
pub use units::{convert, AltitudeUnit, UnknownUnit, FEET_PER_KM};

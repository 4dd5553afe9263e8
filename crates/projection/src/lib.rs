//! Map projections for model grids that are not regular lat/lon.

pub mod lambert;

pub use lambert::{LambertConformal, LambertParams, NCEP_EARTH_RADIUS_M};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProjectionError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("Invalid projection parameters: {0}")]
    InvalidParameters(String),
}

//! Decoding model files into isobaric fields.

use std::path::Path;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use density_altitude::IsobaricFields;
use grib2_parser::{extract_isobaric_fields, Grib2Reader};
use tracing::{info, warn};

use crate::config::{IssueTime, ModelProduct};
use crate::download::DownloadManager;

/// Read and decode a GRIB2 file on the blocking pool.
pub async fn load_fields(path: &Path) -> Result<IsobaricFields> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let size = data.len();

    let fields = tokio::task::spawn_blocking(move || extract_isobaric_fields(Grib2Reader::new(Bytes::from(data))))
        .await
        .context("Decoder task failed")?
        .with_context(|| format!("Failed to decode {}", path.display()))?;

    if fields.temperature.is_empty() {
        bail!("{} holds no isobaric temperature fields", path.display());
    }
    info!(
        path = %path.display(),
        bytes = size,
        levels = fields.temperature.len(),
        "Loaded model fields"
    );
    Ok(fields)
}

/// Download one model run into a scratch directory and decode it. The file
/// is deleted as soon as its fields are in memory.
pub async fn fetch_fields(
    downloader: &DownloadManager,
    product: &ModelProduct,
    issue: IssueTime,
    fh: u32,
) -> Result<IsobaricFields> {
    let scratch = tempfile::Builder::new()
        .prefix("rdacalc-")
        .tempdir()
        .context("Failed to create scratch directory")?;
    let name = product.file_name(issue, fh)?;
    let path = downloader
        .fetch_product(product, issue, fh, scratch.path(), &name)
        .await?;

    let fields = load_fields(&path).await;
    after_cleanup(fields, scratch.close())
}

/// The decode outcome wins over a failed scratch cleanup, which is only logged.
fn after_cleanup<T>(decoded: Result<T>, cleanup: std::io::Result<()>) -> Result<T> {
    if let Err(e) = cleanup {
        warn!(error = %e, "Failed to remove scratch directory");
    }
    decoded
}

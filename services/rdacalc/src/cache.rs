//! Keep exactly one current model file per product in a directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info};

use crate::config::{IssueTime, ModelProduct};
use crate::download::DownloadManager;

/// Files of `product` in `names` other than `keep`.
pub fn stale_files<'a>(names: &'a [String], product: &ModelProduct, keep: &str) -> Vec<&'a str> {
    names
        .iter()
        .map(String::as_str)
        .filter(|name| *name != keep && product.owns_file(name))
        .collect()
}

async fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Make sure `dir` holds the file for `issue`, downloading it if absent,
/// then delete every older file of the product. Returns the kept path.
///
/// Old files are only removed once the current one is in place, so a failed
/// download leaves the previous file usable.
pub async fn rotate(
    downloader: &DownloadManager,
    dir: &Path,
    product: &ModelProduct,
    issue: IssueTime,
    fh: u32,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let keep = product.local_file_name(issue, fh)?;
    let names = list_files(dir).await?;

    let path = if names.iter().any(|n| *n == keep) {
        debug!(file = %keep, "Current model file already present");
        dir.join(&keep)
    } else {
        downloader.fetch_product(product, issue, fh, dir, &keep).await?
    };

    for name in stale_files(&names, product, &keep) {
        let stale = dir.join(name);
        fs::remove_file(&stale)
            .await
            .with_context(|| format!("Failed to remove {}", stale.display()))?;
        info!(file = %name, "Removed old model file");
    }

    Ok(path)
}

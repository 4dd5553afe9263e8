//! Model file retrieval with retry and resumption.
//!
//! - Streams to `<name>.partial` and renames once complete
//! - HTTP Range requests resume a partial file on retry
//! - Exponential backoff between attempts
//! - Size verification against Content-Length

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{header, Client, Response, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::config::{IssueTime, ModelProduct, DEFAULT_BASE_URL};

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Root URL the product directory templates are appended to
    pub base_url: String,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(60),
            request_timeout: Duration::from_secs(600), // 10 minutes
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl DownloadProgress {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            total_bytes: None,
            downloaded_bytes: 0,
            started_at: now,
            last_update: now,
        }
    }

    pub fn percent_complete(&self) -> Option<f64> {
        self.total_bytes
            .filter(|&total| total > 0)
            .map(|total| (self.downloaded_bytes as f64 / total as f64) * 100.0)
    }

    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = (self.last_update - self.started_at).num_milliseconds() as f64 / 1000.0;
        if elapsed > 0.0 {
            self.downloaded_bytes as f64 / elapsed
        } else {
            0.0
        }
    }
}

pub struct DownloadManager {
    client: Client,
    config: DownloadConfig,
}

impl DownloadManager {
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Fetch one model file into `dir` under `local_name`.
    pub async fn fetch_product(
        &self,
        product: &ModelProduct,
        issue: IssueTime,
        fh: u32,
        dir: &Path,
        local_name: &str,
    ) -> Result<PathBuf> {
        let url = product.url(&self.config.base_url, issue, fh)?;
        info!(
            product = %product.id,
            name = %product.full_name,
            issue = %issue,
            fh,
            "Fetching model file"
        );
        self.download(&url, dir, local_name).await
    }

    /// Download `url` to `dir/filename`, retrying with backoff.
    ///
    /// An existing complete file is returned without a request.
    #[instrument(skip(self, dir), fields(url = %url))]
    pub async fn download(&self, url: &str, dir: &Path, filename: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let temp_path = dir.join(format!("{}.partial", filename));
        let final_path = dir.join(filename);

        if fs::try_exists(&final_path).await.unwrap_or(false) {
            info!(path = %final_path.display(), "File already exists, skipping download");
            return Ok(final_path);
        }

        let mut progress = DownloadProgress::new();
        let mut retry_count = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            match self.download_with_resume(url, &temp_path, &mut progress).await {
                Ok(()) => {
                    let actual = fs::metadata(&temp_path).await?.len();
                    if let Some(expected) = progress.total_bytes {
                        if actual != expected {
                            fs::remove_file(&temp_path).await.ok();
                            return Err(anyhow!(
                                "Download size mismatch: expected {} bytes, got {}",
                                expected,
                                actual
                            ));
                        }
                    }

                    fs::rename(&temp_path, &final_path)
                        .await
                        .with_context(|| format!("Failed to move download to {}", final_path.display()))?;

                    info!(
                        path = %final_path.display(),
                        bytes = actual,
                        "Download completed"
                    );
                    return Ok(final_path);
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        fs::remove_file(&temp_path).await.ok();
                        return Err(e.context(format!("Download of {} failed after {} attempts", url, retry_count)));
                    }

                    warn!(
                        error = %e,
                        retry = retry_count,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Download failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
            }
        }
    }

    /// One attempt, continuing from whatever the partial file holds.
    async fn download_with_resume(
        &self,
        url: &str,
        temp_path: &Path,
        progress: &mut DownloadProgress,
    ) -> Result<()> {
        let resume_from = match fs::metadata(temp_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        if let Some(total) = progress.total_bytes {
            if resume_from >= total {
                progress.downloaded_bytes = total;
                return Ok(());
            }
        }

        let mut request = self.client.get(url);
        if resume_from > 0 {
            debug!(resume_from, total = ?progress.total_bytes, "Resuming download");
            request = request.header(header::RANGE, format!("bytes={}-", resume_from));
        }

        let response = request.send().await.context("HTTP request failed")?;

        let append = match response.status() {
            StatusCode::OK => {
                progress.total_bytes = content_length(&response);
                false
            }
            StatusCode::PARTIAL_CONTENT => {
                if progress.total_bytes.is_none() {
                    progress.total_bytes = content_length(&response).map(|len| len + resume_from);
                }
                true
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                // Stale partial file; start over on the next attempt
                fs::remove_file(temp_path).await.ok();
                return Err(anyhow!("Range not satisfiable at byte {}", resume_from));
            }
            status => return Err(anyhow!("HTTP error: {}", status)),
        };

        progress.downloaded_bytes = if append { resume_from } else { 0 };
        self.stream_to_file(response, temp_path, append, progress).await
    }

    async fn stream_to_file(
        &self,
        response: Response,
        path: &Path,
        append: bool,
        progress: &mut DownloadProgress,
    ) -> Result<()> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let mut file = options
            .open(path)
            .await
            .context("Failed to open output file")?;

        let mut stream = response.bytes_stream();
        let mut bytes_since_log = 0u64;
        let log_interval = 16 * 1024 * 1024;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading response chunk")?;
            file.write_all(&chunk)
                .await
                .context("Error writing to file")?;

            progress.downloaded_bytes += chunk.len() as u64;
            progress.last_update = Utc::now();
            bytes_since_log += chunk.len() as u64;

            if bytes_since_log >= log_interval {
                bytes_since_log = 0;
                debug!(
                    downloaded = progress.downloaded_bytes,
                    total = ?progress.total_bytes,
                    percent = ?progress.percent_complete().map(|p| format!("{:.1}%", p)),
                    speed = format!("{:.1} KB/s", progress.bytes_per_second() / 1024.0),
                    "Download progress"
                );
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

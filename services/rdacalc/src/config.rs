//! Model product catalog and issue-time handling.
//!
//! Built-in products cover the HRRR and RAP pressure-level files on NOMADS.
//! A YAML file can override them or add more:
//!
//! ```yaml
//! products:
//!   - id: rap
//!     full_name: RAP Pressure Fields, 13km CONUS
//!     dir_template: "rap/prod/rap.%Y%m%d/"
//!     file_template: "rap.t%Hz.awp130pgrbf{fh}.grib2"
//! ```

use std::fmt::{self, Write as _};
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// NOMADS root for operational NCEP model output.
pub const DEFAULT_BASE_URL: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com";

const FH_PLACEHOLDER: &str = "{fh}";

/// One downloadable model file family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProduct {
    pub id: String,
    pub full_name: String,
    /// strftime pattern for the directory under the base URL
    pub dir_template: String,
    /// strftime pattern for the file name; `{fh}` becomes the two-digit
    /// forecast hour
    pub file_template: String,
    #[serde(default = "default_available")]
    pub available: String,
}

fn default_available() -> String {
    "Yesterday through one hour ago".to_string()
}

impl ModelProduct {
    pub fn hrrr() -> Self {
        Self {
            id: "hrrr".to_string(),
            full_name: "HRRR Pressure Fields, 3km CONUS".to_string(),
            dir_template: "hrrr/prod/hrrr.%Y%m%d/conus/".to_string(),
            file_template: "hrrr.t%Hz.wrfprsf{fh}.grib2".to_string(),
            available: default_available(),
        }
    }

    pub fn rap() -> Self {
        Self {
            id: "rap".to_string(),
            full_name: "RAP Pressure Fields, 13km CONUS".to_string(),
            dir_template: "rap/prod/rap.%Y%m%d/".to_string(),
            file_template: "rap.t%Hz.awp130pgrbf{fh}.grib2".to_string(),
            available: default_available(),
        }
    }

    /// Reject templates chrono cannot render or rotation cannot attribute.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            bail!("product id must not be empty");
        }
        for template in [&self.dir_template, &self.file_template] {
            if StrftimeItems::new(template).any(|item| matches!(item, Item::Error)) {
                bail!("product '{}': invalid time pattern '{}'", self.id, template);
            }
        }
        if !self.file_template.contains(FH_PLACEHOLDER) {
            bail!("product '{}': file template lacks {}", self.id, FH_PLACEHOLDER);
        }
        // Rotation tells products apart by this prefix
        if self.file_prefix().is_empty() {
            bail!(
                "product '{}': file template '{}' must start with literal text",
                self.id,
                self.file_template
            );
        }
        Ok(())
    }

    /// Remote file name for an issue time and forecast hour.
    pub fn file_name(&self, issue: IssueTime, fh: u32) -> Result<String> {
        Ok(render(&self.file_template, issue)?.replace(FH_PLACEHOLDER, &format!("{:02}", fh)))
    }

    /// Full download URL.
    pub fn url(&self, base_url: &str, issue: IssueTime, fh: u32) -> Result<String> {
        Ok(format!(
            "{}/{}{}",
            base_url.trim_end_matches('/'),
            render(&self.dir_template, issue)?,
            self.file_name(issue, fh)?
        ))
    }

    /// Local name for rotated files. Remote names omit the date, so it is
    /// prepended to keep runs from different days apart.
    pub fn local_file_name(&self, issue: IssueTime, fh: u32) -> Result<String> {
        Ok(format!("{}.{}", issue.0.format("%Y%m%d"), self.file_name(issue, fh)?))
    }

    /// Whether a directory entry is a file of this product, dated or not.
    pub fn owns_file(&self, name: &str) -> bool {
        let undated = match name.split_once('.') {
            Some((date, rest)) if date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit()) => rest,
            _ => name,
        };
        undated.starts_with(self.file_prefix()) && undated.ends_with(self.file_suffix())
    }

    /// Literal text before the first pattern in the file template.
    fn file_prefix(&self) -> &str {
        let end = self
            .file_template
            .find(['%', '{'])
            .unwrap_or(self.file_template.len());
        &self.file_template[..end]
    }

    /// Literal text after the forecast-hour placeholder.
    fn file_suffix(&self) -> &str {
        self.file_template
            .rsplit_once(FH_PLACEHOLDER)
            .map(|(_, tail)| tail)
            .unwrap_or("")
    }
}

fn render(template: &str, issue: IssueTime) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", issue.0.format(template))
        .map_err(|_| anyhow!("cannot render time pattern '{}'", template))?;
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    products: Vec<ModelProduct>,
}

/// The products `calc`, `download`, `update` and `serve` can fetch.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    products: Vec<ModelProduct>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            products: vec![ModelProduct::hrrr(), ModelProduct::rap()],
        }
    }
}

impl ModelCatalog {
    /// Built-in products, merged with the YAML file at `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut catalog = Self::default();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            catalog.merge_yaml(&text)?;
            info!(path = %path.display(), products = catalog.products.len(), "Loaded model catalog");
        }
        Ok(catalog)
    }

    /// Entries replace built-in products with the same id; new ids are appended.
    pub fn merge_yaml(&mut self, text: &str) -> Result<()> {
        let file: CatalogFile = serde_yaml::from_str(text).context("Failed to parse model catalog YAML")?;
        for product in file.products {
            product.validate()?;
            match self.products.iter_mut().find(|p| p.id == product.id) {
                Some(existing) => {
                    debug!(id = %product.id, "Overriding built-in product");
                    *existing = product;
                }
                None => self.products.push(product),
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&ModelProduct> {
        self.products.iter().find(|p| p.id == id).ok_or_else(|| {
            anyhow!(
                "unknown model '{}', expected one of: {}",
                id,
                self.ids().collect::<Vec<_>>().join(", ")
            )
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.products.iter().map(|p| p.id.as_str())
    }

    pub fn products(&self) -> &[ModelProduct] {
        &self.products
    }
}

/// Model run time in UTC, always on the hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct IssueTime(DateTime<Utc>);

impl IssueTime {
    /// The most recent run expected to be published: one hour before `now`,
    /// truncated to the hour.
    pub fn latest(now: DateTime<Utc>) -> Self {
        let earlier = now - Duration::hours(1);
        Self::from_date_hour(earlier.date_naive(), earlier.hour()).unwrap_or(Self(earlier))
    }

    pub fn from_date_hour(date: NaiveDate, hour: u32) -> Result<Self> {
        let time = NaiveTime::from_hms_opt(hour, 0, 0).ok_or_else(|| anyhow!("hour {} out of range 0-23", hour))?;
        Ok(Self(Utc.from_utc_datetime(&NaiveDateTime::new(date, time))))
    }

    /// Parse a `YYYYMMDD` date.
    pub fn parse_date(date: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(date, "%Y%m%d").with_context(|| format!("invalid date '{}', expected YYYYMMDD", date))
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }
}

impl FromStr for IssueTime {
    type Err = anyhow::Error;

    /// `YYYYMMDDHH`
    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
            bail!("invalid issue time '{}', expected YYYYMMDDHH", s);
        }
        let date = Self::parse_date(&s[..8])?;
        let hour: u32 = s[8..].parse().context("invalid issue hour")?;
        Self::from_date_hour(date, hour)
    }
}

impl fmt::Display for IssueTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %Hz"))
    }
}

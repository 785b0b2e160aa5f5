//! Data models and structures
//!
//! Defines the resize options, transcode results, run accounting and the
//! process-wide configuration shared by the transcoder and the orchestrator.

use crate::image::mime;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How a source aspect ratio is mapped into the target box.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Shrink to fit within the box, no cropping.
    #[default]
    Inside,
    /// Shrink until the box is covered, no cropping.
    Outside,
    /// Cover the box and crop the overflow.
    Cover,
    /// Fit within the box and pad to its exact size.
    Contain,
    /// Stretch to the exact box, ignoring aspect ratio.
    Fill,
}

impl FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inside" => Ok(Self::Inside),
            "outside" => Ok(Self::Outside),
            "cover" => Ok(Self::Cover),
            "contain" => Ok(Self::Contain),
            "fill" => Ok(Self::Fill),
            other => Err(format!(
                "Unknown fit mode '{}'. Expected one of: inside, outside, cover, contain, fill",
                other
            )),
        }
    }
}

/// Formats the transcoder can be asked to produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            other => Err(format!(
                "Unsupported output format '{}'. Expected one of: jpeg, png, webp",
                other
            )),
        }
    }
}

impl From<OutputFormat> for ImageKind {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Jpeg => ImageKind::Jpeg,
            OutputFormat::Png => ImageKind::Png,
            OutputFormat::Webp => ImageKind::Webp,
        }
    }
}

/// Image formats with a known content type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
    Tiff,
    Gif,
}

impl ImageKind {
    pub const ALL: [ImageKind; 5] = [
        ImageKind::Jpeg,
        ImageKind::Png,
        ImageKind::Webp,
        ImageKind::Tiff,
        ImageKind::Gif,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
            Self::Gif => "gif",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "tiff" | "tif" => Some(Self::Tiff),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        mime::resolve_content_type(self.name())
    }

    /// Formats the transcoder re-encodes at the requested quality.
    pub fn is_optimizable(self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Webp)
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for a single transform request.
///
/// Defaults: no explicit dimensions (the transcoder's default width applies),
/// `inside` fit, quality 80, source format preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: FitMode,
    pub quality: u32,
    pub output_format: Option<OutputFormat>,
}

pub const DEFAULT_QUALITY: u32 = 80;
/// Quality applied to batch runs when `RESIZE_QUALITY` is unset.
pub const DEFAULT_BATCH_QUALITY: u32 = 100;

impl Default for ResizeSpec {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            fit: FitMode::Inside,
            quality: DEFAULT_QUALITY,
            output_format: None,
        }
    }
}

impl ResizeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Build the options for a named preset. `default_width` backs the
    /// `default` preset.
    pub fn preset(preset: ResizePreset, default_width: u32) -> Self {
        let (width, quality) = match preset {
            ResizePreset::Thumbnail => (150, 70),
            ResizePreset::Medium => (800, 80),
            ResizePreset::Large => (1200, 85),
            ResizePreset::Default => (default_width, DEFAULT_QUALITY),
        };
        Self::new().with_width(width).with_quality(quality)
    }

    /// Reject out-of-range values instead of handing them to the codec.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(Error::InvalidSpec(format!(
                "quality must be between 1 and 100, got {}",
                self.quality
            )));
        }
        if self.width == Some(0) {
            return Err(Error::InvalidSpec("width must be positive".to_string()));
        }
        if self.height == Some(0) {
            return Err(Error::InvalidSpec("height must be positive".to_string()));
        }
        Ok(())
    }
}

/// Named resize presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizePreset {
    Thumbnail,
    Medium,
    Large,
    #[default]
    Default,
}

impl FromStr for ResizePreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "thumbnail" => Ok(Self::Thumbnail),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "default" => Ok(Self::Default),
            other => Err(format!(
                "Unknown preset '{}'. Expected one of: thumbnail, medium, large, default",
                other
            )),
        }
    }
}

/// Output of one transcode call.
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub bytes: Vec<u8>,
    pub source_format: String,
    pub resolved_format: ImageKind,
    pub width: u32,
    pub height: u32,
    pub original_byte_length: usize,
    pub new_byte_length: usize,
    pub compression_ratio_percent: f64,
}

impl TranscodeResult {
    pub fn content_type(&self) -> &'static str {
        self.resolved_format.content_type()
    }

    /// Bytes saved by the transcode; negative when the output grew.
    pub fn byte_savings(&self) -> i64 {
        self.original_byte_length as i64 - self.new_byte_length as i64
    }
}

/// `(orig - new) / orig * 100`, rounded to two decimals.
pub fn compression_ratio_percent(original: usize, new: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let ratio = (original as f64 - new as f64) / original as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedItem {
    pub key: String,
    pub reason: String,
}

/// Counters for one orchestration run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BatchRun {
    pub processed_count: usize,
    pub error_count: usize,
    pub total_byte_savings: i64,
    pub failures: Vec<FailedItem>,
}

impl BatchRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, byte_savings: i64) {
        self.processed_count += 1;
        self.total_byte_savings += byte_savings;
    }

    pub fn record_failure(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        self.error_count += 1;
        self.failures.push(FailedItem {
            key: key.into(),
            reason: reason.into(),
        });
    }

    pub fn total_items(&self) -> usize {
        self.processed_count + self.error_count
    }

    pub fn savings_mb(&self) -> f64 {
        self.total_byte_savings as f64 / 1024.0 / 1024.0
    }
}

/// Folder name archived originals are written under.
pub const BACKUP_FOLDER: &str = "backup";

/// Treat `prefix` as a folder: non-empty prefixes always end in `/`, so
/// `photos` never matches `photos2/...`.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

fn backup_root(prefix: &str) -> String {
    let base = prefix.trim_end_matches('/');
    if base.is_empty() {
        format!("{}/", BACKUP_FOLDER)
    } else {
        format!("{}/{}/", base, BACKUP_FOLDER)
    }
}

/// Derive the backup location for `key` by substituting `prefix` with
/// `<prefix>/backup/`. Keys outside the prefix go to `backup/<key>` so the
/// backup never aliases the original.
pub fn backup_key(prefix: &str, key: &str) -> String {
    let prefix = normalize_prefix(prefix);
    match key.strip_prefix(prefix.as_str()) {
        Some(rest) if !prefix.is_empty() => format!("{}{}", backup_root(&prefix), rest),
        _ => format!("{}/{}", BACKUP_FOLDER, key),
    }
}

/// Whether `key` already lives in the backup folder of `prefix`.
pub fn is_backup_key(prefix: &str, key: &str) -> bool {
    key.starts_with(&backup_root(prefix))
}

// Configuration
pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_ITEM_DELAY_MS: u64 = 100;
pub const DEFAULT_FETCH_RETRIES: usize = 2;
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub default_width: u32,
    pub default_quality: u32,
    pub item_delay: Duration,
    pub fetch_retries: usize,
    pub dry_run: bool,
}

impl Config {
    /// Configuration with defaults for everything but the bucket and prefix.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            default_width: DEFAULT_WIDTH,
            default_quality: DEFAULT_BATCH_QUALITY,
            item_delay: Duration::from_millis(DEFAULT_ITEM_DELAY_MS),
            fetch_retries: DEFAULT_FETCH_RETRIES,
            dry_run: false,
        }
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    pub fn with_fetch_retries(mut self, retries: usize) -> Self {
        self.fetch_retries = retries;
        self
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bucket = non_empty("S3_BUCKET_NAME")
            .ok_or_else(|| Error::Config("S3_BUCKET_NAME not set".to_string()))?;
        let mut config = Self::new(bucket, lookup("S3_DIRECTORY_PREFIX").unwrap_or_default());

        if let Some(region) = non_empty("AWS_REGION") {
            config.region = region;
        }
        config.endpoint = non_empty("S3_ENDPOINT");
        config.access_key_id = non_empty("AWS_ACCESS_KEY_ID");
        config.secret_access_key = non_empty("AWS_SECRET_ACCESS_KEY");

        if let Some(width) = non_empty("RESIZE_WIDTH") {
            config.default_width = parse_var("RESIZE_WIDTH", &width)?;
            if config.default_width == 0 {
                return Err(Error::Config("RESIZE_WIDTH must be positive".to_string()));
            }
        }
        if let Some(quality) = non_empty("RESIZE_QUALITY") {
            config.default_quality = parse_var("RESIZE_QUALITY", &quality)?;
            if !(1..=100).contains(&config.default_quality) {
                return Err(Error::Config(
                    "RESIZE_QUALITY must be between 1 and 100".to_string(),
                ));
            }
        }
        if let Some(delay) = non_empty("ITEM_DELAY_MS") {
            config.item_delay = Duration::from_millis(parse_var("ITEM_DELAY_MS", &delay)?);
        }
        if let Some(retries) = non_empty("FETCH_RETRIES") {
            config.fetch_retries = parse_var("FETCH_RETRIES", &retries)?;
        }
        if let Some(dry_run) = non_empty("DRY_RUN") {
            config.dry_run = matches!(
                dry_run.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }

        Ok(config)
    }

    /// The options used for every item of a batch.
    pub fn default_spec(&self) -> ResizeSpec {
        ResizeSpec::new()
            .with_width(self.default_width)
            .with_quality(self.default_quality)
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has an invalid value: '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_backup_key_under_prefix() {
        assert_eq!(
            backup_key("photos/", "photos/img1.png"),
            "photos/backup/img1.png"
        );
        assert_eq!(
            backup_key("photos/", "photos/2024/img1.png"),
            "photos/backup/2024/img1.png"
        );
    }

    #[test]
    fn test_backup_key_prefix_without_trailing_slash() {
        assert_eq!(
            backup_key("photos", "photos/img1.png"),
            "photos/backup/img1.png"
        );
    }

    #[test]
    fn test_backup_key_sibling_folder_is_outside_prefix() {
        assert_eq!(backup_key("photos", "photos2/a.jpg"), "backup/photos2/a.jpg");
        assert!(!is_backup_key("photos", "photos2/backup/a.jpg"));
        assert_eq!(normalize_prefix("photos"), "photos/");
        assert_eq!(normalize_prefix("photos/"), "photos/");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_backup_key_outside_prefix_never_aliases() {
        assert_eq!(backup_key("photos/", "other/a.jpg"), "backup/other/a.jpg");
        assert_eq!(backup_key("", "a.jpg"), "backup/a.jpg");
        assert_ne!(backup_key("photos/", "other/a.jpg"), "other/a.jpg");
    }

    #[test]
    fn test_is_backup_key() {
        assert!(is_backup_key("photos/", "photos/backup/img1.png"));
        assert!(!is_backup_key("photos/", "photos/img1.png"));
        assert!(is_backup_key("", "backup/a.jpg"));
    }

    #[test]
    fn test_resize_spec_validation() {
        assert!(ResizeSpec::new().validate().is_ok());
        assert!(ResizeSpec::new().with_quality(1).validate().is_ok());
        assert!(ResizeSpec::new().with_quality(100).validate().is_ok());

        for spec in [
            ResizeSpec::new().with_quality(0),
            ResizeSpec::new().with_quality(101),
            ResizeSpec::new().with_width(0),
            ResizeSpec::new().with_height(0),
        ] {
            assert!(matches!(spec.validate(), Err(Error::InvalidSpec(_))));
        }
    }

    #[test]
    fn test_presets() {
        let thumb = ResizeSpec::preset(ResizePreset::Thumbnail, 1024);
        assert_eq!(thumb.width, Some(150));
        assert_eq!(thumb.height, None);
        assert_eq!(thumb.quality, 70);
        assert_eq!(thumb.fit, FitMode::Inside);

        let default = ResizeSpec::preset(ResizePreset::Default, 640);
        assert_eq!(default.width, Some(640));
        assert_eq!(default.quality, 80);

        assert_eq!("LARGE".parse::<ResizePreset>(), Ok(ResizePreset::Large));
        assert!("huge".parse::<ResizePreset>().is_err());
    }

    #[test]
    fn test_parse_fit_and_format() {
        assert_eq!("cover".parse::<FitMode>(), Ok(FitMode::Cover));
        assert_eq!("jpg".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert!("tiff".parse::<OutputFormat>().is_err());
        assert!("stretch".parse::<FitMode>().is_err());
    }

    #[test]
    fn test_compression_ratio_rounding() {
        assert_eq!(compression_ratio_percent(1000, 250), 75.0);
        assert_eq!(compression_ratio_percent(3, 2), 33.33);
        assert_eq!(compression_ratio_percent(100, 150), -50.0);
    }

    #[test]
    fn test_batch_run_accounting() {
        let mut run = BatchRun::new();
        run.record_success(1024 * 1024);
        run.record_success(-512);
        run.record_failure("a.jpg", "boom");

        assert_eq!(run.processed_count, 2);
        assert_eq!(run.error_count, 1);
        assert_eq!(run.total_items(), 3);
        assert_eq!(run.total_byte_savings, 1024 * 1024 - 512);
        assert_eq!(
            run.failures,
            vec![FailedItem {
                key: "a.jpg".to_string(),
                reason: "boom".to_string()
            }]
        );
    }

    #[test]
    fn test_config_from_lookup_defaults() {
        let config = Config::from_lookup(lookup_from(&[("S3_BUCKET_NAME", "media")])).unwrap();

        assert_eq!(config.bucket, "media");
        assert_eq!(config.prefix, "");
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.default_width, 1024);
        assert_eq!(config.default_quality, DEFAULT_BATCH_QUALITY);
        assert_eq!(config.default_spec().quality, 100);
        assert_eq!(config.item_delay, Duration::from_millis(100));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_config_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("S3_BUCKET_NAME", "media"),
            ("S3_DIRECTORY_PREFIX", "photos/"),
            ("AWS_REGION", "eu-west-1"),
            ("RESIZE_WIDTH", "640"),
            ("RESIZE_QUALITY", "75"),
            ("ITEM_DELAY_MS", "0"),
            ("DRY_RUN", "true"),
        ]))
        .unwrap();

        assert_eq!(config.prefix, "photos/");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.default_spec(), ResizeSpec::new().with_width(640).with_quality(75));
        assert_eq!(config.item_delay, Duration::ZERO);
        assert!(config.dry_run);
    }

    #[test]
    fn test_config_rejects_missing_bucket_and_bad_numbers() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("S3_BUCKET_NAME", "media"),
                ("RESIZE_WIDTH", "wide")
            ])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("S3_BUCKET_NAME", "media"),
                ("RESIZE_QUALITY", "150")
            ])),
            Err(Error::Config(_))
        ));
    }
}

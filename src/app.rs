//! Batch orchestration: back up, transcode and overwrite every image under a prefix.

use crate::image::mime::content_type_for_key;
use crate::image::{ImageTranscoder, Transcoder};
use crate::models::{
    backup_key, is_backup_key, normalize_prefix, BatchRun, Config, ResizeSpec, TranscodeResult,
};
use crate::store::{ObjectMetadata, ObjectStore, S3Store};
use crate::{Error, Result};
use std::fmt;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::{error, info, warn};

const FETCH_RETRY_INTERVAL_MS: u64 = 500;

/// The state an item was moving into. Items advance
/// `Fetched → BackedUp → Transcoded → Stored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
    Fetched,
    BackedUp,
    Transcoded,
    Stored,
}

impl ItemStage {
    fn action(self) -> &'static str {
        match self {
            Self::Fetched => "fetch",
            Self::BackedUp => "backup",
            Self::Transcoded => "transcode",
            Self::Stored => "store",
        }
    }
}

/// Terminal `Done` state of one item.
#[derive(Debug)]
pub struct ItemReport {
    pub key: String,
    pub backup_key: String,
    pub result: TranscodeResult,
}

/// Terminal `Failed` state of one item: the key, the stage that failed and why.
#[derive(Debug)]
pub struct ItemFailure {
    pub key: String,
    pub stage: ItemStage,
    pub error: Error,
}

impl ItemFailure {
    fn new(key: &str, stage: ItemStage, error: Error) -> Self {
        Self {
            key: key.to_string(),
            stage,
            error,
        }
    }

    pub fn reason(&self) -> String {
        format!("{} failed: {}", self.stage.action(), self.error)
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason())
    }
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{} {}, size reduction {:.2}%, original at {})",
            self.key,
            self.result.width,
            self.result.height,
            self.result.resolved_format,
            self.result.compression_ratio_percent,
            self.backup_key
        )
    }
}

pub type ItemOutcome = std::result::Result<ItemReport, ItemFailure>;

/// Coordinates the object store and the transcoder for one bucket.
pub struct App {
    store: Box<dyn ObjectStore>,
    transcoder: Box<dyn Transcoder>,
    prefix: String,
    default_spec: ResizeSpec,
    item_delay: Duration,
    fetch_retries: usize,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub store: Box<dyn ObjectStore>,
    pub transcoder: Box<dyn Transcoder>,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, config: &Config) -> Self {
        Self {
            store: services.store,
            transcoder: services.transcoder,
            prefix: normalize_prefix(&config.prefix),
            default_spec: config.default_spec(),
            item_delay: config.item_delay,
            fetch_retries: config.fetch_retries,
        }
    }

    /// Construct an app backed by S3 and the `image` crate.
    pub async fn new(config: &Config) -> Result<Self> {
        let store = S3Store::new(config).await?;
        info!(
            "Using bucket {} (prefix '{}', region {})",
            config.bucket, config.prefix, config.region
        );

        Ok(Self::with_services(
            AppServices {
                store: Box::new(store),
                transcoder: Box::new(ImageTranscoder::new(config)),
            },
            config,
        ))
    }

    /// Replace the options applied by `run_all` and `run_single`.
    pub fn with_default_spec(mut self, spec: ResizeSpec) -> Self {
        self.default_spec = spec;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Process every image under `prefix`. Item failures are counted, never
    /// returned; only a failed listing aborts the run.
    pub async fn run_all(&self, prefix: &str) -> Result<BatchRun> {
        let prefix = normalize_prefix(prefix);
        let prefix = prefix.as_str();
        info!("Starting image processing under '{}'", prefix);
        let mut run = BatchRun::new();

        let listed = self.store.list(prefix).await?;
        let (archived, candidates): (Vec<_>, Vec<_>) = listed
            .into_iter()
            .partition(|object| is_backup_key(prefix, &object.key));
        if !archived.is_empty() {
            info!("Skipping {} archived originals", archived.len());
        }

        if candidates.is_empty() {
            info!("No images found in the specified directory.");
            return Ok(run);
        }

        info!("Processing {} images...", candidates.len());
        for (index, object) in candidates.iter().enumerate() {
            if index > 0 && !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }

            match self
                .process_item(&object.key, prefix, &self.default_spec)
                .await
            {
                Ok(report) => {
                    info!("Successfully processed: {}", report);
                    run.record_success(report.result.byte_savings());
                }
                Err(failure) => {
                    error!("Error processing {}", failure);
                    run.record_failure(&failure.key, failure.reason());
                }
            }
        }

        log_summary(&run);
        Ok(run)
    }

    /// Process one key with the default options. Failures are returned.
    pub async fn run_single(&self, key: &str) -> Result<BatchRun> {
        info!("Processing single image...");
        let mut run = BatchRun::new();

        match self.process_item(key, &self.prefix, &self.default_spec).await {
            Ok(report) => {
                info!("Successfully processed: {}", report);
                run.record_success(report.result.byte_savings());
                log_summary(&run);
                Ok(run)
            }
            Err(failure) => {
                error!("Error processing {}", failure);
                Err(failure.error)
            }
        }
    }

    /// Process one key with caller-supplied options. Failures are returned.
    pub async fn run_with_options(
        &self,
        key: &str,
        spec: &ResizeSpec,
    ) -> Result<TranscodeResult> {
        info!("Processing with custom options: {}", key);
        spec.validate()?;

        match self.process_item(key, &self.prefix, spec).await {
            Ok(report) => {
                info!("Successfully processed with custom options: {}", report);
                Ok(report.result)
            }
            Err(failure) => {
                error!("Error processing {}", failure);
                Err(failure.error)
            }
        }
    }

    /// Drive one key through fetch, backup, transcode and store.
    ///
    /// The original is archived before anything else is written, and the
    /// original key is only overwritten with a finished transcode.
    pub async fn process_item(&self, key: &str, prefix: &str, spec: &ResizeSpec) -> ItemOutcome {
        info!("Processing: {}", key);

        let (data, metadata) = self
            .fetch(key)
            .await
            .map_err(|e| ItemFailure::new(key, ItemStage::Fetched, e))?;

        let backup_key = backup_key(prefix, key);
        let original_content_type = metadata
            .content_type
            .unwrap_or_else(|| content_type_for_key(key).to_string());
        self.store
            .put(&backup_key, &data, &original_content_type)
            .await
            .map_err(|e| ItemFailure::new(key, ItemStage::BackedUp, e))?;
        info!("Backed up {} to {}", key, backup_key);

        let result = self
            .transcoder
            .transform(&data, spec)
            .await
            .map_err(|e| ItemFailure::new(key, ItemStage::Transcoded, e))?;

        self.store
            .put(key, &result.bytes, result.content_type())
            .await
            .map_err(|e| ItemFailure::new(key, ItemStage::Stored, e))?;

        Ok(ItemReport {
            key: key.to_string(),
            backup_key,
            result,
        })
    }

    async fn fetch(&self, key: &str) -> Result<(Vec<u8>, ObjectMetadata)> {
        let retry_strategy =
            FixedInterval::from_millis(FETCH_RETRY_INTERVAL_MS).take(self.fetch_retries);

        let data = RetryIf::start(
            retry_strategy,
            || async move { self.store.get(key).await },
            |e: &Error| {
                let transient = !matches!(e, Error::NotFound(_) | Error::Access { .. });
                if transient {
                    warn!("Download of {} failed: {}. Will retry...", key, e);
                }
                transient
            },
        )
        .await?;

        let metadata = self.store.head(key).await?;
        info!(
            "Original size: {:.2} MB",
            metadata.content_length as f64 / 1024.0 / 1024.0
        );

        Ok((data, metadata))
    }
}

fn log_summary(run: &BatchRun) {
    info!("==============================");
    info!("PROCESSING SUMMARY");
    info!("==============================");
    info!("Total processed: {}", run.processed_count);
    info!("Errors: {}", run.error_count);
    info!("Total size savings: {:.2} MB", run.savings_mb());
    for failure in &run.failures {
        warn!("Failed: {} ({})", failure.key, failure.reason);
    }
    info!("==============================");
}

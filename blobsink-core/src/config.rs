//! Immutable sink configuration. Validation is a pure function run once at
//! startup, before any I/O, so the driver can refuse to start cleanly.

use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;

use crate::error::{Error, Result};

pub const PROVIDER_AWS_S3: &str = "aws-s3";
pub const PROVIDER_GCS: &str = "google-cloud-storage";
/// In-process store, for local runs and tests.
pub const PROVIDER_MEMORY: &str = "memory";

const FORMAT_TYPES: [&str; 4] = ["avro", "json", "parquet", "bytes"];
const AVRO_CODECS: [&str; 3] = ["null", "deflate", "snappy"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkConfig {
    /// Which blob-store backend to bind: aws-s3 / google-cloud-storage / memory.
    pub provider: String,
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Prepended to every object path; must not start with '/' and must end
    /// with '/', e.g. `a/b/`.
    #[serde(default)]
    pub path_prefix: Option<String>,
    /// avro / json / parquet / bytes.
    pub format_type: String,
    /// partition / time (`default` is accepted as an alias for partition).
    pub partitioner_type: String,
    /// Container codec for the avro format: null / deflate / snappy.
    #[serde(default = "default_avro_codec")]
    pub avro_codec: String,
    /// chrono strftime pattern for the time segment; affects path formatting
    /// only, never the bucket width.
    #[serde(default)]
    pub time_partition_pattern: Option<String>,
    /// Bucket width for the time partitioner, `<n>d` or `<n>h`.
    #[serde(default)]
    pub time_partition_duration: Option<String>,
    /// Whether the partition number is a separate path component
    /// (`topic/partition-N`) instead of a suffix (`topic-partition-N`).
    #[serde(default)]
    pub slice_topic_partition_path: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_time_ms")]
    pub batch_time_ms: u64,
    /// Whether per-record attributes are embedded in the serialized payload.
    #[serde(default)]
    pub with_metadata: bool,
    /// Whether the partition number appears in the object path at all. When
    /// false, records from all partitions of a topic share one path group.
    #[serde(default = "default_with_topic_partition_number")]
    pub with_topic_partition_number: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_avro_codec() -> String {
    "snappy".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_time_ms() -> u64 {
    1000
}

fn default_with_topic_partition_number() -> bool {
    true
}

/// Backoff applied to transient storage errors during a flush.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total attempts per flush, including the first one. Exhaustion is
    /// fatal for the pipeline.
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub factor: f64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_interval_ms: 100,
            max_interval_ms: 10_000,
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<()> {
        let provider = self.provider.to_lowercase();
        if ![PROVIDER_AWS_S3, PROVIDER_GCS, PROVIDER_MEMORY].contains(&provider.as_str()) {
            return Err(Error::Config(format!(
                "unknown provider {:?}, available options: {PROVIDER_AWS_S3} / {PROVIDER_GCS} / {PROVIDER_MEMORY}",
                self.provider
            )));
        }
        if self.bucket.is_empty() {
            return Err(Error::Config("bucket property not set".to_string()));
        }
        if provider == PROVIDER_AWS_S3 && self.region.is_none() && self.endpoint.is_none() {
            return Err(Error::Config(
                "either region or endpoint must be set for aws-s3".to_string(),
            ));
        }

        if !FORMAT_TYPES.contains(&self.format_type.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "unknown formatType {:?}, available options: {}",
                self.format_type,
                FORMAT_TYPES.join(" / ")
            )));
        }
        if self.format_type.eq_ignore_ascii_case("avro")
            && !AVRO_CODECS.contains(&self.avro_codec.to_lowercase().as_str())
        {
            return Err(Error::Config(format!(
                "unknown avroCodec {:?}, available options: {}",
                self.avro_codec,
                AVRO_CODECS.join(" / ")
            )));
        }

        match self.partitioner_type.to_lowercase().as_str() {
            // `default` stays accepted for backward compatibility
            "partition" | "default" => {}
            "time" => {
                if let Some(duration) = &self.time_partition_duration {
                    parse_time_partition_duration(duration)?;
                }
                if let Some(pattern) = &self.time_partition_pattern {
                    validate_time_partition_pattern(pattern)?;
                }
            }
            other => {
                return Err(Error::Config(format!(
                    "unknown partitionerType {other:?}, available options: partition / time"
                )));
            }
        }

        if self.batch_size == 0 {
            return Err(Error::Config(
                "batchSize must be a positive integer".to_string(),
            ));
        }
        if self.batch_time_ms == 0 {
            return Err(Error::Config(
                "batchTimeMs must be a positive integer".to_string(),
            ));
        }

        if let Some(prefix) = &self.path_prefix
            && !prefix.is_empty()
        {
            if prefix.starts_with('/') {
                return Err(Error::Config(format!(
                    "pathPrefix {prefix:?} cannot start with '/', the style is 'xx/xxx/'"
                )));
            }
            if !prefix.ends_with('/') {
                return Err(Error::Config(format!(
                    "pathPrefix {prefix:?} must end with '/', the style is 'xx/xxx/'"
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.maxAttempts must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(Error::Config(
                "retry.jitter must be within [0.0, 1.0]".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses a time-partition bucket width of the form `<digits><d|h>`
/// (case-insensitive), e.g. `2h` or `1d`.
pub(crate) fn parse_time_partition_duration(value: &str) -> Result<Duration> {
    let invalid =
        || Error::Config(format!("timePartitionDuration {value:?} invalid, expected e.g. 1d / 4h"));

    if !value.is_ascii() {
        return Err(invalid());
    }
    let (digits, unit) = value.split_at(value.len().saturating_sub(1));
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let count: u64 = digits.parse().map_err(|_| invalid())?;
    if count == 0 {
        return Err(invalid());
    }
    match unit {
        "d" | "D" => Ok(Duration::from_secs(count * 24 * 60 * 60)),
        "h" | "H" => Ok(Duration::from_secs(count * 60 * 60)),
        _ => Err(invalid()),
    }
}

/// Rejects strftime patterns that chrono cannot format.
pub(crate) fn validate_time_partition_pattern(pattern: &str) -> Result<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(Error::Config(format!(
            "timePartitionPattern {pattern:?} is not a valid strftime pattern"
        )));
    }
    Ok(())
}

//! Serialization boundary. A format turns an ordered batch of records into
//! one object payload and names the path suffix for that encoding. Formats
//! are pure: the commit protocol may serialize the same batch again after a
//! crash and expects no side effects.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::SinkConfig;
use crate::error::{Error, Result};
use crate::message::Record;

mod avro;
mod bytes_format;
mod json;
mod parquet_format;

pub(crate) use self::avro::AvroFormat;
pub(crate) use self::bytes_format::BytesFormat;
pub(crate) use self::json::JsonFormat;
pub(crate) use self::parquet_format::ParquetFormat;

pub trait Format: Send + Sync {
    /// Serializes the records, preserving their order.
    fn serialize(&self, records: &[Record]) -> Result<Bytes>;
    /// Path suffix identifying this encoding, without the dot.
    fn suffix(&self) -> &'static str;
}

/// Format lookup by configuration string. Built once at startup and handed to
/// the components that need it; there is no global registry.
pub struct FormatRegistry {
    formats: HashMap<&'static str, Arc<dyn Format>>,
}

impl FormatRegistry {
    /// Registry holding the built-in formats, configured from the sink config.
    pub fn builtins(config: &SinkConfig) -> Result<Self> {
        let mut registry = Self {
            formats: HashMap::new(),
        };
        registry.register("bytes", Arc::new(BytesFormat));
        registry.register("json", Arc::new(JsonFormat::new(config.with_metadata)));
        registry.register(
            "avro",
            Arc::new(AvroFormat::new(config.with_metadata, &config.avro_codec)?),
        );
        registry.register("parquet", Arc::new(ParquetFormat::new(config.with_metadata)));
        Ok(registry)
    }

    pub fn register(&mut self, name: &'static str, format: Arc<dyn Format>) {
        self.formats.insert(name, format);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Format>> {
        self.formats
            .get(name.to_lowercase().as_str())
            .map(Arc::clone)
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown formatType {name:?}, available options: avro / json / parquet / bytes"
                ))
            })
    }
}

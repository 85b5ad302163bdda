//! Self-describing object-container format: the schema travels in the file
//! header, so every object is readable on its own.

use std::collections::HashMap;

use apache_avro::types::Value;
use apache_avro::{Codec, Schema, Writer};
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::format::Format;
use crate::message::Record;

const SCHEMA_JSON: &str = r#"
{
    "type": "record",
    "name": "SinkRecord",
    "fields": [
        {"name": "payload", "type": "bytes"}
    ]
}"#;

const SCHEMA_WITH_METADATA_JSON: &str = r#"
{
    "type": "record",
    "name": "SinkRecord",
    "fields": [
        {"name": "payload", "type": "bytes"},
        {"name": "topic", "type": "string"},
        {"name": "partition", "type": "int"},
        {"name": "sequenceId", "type": "long"},
        {"name": "publishTime", "type": {"type": "long", "logicalType": "timestamp-millis"}},
        {"name": "properties", "type": {"type": "map", "values": "string"}}
    ]
}"#;

pub(crate) struct AvroFormat {
    schema: Schema,
    codec: Codec,
    with_metadata: bool,
}

impl AvroFormat {
    pub(crate) fn new(with_metadata: bool, codec: &str) -> Result<Self> {
        let schema_json = if with_metadata {
            SCHEMA_WITH_METADATA_JSON
        } else {
            SCHEMA_JSON
        };
        let schema = Schema::parse_str(schema_json)
            .map_err(|e| Error::Encoding(format!("parsing avro schema - {e}")))?;
        Ok(Self {
            schema,
            codec: parse_codec(codec)?,
            with_metadata,
        })
    }

    fn to_value(&self, record: &Record) -> Value {
        let mut fields = vec![("payload".to_string(), Value::Bytes(record.payload.to_vec()))];
        if self.with_metadata {
            let properties: HashMap<String, Value> = record
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            fields.extend([
                (
                    "topic".to_string(),
                    Value::String(record.partition.topic.to_string()),
                ),
                (
                    "partition".to_string(),
                    Value::Int(i32::from(record.partition.partition)),
                ),
                ("sequenceId".to_string(), Value::Long(record.sequence_id)),
                (
                    "publishTime".to_string(),
                    Value::TimestampMillis(record.publish_time.timestamp_millis()),
                ),
                ("properties".to_string(), Value::Map(properties)),
            ]);
        }
        Value::Record(fields)
    }
}

fn parse_codec(name: &str) -> Result<Codec> {
    match name.to_lowercase().as_str() {
        "null" => Ok(Codec::Null),
        "deflate" => Ok(Codec::Deflate),
        "snappy" => Ok(Codec::Snappy),
        other => Err(Error::Config(format!(
            "unknown avroCodec {other:?}, available options: null / deflate / snappy"
        ))),
    }
}

impl Format for AvroFormat {
    fn serialize(&self, records: &[Record]) -> Result<Bytes> {
        let mut writer = Writer::with_codec(&self.schema, Vec::new(), self.codec);
        for record in records {
            writer
                .append(self.to_value(record))
                .map_err(|e| Error::Encoding(format!("appending record to avro file - {e}")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Encoding(format!("finishing avro file - {e}")))?;
        Ok(bytes.into())
    }

    fn suffix(&self) -> &'static str {
        "avro"
    }
}

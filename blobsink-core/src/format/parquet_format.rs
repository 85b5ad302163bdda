//! Columnar format: the schema is stated once per file, payloads land in a
//! binary column, metadata in sibling columns.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow_array::{
    ArrayRef, BinaryArray, Int32Array, Int64Array, RecordBatch, StringArray,
    TimestampMillisecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::{Error, Result};
use crate::format::Format;
use crate::message::Record;

pub(crate) struct ParquetFormat {
    schema: Arc<Schema>,
    with_metadata: bool,
}

impl ParquetFormat {
    pub(crate) fn new(with_metadata: bool) -> Self {
        let mut fields = vec![Field::new("payload", DataType::Binary, false)];
        if with_metadata {
            fields.extend([
                Field::new("topic", DataType::Utf8, false),
                Field::new("partition", DataType::Int32, false),
                Field::new("sequenceId", DataType::Int64, false),
                Field::new(
                    "publishTime",
                    DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                    false,
                ),
                Field::new("properties", DataType::Utf8, false),
            ]);
        }
        Self {
            schema: Arc::new(Schema::new(fields)),
            with_metadata,
        }
    }

    fn to_columns(&self, records: &[Record]) -> Result<Vec<ArrayRef>> {
        let mut columns: Vec<ArrayRef> = vec![Arc::new(BinaryArray::from_iter_values(
            records.iter().map(|r| r.payload.as_ref()),
        ))];
        if self.with_metadata {
            let properties = records
                .iter()
                .map(|r| {
                    let sorted: BTreeMap<&String, &String> = r.properties.iter().collect();
                    serde_json::to_string(&sorted)
                        .map_err(|e| Error::Encoding(format!("serializing properties - {e}")))
                })
                .collect::<Result<Vec<_>>>()?;
            columns.extend([
                Arc::new(StringArray::from_iter_values(
                    records.iter().map(|r| r.partition.topic.as_ref()),
                )) as ArrayRef,
                Arc::new(Int32Array::from_iter_values(
                    records.iter().map(|r| i32::from(r.partition.partition)),
                )),
                Arc::new(Int64Array::from_iter_values(
                    records.iter().map(|r| r.sequence_id),
                )),
                Arc::new(
                    TimestampMillisecondArray::from_iter_values(
                        records.iter().map(|r| r.publish_time.timestamp_millis()),
                    )
                    .with_timezone("UTC"),
                ),
                Arc::new(StringArray::from_iter_values(properties)),
            ]);
        }
        Ok(columns)
    }
}

impl Format for ParquetFormat {
    fn serialize(&self, records: &[Record]) -> Result<Bytes> {
        let batch = RecordBatch::try_new(Arc::clone(&self.schema), self.to_columns(records)?)
            .map_err(|e| Error::Encoding(format!("building record batch - {e}")))?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, Arc::clone(&self.schema), Some(props))
            .map_err(|e| Error::Encoding(format!("creating parquet writer - {e}")))?;
        writer
            .write(&batch)
            .map_err(|e| Error::Encoding(format!("writing parquet row group - {e}")))?;
        writer
            .close()
            .map_err(|e| Error::Encoding(format!("finishing parquet file - {e}")))?;
        Ok(buf.into())
    }

    fn suffix(&self) -> &'static str {
        "parquet"
    }
}

//! Line-delimited JSON. Each record's payload must itself be valid JSON;
//! `with_metadata` wraps it together with the record attributes.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::format::Format;
use crate::message::Record;

pub(crate) struct JsonFormat {
    with_metadata: bool,
}

impl JsonFormat {
    pub(crate) fn new(with_metadata: bool) -> Self {
        Self { with_metadata }
    }

    fn to_line(&self, record: &Record) -> Result<Value> {
        let value: Value = serde_json::from_slice(&record.payload).map_err(|e| {
            Error::Schema(format!(
                "record {} of {} is not valid JSON - {e}",
                record.sequence_id, record.partition
            ))
        })?;
        if !self.with_metadata {
            return Ok(value);
        }
        // BTreeMap keeps the serialized property order stable
        let properties: BTreeMap<&String, &String> = record.properties.iter().collect();
        Ok(json!({
            "value": value,
            "topic": record.partition.topic.as_ref(),
            "partition": record.partition.partition,
            "sequenceId": record.sequence_id,
            "publishTime": record.publish_time.timestamp_millis(),
            "properties": properties,
        }))
    }
}

impl Format for JsonFormat {
    fn serialize(&self, records: &[Record]) -> Result<Bytes> {
        let mut buf = Vec::new();
        for record in records {
            let line = self.to_line(record)?;
            serde_json::to_writer(&mut buf, &line)
                .map_err(|e| Error::Encoding(format!("serializing record to JSON - {e}")))?;
            buf.push(b'\n');
        }
        Ok(buf.into())
    }

    fn suffix(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::message::SourcePartition;

    #[test]
    fn one_line_per_record() {
        let partition = SourcePartition::new("t", 0);
        let records = vec![
            Record::new(partition.clone(), 1, Utc::now(), r#"{"a":1}"#),
            Record::new(partition.clone(), 2, Utc::now(), r#"{"a":2}"#),
        ];
        let bytes = JsonFormat::new(false).serialize(&records).unwrap();
        assert_eq!(&bytes[..], b"{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn non_json_payload_is_a_schema_error() {
        let records = vec![Record::new(
            SourcePartition::new("t", 0),
            1,
            Utc::now(),
            vec![0xff, 0xfe],
        )];
        assert!(matches!(
            JsonFormat::new(false).serialize(&records),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn metadata_embeds_record_attributes() {
        let time = Utc.with_ymd_and_hms(2024, 5, 14, 8, 0, 0).unwrap();
        let mut record = Record::new(SourcePartition::new("events", 3), 7, time, r#"{"a":1}"#);
        record.properties = Arc::new(HashMap::from([("k".to_string(), "v".to_string())]));

        let bytes = JsonFormat::new(true).serialize(&[record]).unwrap();
        let line: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(line["value"]["a"], 1);
        assert_eq!(line["topic"], "events");
        assert_eq!(line["partition"], 3);
        assert_eq!(line["sequenceId"], 7);
        assert_eq!(line["publishTime"], time.timestamp_millis());
        assert_eq!(line["properties"]["k"], "v");
    }
}

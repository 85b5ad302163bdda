//! Raw passthrough: payloads concatenated in record order.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::format::Format;
use crate::message::Record;

pub(crate) struct BytesFormat;

impl Format for BytesFormat {
    fn serialize(&self, records: &[Record]) -> Result<Bytes> {
        let total: usize = records.iter().map(|r| r.payload.len()).sum();
        let mut buf = BytesMut::with_capacity(total);
        for record in records {
            buf.put_slice(&record.payload);
        }
        Ok(buf.freeze())
    }

    fn suffix(&self) -> &'static str {
        "bytes"
    }
}

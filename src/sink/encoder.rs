use crate::config::types::DestinationDescriptor;
use crate::source::Record;
use bytes::{Bytes, BytesMut};
use std::ops::Range;

/// One outbound message and the record indices it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMessage {
    pub payload: Bytes,
    pub records: Range<usize>,
}

/// Joins consecutive output records into delimiter-separated messages.
#[derive(Debug, Clone)]
pub struct MessageEncoder {
    records_per_message: usize,
    delimiter: Bytes,
}

impl MessageEncoder {
    pub fn new(records_per_message: usize, delimiter: impl Into<Bytes>) -> Self {
        Self {
            records_per_message: records_per_message.max(1),
            delimiter: delimiter.into(),
        }
    }

    pub fn from_descriptor(descriptor: &DestinationDescriptor) -> Self {
        Self::new(
            descriptor.batch_size,
            Bytes::from(descriptor.output_delimiter.clone()),
        )
    }

    pub fn encode(&self, records: &[Record]) -> Vec<EncodedMessage> {
        records
            .chunks(self.records_per_message)
            .enumerate()
            .map(|(i, chunk)| {
                let start = i * self.records_per_message;
                let size = chunk.iter().map(|r| r.payload.len()).sum::<usize>()
                    + self.delimiter.len() * chunk.len().saturating_sub(1);
                let mut payload = BytesMut::with_capacity(size);
                for (j, record) in chunk.iter().enumerate() {
                    if j > 0 {
                        payload.extend_from_slice(&self.delimiter);
                    }
                    payload.extend_from_slice(&record.payload);
                }
                EncodedMessage {
                    payload: payload.freeze(),
                    records: start..start + chunk.len(),
                }
            })
            .collect()
    }
}

/// Record indices covered by the given message indices, in ascending order.
pub fn accepted_records(messages: &[EncodedMessage], accepted_messages: &[usize]) -> Vec<usize> {
    let mut indices: Vec<usize> = accepted_messages
        .iter()
        .filter_map(|&i| messages.get(i))
        .flat_map(|m| m.records.clone())
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

// dataload-core/src/format/recordio.rs

//! MXNet RecordIO framing and the blob parser that emits raw payloads.
//!
//! Every record starts with an 8-byte header: the little-endian magic
//! number followed by a little-endian `u32` whose upper three bits hold the
//! record kind and whose lower 29 bits hold the payload length. Payloads are
//! padded to a multiple of four bytes. A payload may be split over a
//! `begin`, zero or more `middle` and an `end` record; the framing merges
//! the parts into one record.

use std::ops::Range;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::{Instance, RecordParser};
use crate::error::Result;
use crate::schema::{Attribute, Schema};
use crate::source::{Frame, FramingError, Payload, Record, RecordFraming, RecordReader};
use crate::tensor::{DataType, Value};

pub const RECORDIO_MAGIC: u32 = 0xced7_230a;

const HEADER_LEN: usize = 8;
const ALIGNMENT: usize = 4;
const LENGTH_MASK: u32 = (1 << 29) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Complete,
    Begin,
    Middle,
    End,
}

impl Kind {
    fn from_bits(bits: u32) -> Option<Kind> {
        match bits {
            0 => Some(Kind::Complete),
            1 => Some(Kind::Begin),
            2 => Some(Kind::Middle),
            3 => Some(Kind::End),
            _ => None,
        }
    }
}

/// One physical record: its kind, payload range and total size.
struct Part {
    kind: Kind,
    payload: Range<usize>,
    consumed: usize,
}

#[inline]
fn align(n: usize) -> usize {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Decodes the physical record starting at `start`, or `None` if `data`
/// does not hold all of it yet.
fn decode_part(
    data: &[u8],
    start: usize,
    at_eof: bool,
) -> std::result::Result<Option<Part>, FramingError> {
    let rest = &data[start..];
    if rest.len() < HEADER_LEN {
        if at_eof {
            return Err(FramingError::Corrupt(format!(
                "the store ends with a truncated RecordIO header of {} byte(s)",
                rest.len()
            )));
        }
        return Ok(None);
    }

    let magic = read_u32(rest, 0);
    if magic != RECORDIO_MAGIC {
        return Err(FramingError::Corrupt(format!(
            "the header does not start with the RecordIO magic number (found {magic:#010x})"
        )));
    }

    let word = read_u32(rest, 4);
    let kind = Kind::from_bits(word >> 29).ok_or_else(|| {
        FramingError::Corrupt(format!("the RecordIO header has an invalid record kind {}", word >> 29))
    })?;
    let length = (word & LENGTH_MASK) as usize;

    let padded = HEADER_LEN + align(length);
    let consumed = if rest.len() >= padded {
        padded
    } else if at_eof && rest.len() >= HEADER_LEN + length {
        // A final record may omit its padding.
        rest.len()
    } else if at_eof {
        return Err(FramingError::Corrupt(format!(
            "the RecordIO payload has {} byte(s) while the header specifies {length}",
            rest.len() - HEADER_LEN
        )));
    } else {
        return Ok(None);
    };

    let payload_start = start + HEADER_LEN;
    Ok(Some(Part {
        kind,
        payload: payload_start..payload_start + length,
        consumed,
    }))
}

/// RecordIO record boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordIoFraming;

impl RecordFraming for RecordIoFraming {
    fn decode(
        &self,
        data: &[u8],
        _position: u64,
        at_eof: bool,
    ) -> std::result::Result<Frame, FramingError> {
        if data.is_empty() {
            return Ok(Frame::Incomplete);
        }

        let Some(first) = decode_part(data, 0, at_eof)? else {
            return Ok(Frame::Incomplete);
        };
        match first.kind {
            Kind::Complete => {
                return Ok(Frame::Record {
                    payload: Payload::Range(first.payload),
                    consumed: first.consumed,
                })
            }
            Kind::Begin => {}
            Kind::Middle | Kind::End => {
                return Err(FramingError::Corrupt(
                    "a split record does not start with a begin record".to_string(),
                ))
            }
        }

        let mut parts = vec![first.payload];
        let mut pos = first.consumed;
        loop {
            if pos == data.len() && at_eof {
                return Err(FramingError::Corrupt(
                    "the store ends inside a split record".to_string(),
                ));
            }
            let Some(part) = decode_part(data, pos, at_eof)? else {
                return Ok(Frame::Incomplete);
            };
            pos += part.consumed;
            match part.kind {
                Kind::Middle => parts.push(part.payload),
                Kind::End => {
                    parts.push(part.payload);
                    break;
                }
                Kind::Complete | Kind::Begin => {
                    return Err(FramingError::Corrupt(
                        "a split record is not terminated by an end record".to_string(),
                    ))
                }
            }
        }

        let mut merged = BytesMut::with_capacity(parts.iter().map(|r| r.len()).sum());
        for range in parts {
            merged.extend_from_slice(&data[range]);
        }
        Ok(Frame::Record {
            payload: Payload::Owned(merged.freeze()),
            consumed: pos,
        })
    }
}

/// Emits each RecordIO payload as one `bytes` value.
#[derive(Debug)]
pub struct BlobParser {
    schema: Arc<Schema>,
}

impl BlobParser {
    pub fn new(batch_size: usize) -> Result<Self> {
        let schema = Schema::new(vec![Attribute::new("value", DataType::Bytes, vec![batch_size, 1])])?;
        Ok(Self {
            schema: Arc::new(schema),
        })
    }
}

impl RecordParser for BlobParser {
    fn name(&self) -> &'static str {
        "recordio"
    }

    fn framing(&self) -> Arc<dyn RecordFraming> {
        Arc::new(RecordIoFraming)
    }

    fn open_store(&self, _reader: &mut RecordReader) -> Result<()> {
        Ok(())
    }

    fn infer_schema(&self, _record: Option<&Record>) -> Result<Option<Arc<Schema>>> {
        Ok(Some(self.schema.clone()))
    }

    fn schema(&self) -> Option<Arc<Schema>> {
        Some(self.schema.clone())
    }

    fn parse(&self, record: &Record) -> Result<Instance> {
        Ok(Instance {
            store: record.store.clone(),
            index: record.index,
            values: vec![Value::Bytes(record.payload.clone())],
        })
    }
}

/// Encodes `payload` as one complete RecordIO record.
pub fn encode_record(payload: &[u8]) -> Bytes {
    encode_part(0, payload)
}

fn encode_part(kind: u32, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_LEN + align(payload.len()));
    out.extend_from_slice(&RECORDIO_MAGIC.to_le_bytes());
    out.extend_from_slice(&((kind << 29) | payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.resize(HEADER_LEN + align(payload.len()), 0);
    out.freeze()
}

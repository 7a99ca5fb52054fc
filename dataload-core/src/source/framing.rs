// dataload-core/src/source/framing.rs

//! Record boundary detection.

use std::fmt;
use std::ops::Range;

use bytes::Bytes;

/// Where the payload of a decoded record lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A sub-range of the bytes handed to [`RecordFraming::decode`].
    Range(Range<usize>),
    /// A payload assembled by the framing itself (e.g. merged split records).
    Owned(Bytes),
}

/// Result of one decoding step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete record; `consumed` bytes can be dropped from the buffer.
    Record { payload: Payload, consumed: usize },
    /// Bytes that carry no record, such as a comment line.
    Skip { consumed: usize },
    /// More bytes are needed before anything can be decided.
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    Corrupt(String),
    TooLarge { limit: usize },
}

/// Progress made while discarding an oversized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resync {
    /// The record ends after `consumed` bytes.
    Done { consumed: usize },
    /// `consumed` bytes belong to the record and more of it follows.
    Partial { consumed: usize },
}

/// Splits a byte stream into records.
///
/// `data` starts at byte `position` of the store. When `at_eof` is set no
/// more bytes will follow, so a framing must either produce a record, a
/// skip, or report `Incomplete` only for empty input.
pub trait RecordFraming: Send + Sync + fmt::Debug {
    fn decode(&self, data: &[u8], position: u64, at_eof: bool) -> Result<Frame, FramingError>;

    /// Finds the end of a record that failed with [`FramingError::TooLarge`].
    /// `data` starts inside that record. `None` means reading cannot resume
    /// after it.
    fn resync(&self, _data: &[u8], _at_eof: bool) -> Option<Resync> {
        None
    }
}

/// Treats an entire store as a single record.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeStoreFraming;

impl RecordFraming for WholeStoreFraming {
    fn decode(&self, data: &[u8], _position: u64, at_eof: bool) -> Result<Frame, FramingError> {
        if !at_eof || data.is_empty() {
            return Ok(Frame::Incomplete);
        }
        Ok(Frame::Record {
            payload: Payload::Range(0..data.len()),
            consumed: data.len(),
        })
    }
}

/// Newline-delimited records with `\r\n` handling and an optional length
/// limit. Used by the text-line format.
#[derive(Debug, Clone, Default)]
pub struct LineFraming {
    pub max_line_length: Option<usize>,
    pub skip_blank_lines: bool,
}

impl LineFraming {
    fn check(&self, len: usize) -> Result<(), FramingError> {
        match self.max_line_length {
            Some(limit) if len > limit => Err(FramingError::TooLarge { limit }),
            _ => Ok(()),
        }
    }
}

/// Returns `line` without a trailing `\r`.
pub(crate) fn trim_cr(line: Range<usize>, data: &[u8]) -> Range<usize> {
    if line.end > line.start && data[line.end - 1] == b'\r' {
        line.start..line.end - 1
    } else {
        line
    }
}

/// Length of a UTF-8 byte-order mark at the start of a store, if any.
pub(crate) fn bom_len(data: &[u8], position: u64) -> usize {
    if position == 0 && data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        3
    } else {
        0
    }
}

impl RecordFraming for LineFraming {
    fn decode(&self, data: &[u8], position: u64, at_eof: bool) -> Result<Frame, FramingError> {
        let bom = bom_len(data, position);
        if bom > 0 {
            return Ok(Frame::Skip { consumed: bom });
        }
        if data.is_empty() {
            return Ok(Frame::Incomplete);
        }

        let (line, consumed) = match data.iter().position(|&b| b == b'\n') {
            Some(end) => (trim_cr(0..end, data), end + 1),
            None if at_eof => (trim_cr(0..data.len(), data), data.len()),
            None => {
                // Fail early instead of buffering an unbounded line.
                self.check(data.len().saturating_sub(1))?;
                return Ok(Frame::Incomplete);
            }
        };

        self.check(line.len())?;
        if self.skip_blank_lines && line.is_empty() {
            return Ok(Frame::Skip { consumed });
        }
        Ok(Frame::Record {
            payload: Payload::Range(line),
            consumed,
        })
    }

    fn resync(&self, data: &[u8], at_eof: bool) -> Option<Resync> {
        Some(match data.iter().position(|&b| b == b'\n') {
            Some(end) => Resync::Done { consumed: end + 1 },
            None if at_eof => Resync::Done { consumed: data.len() },
            None => Resync::Partial { consumed: data.len() },
        })
    }
}

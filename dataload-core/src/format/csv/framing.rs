// dataload-core/src/format/csv/framing.rs

use crate::source::{
    bom_len, trim_cr, Frame, FramingError, LineFraming, Payload, RecordFraming, Resync,
};

/// Line framing for delimited text with comment lines and, optionally,
/// newlines inside quoted fields.
#[derive(Debug, Clone)]
pub struct CsvFraming {
    pub line: LineFraming,
    pub delimiter: u8,
    pub quote_char: u8,
    pub comment_char: Option<u8>,
    pub allow_quoted_new_lines: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    NewField,
    InField,
    InQuoted,
    QuoteInQuoted,
}

impl CsvFraming {
    /// Position of the first newline outside a quoted field.
    fn quoted_line_end(&self, data: &[u8]) -> Option<usize> {
        let mut state = Scan::NewField;
        for (i, &b) in data.iter().enumerate() {
            state = match state {
                Scan::InQuoted if b == self.quote_char => Scan::QuoteInQuoted,
                Scan::InQuoted => Scan::InQuoted,
                _ if b == b'\n' => return Some(i),
                _ if b == self.delimiter => Scan::NewField,
                Scan::NewField if b == self.quote_char => Scan::InQuoted,
                Scan::QuoteInQuoted if b == self.quote_char => Scan::InQuoted,
                _ => Scan::InField,
            };
        }
        None
    }

    fn check(&self, len: usize) -> Result<(), FramingError> {
        match self.line.max_line_length {
            Some(limit) if len > limit => Err(FramingError::TooLarge { limit }),
            _ => Ok(()),
        }
    }
}

impl RecordFraming for CsvFraming {
    fn decode(&self, data: &[u8], position: u64, at_eof: bool) -> Result<Frame, FramingError> {
        let bom = bom_len(data, position);
        if bom > 0 {
            return Ok(Frame::Skip { consumed: bom });
        }
        if data.is_empty() {
            return Ok(Frame::Incomplete);
        }

        if self.comment_char.is_some_and(|c| data[0] == c) {
            return Ok(match data.iter().position(|&b| b == b'\n') {
                Some(end) => Frame::Skip { consumed: end + 1 },
                None if at_eof => Frame::Skip { consumed: data.len() },
                None => Frame::Incomplete,
            });
        }

        if !self.allow_quoted_new_lines {
            return self.line.decode(data, position, at_eof);
        }

        let (line, consumed) = match self.quoted_line_end(data) {
            Some(end) => (trim_cr(0..end, data), end + 1),
            None if at_eof => (trim_cr(0..data.len(), data), data.len()),
            None => {
                self.check(data.len().saturating_sub(1))?;
                return Ok(Frame::Incomplete);
            }
        };

        self.check(line.len())?;
        if self.line.skip_blank_lines && line.is_empty() {
            return Ok(Frame::Skip { consumed });
        }
        Ok(Frame::Record {
            payload: Payload::Range(line),
            consumed,
        })
    }

    /// Quote state is lost across discarded chunks, so only plain line
    /// framing can resume after an oversized row.
    fn resync(&self, data: &[u8], at_eof: bool) -> Option<Resync> {
        if self.allow_quoted_new_lines {
            return None;
        }
        self.line.resync(data, at_eof)
    }
}

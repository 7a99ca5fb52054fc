// dataload-core/src/format/csv/tokenizer.rs

//! Splits one delimited-text record into fields.

/// One field of a record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field {
    pub value: String,
    /// Whether characters beyond the field length limit were dropped.
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizeError {
    /// The record ended inside a quoted field.
    UnterminatedQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NewField,
    InField,
    InQuoted,
    QuoteInQuoted,
}

#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    pub delimiter: char,
    pub quote_char: char,
    /// Maximum number of characters kept per field.
    pub max_field_length: Option<usize>,
}

impl Tokenizer {
    /// Tokenizes `text` into `fields`, replacing its previous contents.
    ///
    /// An empty record holds a single empty field. Inside quotes a doubled
    /// quote stands for one quote character; a quote that closes a field
    /// early is followed by ordinary field text.
    pub fn tokenize(&self, text: &str, fields: &mut Vec<Field>) -> Result<(), TokenizeError> {
        fields.clear();

        let mut field = Field::default();
        let mut len = 0usize;
        let mut state = State::NewField;

        for chr in text.chars() {
            state = match (state, chr) {
                (State::NewField | State::InField | State::QuoteInQuoted, c)
                    if c == self.delimiter =>
                {
                    fields.push(std::mem::take(&mut field));
                    len = 0;
                    State::NewField
                }
                (State::NewField, c) if c == self.quote_char => State::InQuoted,
                (State::InQuoted, c) if c == self.quote_char => State::QuoteInQuoted,
                (State::QuoteInQuoted, c) if c == self.quote_char => {
                    self.push(&mut field, &mut len, c);
                    State::InQuoted
                }
                (State::InQuoted, c) => {
                    self.push(&mut field, &mut len, c);
                    State::InQuoted
                }
                (_, c) => {
                    self.push(&mut field, &mut len, c);
                    State::InField
                }
            };
        }

        if state == State::InQuoted {
            return Err(TokenizeError::UnterminatedQuote);
        }
        fields.push(field);
        Ok(())
    }

    #[inline]
    fn push(&self, field: &mut Field, len: &mut usize, chr: char) {
        match self.max_field_length {
            Some(max) if *len == max => field.truncated = true,
            _ => {
                field.value.push(chr);
                *len += 1;
            }
        }
    }
}

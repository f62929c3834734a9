//! Character-level CSV tokenizer
//!
//! The tokenizer is a two-state machine. [`transition`] is a pure function from the
//! current state, the next input character and (where it matters) one character of
//! lookahead to the next state and an [`Action`]. [`Tokenizer`] drives it over a
//! character source and applies the actions to a field buffer and a record.

use std::ops::Index;

use crate::error::{CsvError, Result};

/// A single row of unescaped field texts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<String>,
}

impl Record {
    /// Create a record from already unescaped fields
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Get a field by position
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Number of fields in this record
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a slice of all fields
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Iterate over the fields
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }
}

impl Index<usize> for Record {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.fields[index]
    }
}

impl From<Vec<String>> for Record {
    fn from(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl From<Vec<&str>> for Record {
    fn from(fields: Vec<&str>) -> Self {
        Self {
            fields: fields.into_iter().map(str::to_string).collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Tokenizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Delimiters and line breaks are significant
    Unquoted,
    /// Inside a quoted section, everything but a quote is literal
    Quoted,
}

/// What the driver does with the character it just consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Append the character to the current field
    Append(char),
    /// Consume the lookahead quote and append a single literal quote
    AppendQuote,
    /// Nothing to append (an opening or closing quote)
    Skip,
    /// Close the current field
    EndField,
    /// Close the current field and the record, consuming the lookahead `\n` if set
    EndRecord { consume_lf: bool },
    /// Input is exhausted outside a quoted section
    EndInput,
    /// Input is exhausted inside a quoted section
    Unterminated,
}

/// Whether [`transition`] needs to see the character after `input`
pub fn needs_lookahead(state: State, input: Option<char>) -> bool {
    matches!(
        (state, input),
        (State::Quoted, Some('"')) | (State::Unquoted, Some('\r'))
    )
}

/// Compute the next state and action
///
/// # Arguments
/// - `state` - The current state
/// - `input` - The character just read, or `None` at end of input
/// - `lookahead` - The following character, only consulted when [`needs_lookahead`] is true
///
/// # Returns
/// The next state and the action the driver must apply
pub fn transition(state: State, input: Option<char>, lookahead: Option<char>) -> (State, Action) {
    match (state, input) {
        (State::Unquoted, Some('"')) => (State::Quoted, Action::Skip),
        (State::Unquoted, Some(',')) => (State::Unquoted, Action::EndField),
        (State::Unquoted, Some('\r')) => (
            State::Unquoted,
            Action::EndRecord {
                consume_lf: lookahead == Some('\n'),
            },
        ),
        (State::Unquoted, Some('\n')) => (State::Unquoted, Action::EndRecord { consume_lf: false }),
        (State::Unquoted, None) => (State::Unquoted, Action::EndInput),
        (State::Unquoted, Some(c)) => (State::Unquoted, Action::Append(c)),

        (State::Quoted, Some('"')) if lookahead == Some('"') => (State::Quoted, Action::AppendQuote),
        (State::Quoted, Some('"')) => (State::Unquoted, Action::Skip),
        (State::Quoted, Some(c)) => (State::Quoted, Action::Append(c)),
        (State::Quoted, None) => (State::Quoted, Action::Unterminated),
    }
}

/// Character source over a string slice
pub type StrChars<'a> = std::iter::Map<std::str::Chars<'a>, fn(char) -> Result<char>>;

/// Pull-based tokenizer producing one [`Record`] at a time
///
/// The sequence is lazy and finite and cannot be restarted. After the end of input or an
/// error, every further call returns `None`.
pub struct Tokenizer<I> {
    chars: I,
    peeked: Option<Option<char>>,
    records: usize,
    done: bool,
}

impl<'a> Tokenizer<StrChars<'a>> {
    /// Tokenize an in-memory document
    pub fn from_text(text: &'a str) -> Self {
        Self::new(text.chars().map(Ok as fn(char) -> Result<char>))
    }
}

impl<I> Tokenizer<I>
where
    I: Iterator<Item = Result<char>>,
{
    /// Create a tokenizer over a fallible character source
    pub fn new(chars: I) -> Self {
        Self {
            chars,
            peeked: None,
            records: 0,
            done: false,
        }
    }

    /// Number of records produced so far
    pub fn records_read(&self) -> usize {
        self.records
    }

    fn next_char(&mut self) -> Result<Option<char>> {
        match self.peeked.take() {
            Some(c) => Ok(c),
            None => self.chars.next().transpose(),
        }
    }

    fn peek_char(&mut self) -> Result<Option<char>> {
        if let Some(c) = self.peeked {
            return Ok(c);
        }
        let c = self.chars.next().transpose()?;
        self.peeked = Some(c);
        Ok(c)
    }

    /// Read the next record
    ///
    /// # Errors
    /// - `CsvError::UnterminatedQuotedField` if the input ends inside a quoted section
    /// - Any error produced by the character source
    ///
    /// # Returns
    /// The next record, or `None` once the input is exhausted. A line terminator at the
    /// very end of the input does not produce an extra empty record.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.done {
            return Ok(None);
        }

        let result = self.scan_record();
        if result.is_err() {
            self.done = true;
        }
        result
    }

    fn scan_record(&mut self) -> Result<Option<Record>> {
        let mut fields = Vec::new();
        let mut buffer = String::new();
        let mut state = State::Unquoted;
        let mut consumed = false;

        loop {
            let input = self.next_char()?;
            consumed |= input.is_some();
            let lookahead = if needs_lookahead(state, input) {
                self.peek_char()?
            } else {
                None
            };

            let (next, action) = transition(state, input, lookahead);
            state = next;

            match action {
                Action::Append(c) => buffer.push(c),
                Action::AppendQuote => {
                    self.next_char()?;
                    buffer.push('"');
                }
                Action::Skip => {}
                Action::EndField => fields.push(std::mem::take(&mut buffer)),
                Action::EndRecord { consume_lf } => {
                    if consume_lf {
                        self.next_char()?;
                    }
                    fields.push(buffer);
                    return Ok(Some(self.emit(fields)));
                }
                Action::EndInput => {
                    self.done = true;
                    // end of input only ends the sequence at a record boundary
                    if !consumed {
                        return Ok(None);
                    }
                    fields.push(buffer);
                    return Ok(Some(self.emit(fields)));
                }
                Action::Unterminated => {
                    return Err(CsvError::UnterminatedQuotedField {
                        record: self.records,
                    });
                }
            }
        }
    }

    fn emit(&mut self, fields: Vec<String>) -> Record {
        self.records += 1;
        Record::new(fields)
    }
}

impl<I> Iterator for Tokenizer<I>
where
    I: Iterator<Item = Result<char>>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Read a single record from an in-memory document
pub fn read_record(text: &str) -> Result<Option<Record>> {
    Tokenizer::from_text(text).next_record()
}

/// Read every record of an in-memory document
pub fn records(text: &str) -> Result<Vec<Record>> {
    Tokenizer::from_text(text).collect()
}

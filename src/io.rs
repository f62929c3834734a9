use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use encoding_rs::{DecoderResult, SHIFT_JIS, UTF_8, WINDOWS_1252};
use tracing::{debug, trace};

use crate::bind::{bind, debind, HeaderIndexMap};
use crate::codec::{join_line, CodecRegistry};
use crate::error::{CsvError, Result};
use crate::schema::{Schema, Tabular};
use crate::tokenizer::Tokenizer;

/// Size of the byte chunks read from a source before decoding
const READ_CHUNK: usize = 8 * 1024;

/// UTF-8 byte-order mark
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Output record terminator
const LINE_END: &str = "\r\n";

/// Text encoding of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8, with a byte-order mark on fresh output
    #[default]
    Utf8,
    /// UTF-8 without a byte-order mark
    Utf8NoBom,
    /// Shift-JIS encoding
    ShiftJis,
    /// Windows-1252 (Western European)
    Windows1252,
}

impl Encoding {
    fn codec(self) -> &'static encoding_rs::Encoding {
        match self {
            Encoding::Utf8 | Encoding::Utf8NoBom => UTF_8,
            Encoding::ShiftJis => SHIFT_JIS,
            Encoding::Windows1252 => WINDOWS_1252,
        }
    }

    /// Whether a fresh document in this encoding starts with a byte-order mark
    pub fn writes_bom(self) -> bool {
        self == Encoding::Utf8
    }

    fn encode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            Encoding::Utf8 | Encoding::Utf8NoBom => Ok(text.as_bytes().to_vec()),
            _ => {
                let (encoded, _, unmappable) = self.codec().encode(text);
                if unmappable {
                    return Err(CsvError::EncodingError(format!(
                        "text cannot be represented in {}",
                        self.codec().name()
                    )));
                }
                Ok(encoded.into_owned())
            }
        }
    }
}

/// Options for reading documents
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Text encoding of the source
    pub encoding: Encoding,
    /// Codecs for custom value kinds
    pub codecs: CodecRegistry,
}

impl ReaderOptions {
    /// Read with the given encoding
    pub fn with_encoding(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }
}

/// Options for writing documents
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    /// Text encoding of the destination
    pub encoding: Encoding,
    /// The destination already holds a header, so none is written
    pub append: bool,
    /// Codecs for custom value kinds
    pub codecs: CodecRegistry,
}

impl WriterOptions {
    /// Options for appending records to an existing document
    pub fn appending() -> Self {
        Self {
            append: true,
            ..Self::default()
        }
    }

    /// Write with the given encoding
    pub fn with_encoding(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }
}

/// Characters decoded incrementally from a byte source
///
/// A byte-order mark of the configured encoding at the start is skipped. Malformed
/// input yields `CsvError::EncodingError`.
pub struct DecodedChars<R> {
    source: R,
    decoder: encoding_rs::Decoder,
    encoding: &'static encoding_rs::Encoding,
    bytes: Vec<u8>,
    text: String,
    pos: usize,
    pending: Option<CsvError>,
    finished: bool,
}

impl<R: Read> DecodedChars<R> {
    pub fn new(source: R, encoding: Encoding) -> Self {
        let codec = encoding.codec();
        Self {
            source,
            decoder: codec.new_decoder_with_bom_removal(),
            encoding: codec,
            bytes: vec![0; READ_CHUNK],
            text: String::new(),
            pos: 0,
            pending: None,
            finished: false,
        }
    }

    /// Read and decode the next chunk into `text`
    fn fill(&mut self) -> Result<()> {
        self.text.clear();
        self.pos = 0;

        let read = loop {
            match self.source.read(&mut self.bytes) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        let last = read == 0;

        let mut consumed = 0;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length_without_replacement(read - consumed)
                .ok_or_else(|| CsvError::EncodingError("decode buffer overflow".to_string()))?;
            self.text.reserve(needed);

            let (result, n) = self.decoder.decode_to_string_without_replacement(
                &self.bytes[consumed..read],
                &mut self.text,
                last,
            );
            consumed += n;

            match result {
                DecoderResult::InputEmpty => break,
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(_, _) => {
                    // characters decoded before the bad sequence are still delivered
                    self.pending = Some(CsvError::EncodingError(format!(
                        "malformed {} input",
                        self.encoding.name()
                    )));
                    self.finished = true;
                    return Ok(());
                }
            }
        }

        if last {
            self.finished = true;
        }
        Ok(())
    }
}

impl<R: Read> Iterator for DecodedChars<R> {
    type Item = Result<char>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(c) = self.text[self.pos..].chars().next() {
                self.pos += c.len_utf8();
                return Some(Ok(c));
            }
            if let Some(e) = self.pending.take() {
                return Some(Err(e));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.fill() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

/// Lazily reads typed records from a CSV document
///
/// The first record is taken as the header. Every following record is bound to a `T`
/// on demand; the sequence is consumed exactly once.
pub struct Reader<T, R> {
    tokenizer: Tokenizer<DecodedChars<R>>,
    schema: Arc<Schema>,
    header: HeaderIndexMap,
    codecs: CodecRegistry,
    exhausted: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Tabular, R: Read> Reader<T, R> {
    /// Start reading a document
    ///
    /// # Arguments
    /// - `source` - The byte source, owned by the reader
    /// - `options` - Encoding and custom codecs
    ///
    /// # Errors
    /// - Schema resolution errors for `T`
    /// - Tokenizer or I/O errors while reading the header row
    ///
    /// # Returns
    /// A reader positioned after the header. An empty document gives a reader that yields nothing
    pub fn new(source: R, options: ReaderOptions) -> Result<Self> {
        let schema = Schema::of::<T>()?;
        let mut tokenizer = Tokenizer::new(DecodedChars::new(source, options.encoding));

        let (header, exhausted) = match tokenizer.next_record()? {
            Some(record) => (HeaderIndexMap::build(&schema, &record), false),
            None => (HeaderIndexMap::default(), true),
        };

        Ok(Self {
            tokenizer,
            schema,
            header,
            codecs: options.codecs,
            exhausted,
            _marker: PhantomData,
        })
    }

    /// The header of the document
    pub fn header(&self) -> &HeaderIndexMap {
        &self.header
    }

    /// The schema records are bound with
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl<T: Tabular> Reader<T, File> {
    /// Open a CSV file for reading
    pub fn open<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file, options)
    }
}

impl<T: Tabular, R: Read> Iterator for Reader<T, R> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        match self.tokenizer.next_record() {
            Ok(Some(record)) => Some(bind(&self.schema, &self.header, &record, &self.codecs)),
            Ok(None) => {
                self.exhausted = true;
                None
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

/// Writes typed records as an always-quoted CSV document
///
/// The header line is written on construction unless appending. [`Writer::close`]
/// flushes and releases the sink; it runs on drop as well and is safe to repeat.
pub struct Writer<T: Tabular, W: Write> {
    sink: Option<BufWriter<W>>,
    schema: Arc<Schema>,
    options: WriterOptions,
    header_written: bool,
    records: usize,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Tabular, W: Write> Writer<T, W> {
    /// Start writing a document
    ///
    /// # Arguments
    /// - `sink` - The destination, owned by the writer
    /// - `options` - Encoding, append mode and custom codecs
    ///
    /// # Errors
    /// - Schema resolution errors for `T`
    /// - I/O or encoding errors while writing the header
    pub fn new(sink: W, options: WriterOptions) -> Result<Self> {
        let schema = Schema::of::<T>()?;
        let mut writer = Self {
            sink: Some(BufWriter::new(sink)),
            schema,
            header_written: options.append,
            options,
            records: 0,
            _marker: PhantomData,
        };

        if !writer.header_written {
            writer.write_header()?;
        }
        Ok(writer)
    }

    fn write_header(&mut self) -> Result<()> {
        if self.options.encoding.writes_bom() {
            self.sink_mut()?.write_all(UTF8_BOM)?;
        }
        let line = {
            let aliases: Vec<&str> = self.schema.aliases().collect();
            join_line(&aliases)
        };
        self.write_line(line)?;
        self.header_written = true;
        debug!(columns = self.schema.len(), "wrote header");
        Ok(())
    }

    fn sink_mut(&mut self) -> Result<&mut BufWriter<W>> {
        self.sink.as_mut().ok_or(CsvError::WriterClosed)
    }

    fn write_line(&mut self, mut line: String) -> Result<()> {
        line.push_str(LINE_END);
        let bytes = self.options.encoding.encode(&line)?;
        self.sink_mut()?.write_all(&bytes)?;
        Ok(())
    }

    /// Write one record
    ///
    /// # Errors
    /// - `CsvError::WriterClosed` if the writer was closed
    /// - Debind errors for `item`; nothing is written in that case
    pub fn write(&mut self, item: &T) -> Result<()> {
        if self.sink.is_none() {
            return Err(CsvError::WriterClosed);
        }
        let fields = debind(&self.schema, item, &self.options.codecs)?;
        self.write_line(join_line(&fields))?;
        self.records += 1;
        trace!(record = self.records, "wrote record");
        Ok(())
    }

    /// Write every record of `items`, stopping at the first error
    pub fn write_all<'a, I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a T>,
    {
        for item in items {
            self.write(item)?;
        }
        Ok(())
    }

    /// Number of records written so far
    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Flush buffered output to the sink
    pub fn flush(&mut self) -> Result<()> {
        self.sink_mut()?.flush()?;
        Ok(())
    }

    /// Flush and release the sink. Later calls do nothing
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.flush()?;
            debug!(records = self.records, "closed writer");
        }
        Ok(())
    }

    /// Flush and hand back the sink
    pub fn into_inner(mut self) -> Result<W> {
        let sink = self.sink.take().ok_or(CsvError::WriterClosed)?;
        sink.into_inner().map_err(|e| CsvError::IoError(e.into_error()))
    }
}

impl<T: Tabular> Writer<T, File> {
    /// Create (or truncate) a CSV file and write its header
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(
            file,
            WriterOptions {
                append: false,
                ..options
            },
        )
    }

    /// Open a CSV file for appending records after its existing content
    pub fn append<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::new(
            file,
            WriterOptions {
                append: true,
                ..options
            },
        )
    }
}

impl<T: Tabular, W: Write> Drop for Writer<T, W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Read every record of a document from a byte source
pub fn from_reader<T: Tabular, R: Read>(source: R, options: ReaderOptions) -> Result<Vec<T>> {
    Reader::new(source, options)?.collect()
}

/// Read every record of an in-memory document
pub fn from_str<T: Tabular>(text: &str) -> Result<Vec<T>> {
    from_reader(text.as_bytes(), ReaderOptions::default())
}

/// Read every record of a CSV file
///
/// # Arguments
/// - `path` - The path to the CSV file to read
/// - `options` - Encoding and custom codecs
///
/// # Returns
/// All records in document order, or the first error encountered
pub fn from_csv<T: Tabular, P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Vec<T>> {
    Reader::open(path, options)?.collect()
}

/// Write a whole document to a sink
pub fn to_writer<'a, T, W, I>(sink: W, items: I, options: WriterOptions) -> Result<()>
where
    T: Tabular,
    W: Write,
    I: IntoIterator<Item = &'a T>,
{
    let mut writer = Writer::new(sink, options)?;
    writer.write_all(items)?;
    writer.close()
}

/// Write a whole document into a string, without a byte-order mark
pub fn to_string<'a, T, I>(items: I) -> Result<String>
where
    T: Tabular,
    I: IntoIterator<Item = &'a T>,
{
    let mut buffer = Vec::new();
    to_writer(&mut buffer, items, WriterOptions::with_encoding(Encoding::Utf8NoBom))?;
    String::from_utf8(buffer).map_err(|e| CsvError::EncodingError(e.to_string()))
}

/// Write a whole document to a CSV file, replacing its content
///
/// # Arguments
/// - `path` - The path to the CSV file to write
/// - `items` - The records to write; the header is written even when there are none
/// - `options` - Encoding and custom codecs (`append` is ignored)
pub fn to_csv<'a, T, P, I>(path: P, items: I, options: WriterOptions) -> Result<()>
where
    T: Tabular,
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a T>,
{
    let mut writer = Writer::create(path, options)?;
    writer.write_all(items)?;
    writer.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDecl;
    use crate::value::{FromValue, ToValue, Value, ValueKind};

    #[derive(Debug, Default, PartialEq)]
    struct Message {
        id: i64,
        text: String,
    }

    impl Tabular for Message {
        fn declare() -> Vec<FieldDecl> {
            vec![
                FieldDecl::new("A", ValueKind::Integer).alias("Id"),
                FieldDecl::new("B", ValueKind::Text).alias("Message"),
            ]
        }

        fn get(&self, field: &str) -> Option<Value> {
            match field {
                "A" => Some(self.id.to_value()),
                "B" => Some(self.text.to_value()),
                _ => None,
            }
        }

        fn set(&mut self, field: &str, value: Value) -> Result<()> {
            match field {
                "A" => self.id = i64::from_value(value)?,
                "B" => self.text = String::from_value(value)?,
                _ => return Err(CsvError::FieldNotFound(field.to_string())),
            }
            Ok(())
        }
    }

    fn message(id: i64, text: &str) -> Message {
        Message {
            id,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_writer_header_and_bom() {
        let mut buffer = Vec::new();
        to_writer(&mut buffer, &[message(1, "hello")], WriterOptions::default()).unwrap();
        let expected = "\u{FEFF}\"Id\",\"Message\"\r\n\"1\",\"hello\"\r\n";
        assert_eq!(String::from_utf8(buffer).unwrap(), expected);
    }

    #[test]
    fn test_to_string() {
        let text = to_string(&[message(1, "hi")]).unwrap();
        assert_eq!(text, "\"Id\",\"Message\"\r\n\"1\",\"hi\"\r\n");
    }

    #[test]
    fn test_appending_writer_skips_header_and_bom() {
        let mut writer = Writer::<Message, _>::new(Vec::new(), WriterOptions::appending()).unwrap();
        writer.write(&message(2, "world")).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(bytes, b"\"2\",\"world\"\r\n");
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut writer = Writer::<Message, _>::new(Vec::new(), WriterOptions::default()).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(matches!(writer.write(&message(1, "x")), Err(CsvError::WriterClosed)));
    }

    #[test]
    fn test_reader_alias_order() {
        let text = "\"Message\",\"Id\"\r\n\"hello\",\"1\"\r\n";
        let actual: Vec<Message> = from_str(text).unwrap();
        assert_eq!(actual, vec![message(1, "hello")]);
    }

    #[test]
    fn test_reader_extra_columns() {
        let text = "\"Id\",\"Message\",\"Reserved\"\r\n\"1\",\"hello\",\"\"\r\n";
        let reader = Reader::<Message, _>::new(text.as_bytes(), ReaderOptions::default()).unwrap();
        assert_eq!(reader.header().columns().collect::<Vec<_>>(), vec!["Id", "Message", "Reserved"]);
        let actual: Vec<Message> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(actual, vec![message(1, "hello")]);
    }

    #[test]
    fn test_reader_empty_documents() {
        for text in ["", "\"Id\",\"Message\"", "\"Id\",\"Message\"\r\n"] {
            let actual: Vec<Message> = from_str(text).unwrap();
            assert!(actual.is_empty(), "{text:?}");
        }
    }

    #[test]
    fn test_reader_skips_bom() {
        let text = "\u{FEFF}\"Id\",\"Message\"\r\n\"7\",\"x\"\r\n";
        let actual: Vec<Message> = from_str(text).unwrap();
        assert_eq!(actual, vec![message(7, "x")]);
    }

    #[test]
    fn test_reader_continues_after_bad_record() {
        let text = "Id,Message\r\nx,bad\r\n2,good\r\n";
        let mut reader = Reader::<Message, _>::new(text.as_bytes(), ReaderOptions::default()).unwrap();
        assert!(matches!(reader.next(), Some(Err(CsvError::FormatError { .. }))));
        assert_eq!(reader.next().unwrap().unwrap(), message(2, "good"));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reader_stops_after_unterminated_quote() {
        let text = "Id,Message\r\n1,ok\r\n2,\"open";
        let mut reader = Reader::<Message, _>::new(text.as_bytes(), ReaderOptions::default()).unwrap();
        assert_eq!(reader.next().unwrap().unwrap(), message(1, "ok"));
        assert!(matches!(
            reader.next(),
            Some(Err(CsvError::UnterminatedQuotedField { record: 2 }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_shift_jis_round_trip() {
        let items = [message(1, "こんにちは")];
        let mut buffer = Vec::new();
        to_writer(&mut buffer, &items, WriterOptions::with_encoding(Encoding::ShiftJis)).unwrap();
        assert!(std::str::from_utf8(&buffer).is_err());

        let actual: Vec<Message> =
            from_reader(buffer.as_slice(), ReaderOptions::with_encoding(Encoding::ShiftJis)).unwrap();
        assert_eq!(actual, items);
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let bytes: &[u8] = b"Id,Message\r\n1,\xFF\r\n";
        let mut reader = Reader::<Message, _>::new(bytes, ReaderOptions::default()).unwrap();
        assert_eq!(reader.header().len(), 2);
        assert!(matches!(reader.next(), Some(Err(CsvError::EncodingError(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_decoded_chars_across_chunks() {
        let text = format!("a{}", "é".repeat(READ_CHUNK));
        let decoded: String = DecodedChars::new(text.as_bytes(), Encoding::Utf8)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_unmappable_output() {
        let mut buffer = Vec::new();
        let result = to_writer(&mut buffer, &[message(1, "€ ok, 日本 not")], WriterOptions::with_encoding(Encoding::Windows1252));
        assert!(matches!(result, Err(CsvError::EncodingError(_))));
    }
}

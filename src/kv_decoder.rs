//! Decoder for the item ledger's key/value export.
//!
//! The ledger holds one copy per record, one attribute per line:
//!
//! ```text
//! ex_titnr |379371|
//! ex_exnr |2|
//! ex_avd |hutl|
//! ^
//! ```
//!
//! The key is the text before the first space and the value lies between the
//! first and the last pipe of the line. A value may itself contain pipes, and
//! when a line does not end in a closing pipe the value continues on the next
//! line (the line break is dropped). `^` terminates a record.
//!
//! # Examples
//!
//! ```
//! use catmassage::kv_decoder::KvDecoder;
//! use std::io::Cursor;
//!
//! let mut decoder = KvDecoder::new(Cursor::new("ex_titnr |1|\nex_note |a|b|\n^\n"));
//! let record = decoder.read_record()?.expect("one record");
//! assert_eq!(record.get("ex_titnr"), Some("1"));
//! assert_eq!(record.get("ex_note"), Some("a|b"));
//! assert!(decoder.read_record()?.is_none());
//! # Ok::<(), catmassage::MassageError>(())
//! ```

use crate::error::{MassageError, Result};
use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use tracing::warn;

const RECORD_TERMINATOR: &str = "^";
const VALUE_DELIMITER: char = '|';

/// The ledger key that groups copies into per-title runs.
pub const TITLE_KEY: &str = "ex_titnr";

/// One decoded ledger record: the attributes of a single copy, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRecord {
    /// `(key, value)` pairs in the order they appeared.
    pub entries: Vec<(String, String)>,
}

impl LedgerRecord {
    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The copy's title number, if present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.get(TITLE_KEY)
    }

    /// Iterate over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether no attribute was read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Streaming key/value record decoder.
///
/// The decoder is lazy and finite: each call to
/// [`read_record`](Self::read_record) consumes exactly one record. Over a
/// seekable source it is restartable with [`seek`](Self::seek).
#[derive(Debug)]
pub struct KvDecoder<R: Read> {
    reader: BufReader<R>,
    line: Vec<u8>,
    offset: u64,
    records_read: usize,
}

impl<R: Read> KvDecoder<R> {
    /// Create a decoder over a ledger stream.
    pub fn new(reader: R) -> Self {
        KvDecoder {
            reader: BufReader::new(reader),
            line: Vec::new(),
            offset: 0,
            records_read: 0,
        }
    }

    /// Number of records decoded so far.
    #[must_use]
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Read the next line without its terminator. `None` at end of stream.
    fn next_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line)?;
        if n == 0 {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&self.line);
        if let Cow::Owned(_) = text {
            warn!(offset = self.offset, "ledger line is not valid UTF-8; invalid bytes replaced");
        }
        self.offset += n as u64;
        Ok(Some(text.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Decode the next record.
    ///
    /// Returns `Ok(None)` once no key can be read and nothing is pending. A
    /// pending record without a closing `^` is returned first.
    ///
    /// # Errors
    ///
    /// Returns [`MassageError::LedgerDecode`] when the stream ends inside an
    /// unterminated value, or an I/O error from the source.
    pub fn read_record(&mut self) -> Result<Option<LedgerRecord>> {
        self.decode(None)
    }

    /// Decode the next record of the run for title `key`.
    ///
    /// Decoding stops at the first title line naming another title, before
    /// any later line of that record is read, and `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// As for [`read_record`](Self::read_record).
    pub fn read_record_for(&mut self, key: &str) -> Result<Option<LedgerRecord>> {
        self.decode(Some(key))
    }

    fn decode(&mut self, run: Option<&str>) -> Result<Option<LedgerRecord>> {
        let mut record = LedgerRecord::default();

        while let Some(line) = self.next_line()? {
            if line.is_empty() {
                continue;
            }
            if line == RECORD_TERMINATOR {
                if record.is_empty() {
                    continue;
                }
                self.records_read += 1;
                return Ok(Some(record));
            }

            let (key, rest) = match line.split_once(' ') {
                Some((key, rest)) => (key.to_string(), rest),
                None => (line.clone(), ""),
            };
            let value = match rest.split_once(VALUE_DELIMITER) {
                Some((_, open)) => self.read_value(&key, open)?,
                None => String::new(),
            };
            if let Some(run) = run {
                if key == TITLE_KEY && value != run {
                    return Ok(None);
                }
            }
            record.entries.push((key, value));
        }

        if record.is_empty() {
            return Ok(None);
        }
        self.records_read += 1;
        Ok(Some(record))
    }

    /// Collect the value that starts right after the opening pipe, following
    /// continuation lines until one ends with the closing pipe.
    fn read_value(&mut self, key: &str, open: &str) -> Result<String> {
        if let Some(value) = open.strip_suffix(VALUE_DELIMITER) {
            return Ok(value.to_string());
        }

        let mut value = open.to_string();
        loop {
            let Some(line) = self.next_line()? else {
                return Err(MassageError::LedgerDecode(format!(
                    "unexpected end of stream inside value of {key:?}"
                )));
            };
            if let Some(tail) = line.strip_suffix(VALUE_DELIMITER) {
                value.push_str(tail);
                return Ok(value);
            }
            value.push_str(&line);
        }
    }

    /// Consume consecutive records whose title equals `key`.
    ///
    /// The run ends at the title line of the next title, so nothing past
    /// that line is decoded, or at a record without a title. Callers
    /// reposition with [`seek`](Self::seek) before the next run.
    ///
    /// # Errors
    ///
    /// Propagates decode and I/O errors met inside the run.
    pub fn scan_run(&mut self, key: &str) -> Result<Vec<LedgerRecord>> {
        let mut run = Vec::new();
        while let Some(record) = self.read_record_for(key)? {
            if record.title() != Some(key) {
                break;
            }
            run.push(record);
        }
        Ok(run)
    }
}

impl<R: Read + Seek> KvDecoder<R> {
    /// Reposition the decoder at an absolute byte offset.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the source cannot seek.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    /// Current byte position in the source.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the position cannot be queried.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.reader.stream_position()?)
    }
}

//! Reading MARC records from the line-MARC export format.
//!
//! The catalogue and exemplar databases are dumped one field per line:
//!
//! ```text
//! *000     c
//! *0010379371
//! *019  $bl
//! *24510$aUgress er også mat$bopskrifter og aktuelle surrogater
//! ^
//! ```
//!
//! `*000` carries the (short) leader, tags below `010` are control fields,
//! other tags carry two indicator characters followed by `$`-delimited
//! subfields. A line consisting of `^` terminates the record. Blank lines
//! between records are ignored.
//!
//! # Examples
//!
//! ```
//! use catmassage::LineMarcReader;
//! use std::io::Cursor;
//!
//! let data = "*000     n\n*0011245593\n*24510$aEnglenes hemmeligheter\n^\n";
//! let mut reader = LineMarcReader::new(Cursor::new(data));
//!
//! let record = reader.read_record()?.expect("one record");
//! assert_eq!(record.get_control_field("001"), Some("1245593"));
//! assert_eq!(record.leader.record_status, 'n');
//! assert!(reader.read_record()?.is_none());
//! # Ok::<(), catmassage::MassageError>(())
//! ```

use crate::error::Result;
use crate::formats::FormatReader;
use crate::leader::Leader;
use crate::record::{Field, Record};
use std::io::{BufRead, BufReader, Read};
use tracing::warn;

const LINE_PREFIX: u8 = b'*';
const RECORD_TERMINATOR: u8 = b'^';
const SUBFIELD_DELIMITER: char = '$';

/// Streaming reader for line-MARC records.
#[derive(Debug)]
pub struct LineMarcReader<R: Read> {
    reader: BufReader<R>,
    line: Vec<u8>,
    line_number: usize,
    records_read: usize,
}

impl<R: Read> LineMarcReader<R> {
    /// Create a new line-MARC reader.
    pub fn new(reader: R) -> Self {
        LineMarcReader {
            reader: BufReader::new(reader),
            line: Vec::new(),
            line_number: 0,
            records_read: 0,
        }
    }

    /// Read a single record.
    ///
    /// Returns `Ok(None)` at end of stream. A final record that is not
    /// followed by a `^` line is still returned.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the underlying stream fails.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let mut record = Record::new(Leader::default());
        let mut pending = false;

        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                break;
            }
            self.line_number += 1;

            let text = String::from_utf8_lossy(&self.line);
            let text = text.trim_end_matches(['\n', '\r']);
            let bytes = text.as_bytes();

            match bytes.first() {
                None => {},
                Some(&RECORD_TERMINATOR) => {
                    if pending {
                        self.records_read += 1;
                        return Ok(Some(record));
                    }
                },
                Some(&LINE_PREFIX) if bytes.len() >= 4 => {
                    parse_line(&mut record, &text[1..]);
                    pending = true;
                },
                Some(_) => {
                    warn!(line = self.line_number, "ignoring line without field tag: {text:?}");
                },
            }
        }

        if pending {
            self.records_read += 1;
            return Ok(Some(record));
        }
        Ok(None)
    }
}

impl<R: Read + std::fmt::Debug> FormatReader for LineMarcReader<R> {
    fn read_record(&mut self) -> Result<Option<Record>> {
        LineMarcReader::read_record(self)
    }

    fn records_read(&self) -> Option<usize> {
        Some(self.records_read)
    }
}

/// Add one `TAGcontent` line (without the leading `*`) to the record.
fn parse_line(record: &mut Record, line: &str) {
    let Some((tag, content)) = split_tag(line) else {
        return;
    };

    if tag == "000" {
        record.leader = Leader::from_line_marc(content);
        return;
    }
    if tag.as_str() < "010" {
        record.add_control_field(tag, content.to_string());
        return;
    }

    let mut chars = content.chars();
    let indicator1 = chars.next().unwrap_or(' ');
    let indicator2 = chars.next().unwrap_or(' ');
    let mut field = Field::new(tag, indicator1, indicator2);

    for segment in chars.as_str().split(SUBFIELD_DELIMITER).skip(1) {
        let mut seg = segment.chars();
        if let Some(code) = seg.next() {
            field.add_subfield(code, seg.as_str().to_string());
        }
    }
    record.add_field(field);
}

fn split_tag(line: &str) -> Option<(String, &str)> {
    let tag = line.get(..3)?;
    Some((tag.to_string(), &line[3..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "
*000     d
*0010379371
*24510$aXXX
^
*000     c
*0010379371
*019  $bl
*008920916                a          0 nob
*090  $c641.3$dGra
*100 0$aGrahl-Nielsen, Thora$d1901-$jn.$326452400
^
";

    #[test]
    fn test_reads_records_in_order() {
        let mut reader = LineMarcReader::new(Cursor::new(SAMPLE));

        let first = reader.read_record().unwrap().unwrap();
        assert_eq!(first.leader.record_status, 'd');
        assert_eq!(first.get_field("245").unwrap().get_subfield('a'), Some("XXX"));

        let second = reader.read_record().unwrap().unwrap();
        assert_eq!(second.leader.record_status, 'c');
        assert_eq!(
            second.get_control_field("008"),
            Some("920916                a          0 nob")
        );
        let f100 = second.get_field("100").unwrap();
        assert_eq!(f100.indicator1, ' ');
        assert_eq!(f100.indicator2, '0');
        assert_eq!(
            f100.get_subfield_values('a'),
            vec!["Grahl-Nielsen, Thora"]
        );
        assert_eq!(f100.get_subfield('3'), Some("26452400"));

        assert!(reader.read_record().unwrap().is_none());
        assert_eq!(reader.records_read, 2);
    }

    #[test]
    fn test_subfield_value_may_contain_pipes() {
        let mut reader = LineMarcReader::new(Cursor::new("*0010192529\n*019  $bdi|dr\n^"));
        let record = reader.read_record().unwrap().unwrap();
        assert_eq!(record.get_field("019").unwrap().get_subfield('b'), Some("di|dr"));
    }

    #[test]
    fn test_unterminated_last_record_is_returned() {
        let mut reader = LineMarcReader::new(Cursor::new("*0011\n*0020000003"));
        let record = reader.read_record().unwrap().unwrap();
        assert_eq!(record.get_control_field("002"), Some("0000003"));
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_empty_stream() {
        let mut reader = LineMarcReader::new(Cursor::new("\n\n^\n"));
        assert!(reader.read_record().unwrap().is_none());
    }
}

//! Reading MARC records from ISO 2709 binary streams.
//!
//! [`MarcReader`] reads back what [`crate::MarcWriter`] produces, and lets a
//! catalogue that was already converted to ISO 2709 be massaged directly.
//!
//! # Examples
//!
//! ```
//! use catmassage::MarcReader;
//! use std::io::Cursor;
//!
//! let mut reader = MarcReader::new(Cursor::new(Vec::new()));
//! assert!(reader.read_record()?.is_none());
//! # Ok::<(), catmassage::MassageError>(())
//! ```

use crate::error::{MassageError, Result};
use crate::formats::FormatReader;
use crate::leader::Leader;
use crate::record::{Field, Record};
use std::io::Read;

const FIELD_TERMINATOR: u8 = 0x1E;
const SUBFIELD_DELIMITER: u8 = 0x1F;

/// Reader for ISO 2709 binary MARC format.
#[derive(Debug)]
pub struct MarcReader<R: Read> {
    reader: R,
    records_read: usize,
}

impl<R: Read> MarcReader<R> {
    /// Create a new MARC reader.
    pub fn new(reader: R) -> Self {
        MarcReader {
            reader,
            records_read: 0,
        }
    }

    /// Read a single MARC record.
    ///
    /// Returns `Ok(Some(record))` if a record was read, `Ok(None)` at EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The binary data is malformed or truncated
    /// - An I/O error occurs
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let mut leader_bytes = [0u8; 24];
        match self.reader.read_exact(&mut leader_bytes) {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(MassageError::IoError(e)),
        }

        let leader = Leader::from_bytes(&leader_bytes)?;
        leader.validate_for_reading()?;

        let record_length = leader.record_length as usize;
        let base_address = leader.data_base_address as usize;
        if base_address > record_length {
            return Err(MassageError::InvalidRecord(format!(
                "Base address {base_address} beyond record length {record_length}"
            )));
        }

        let mut record_data = vec![0u8; record_length - 24];
        self.reader.read_exact(&mut record_data).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                MassageError::InvalidRecord(
                    "Unexpected end of file while reading record data".to_string(),
                )
            } else {
                MassageError::IoError(e)
            }
        })?;

        let (directory, data) = record_data.split_at(base_address - 24);
        let mut record = Record::new(leader);

        // Directory entries are 12 bytes: tag(3) + length(4) + start position(5)
        for entry in directory.chunks(12) {
            if entry[0] == FIELD_TERMINATOR {
                break;
            }
            if entry.len() < 12 {
                return Err(MassageError::InvalidRecord(
                    "Incomplete directory entry".to_string(),
                ));
            }

            let tag = String::from_utf8_lossy(&entry[0..3]).to_string();
            let field_length = parse_digits(&entry[3..7])?;
            let start_position = parse_digits(&entry[7..12])?;
            let end_position = start_position + field_length;
            if end_position > data.len() {
                return Err(MassageError::InvalidRecord(format!(
                    "Field {tag} exceeds data area"
                )));
            }
            let field_data = &data[start_position..end_position];

            if tag.as_str() < "010" {
                let value = String::from_utf8_lossy(
                    &field_data[..field_data.len().saturating_sub(1)],
                )
                .to_string();
                record.add_control_field(tag, value);
            } else {
                let field = parse_data_field(field_data, &tag)
                    .map_err(|e| MassageError::InvalidField(format!("Tag {tag}: {e}")))?;
                record.add_field(field);
            }
        }

        self.records_read += 1;
        Ok(Some(record))
    }
}

impl<R: Read + std::fmt::Debug> FormatReader for MarcReader<R> {
    fn read_record(&mut self) -> Result<Option<Record>> {
        MarcReader::read_record(self)
    }

    fn records_read(&self) -> Option<usize> {
        Some(self.records_read)
    }
}

/// Parse a data field from raw bytes
fn parse_data_field(data: &[u8], tag: &str) -> Result<Field> {
    if data.len() < 2 {
        return Err(MassageError::InvalidField(
            "Data field too short (needs indicators)".to_string(),
        ));
    }

    let mut field = Field::new(tag.to_string(), data[0] as char, data[1] as char);
    let body = &data[2..];
    let body = match memchr::memchr(FIELD_TERMINATOR, body) {
        Some(end) => &body[..end],
        None => body,
    };

    if body.is_empty() {
        return Ok(field);
    }
    if body[0] != SUBFIELD_DELIMITER {
        return Err(MassageError::InvalidField(
            "Expected subfield delimiter".to_string(),
        ));
    }

    for chunk in body[1..].split(|&b| b == SUBFIELD_DELIMITER) {
        // The code is a single byte, the value is UTF-8.
        if let Some((&code, value)) = chunk.split_first() {
            field.add_subfield(code as char, String::from_utf8_lossy(value).to_string());
        }
    }

    Ok(field)
}

/// Parse a fixed-width ASCII number from bytes
fn parse_digits(bytes: &[u8]) -> Result<usize> {
    let mut result = 0usize;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return Err(MassageError::InvalidRecord(format!(
                "Invalid numeric field: expected digits, got byte {}",
                byte as char
            )));
        }
        result = result * 10 + usize::from(byte - b'0');
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MarcWriter;
    use std::io::Cursor;

    #[test]
    fn test_reads_back_written_record() {
        let mut record = Record::new(Leader::default());
        record.add_control_field_str("001", "0379371");
        let mut field = Field::new("245".to_string(), '1', '0');
        field.add_subfield_str('a', "Ugress er også mat");
        field.add_subfield_str('b', "opskrifter");
        record.add_field(field);

        let mut buffer = Vec::new();
        MarcWriter::new(&mut buffer).write_record(&record).unwrap();

        let mut reader = MarcReader::new(Cursor::new(buffer));
        let parsed = reader.read_record().unwrap().unwrap();
        assert_eq!(parsed.get_control_field("001"), Some("0379371"));
        let f245 = parsed.get_field("245").unwrap();
        assert_eq!(f245.get_subfield('a'), Some("Ugress er også mat"));
        assert_eq!(f245.get_subfield('b'), Some("opskrifter"));
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut reader = MarcReader::new(Cursor::new(b"00100nam  2200037   4500".to_vec()));
        assert!(reader.read_record().is_err());
    }

    #[test]
    fn test_parse_data_field_requires_delimiter() {
        assert!(parse_data_field(b"  abc\x1e", "245").is_err());
        let field = parse_data_field(b"10\x1faTitle\x1fcAuthor\x1e", "245").unwrap();
        assert_eq!(field.get_subfield('c'), Some("Author"));
    }
}

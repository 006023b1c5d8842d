//! Writing MARC records to ISO 2709 binary format.
//!
//! This is the format of the enriched catalogue (`catalogue.mrc`) that is
//! loaded into the target library system together with its 952 item fields.
//!
//! # Examples
//!
//! ```
//! use catmassage::{Field, Leader, MarcWriter, Record};
//!
//! let mut record = Record::new(Leader::default());
//! let mut field = Field::new("245".to_string(), '1', '0');
//! field.add_subfield_str('a', "Fjeldskyggen");
//! record.add_field(field);
//!
//! let mut buffer = Vec::new();
//! let mut writer = MarcWriter::new(&mut buffer);
//! writer.write_record(&record)?;
//! writer.finish()?;
//! assert_eq!(buffer.last(), Some(&0x1D));
//! # Ok::<(), catmassage::MassageError>(())
//! ```

use crate::error::{MassageError, Result};
use crate::formats::FormatWriter;
use crate::record::Record;
use std::io::Write;

const FIELD_TERMINATOR: u8 = 0x1E;
const SUBFIELD_DELIMITER: u8 = 0x1F;
const RECORD_TERMINATOR: u8 = 0x1D;

/// Largest record a five-digit leader length can describe.
pub const MAX_RECORD_LENGTH: usize = 99_999;

/// Writer for ISO 2709 binary MARC format.
#[derive(Debug)]
pub struct MarcWriter<W: Write> {
    writer: W,
    records_written: usize,
    finished: bool,
}

impl<W: Write> MarcWriter<W> {
    /// Create a new MARC writer.
    pub fn new(writer: W) -> Self {
        MarcWriter {
            writer,
            records_written: 0,
            finished: false,
        }
    }

    /// Write a single MARC record.
    ///
    /// The leader's record length and base address are recomputed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The writer was already finished
    /// - The record does not fit ISO 2709 limits
    /// - An I/O error occurs during writing
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let encoded = encode_record(record)?;
        self.write_encoded(&encoded)
    }

    /// Write a record already produced by [`encode_record`].
    ///
    /// # Errors
    ///
    /// Returns an error if the writer was finished or the write fails.
    pub fn write_encoded(&mut self, encoded: &[u8]) -> Result<()> {
        if self.finished {
            return Err(MassageError::InvalidRecord(
                "Cannot write to a finished writer".to_string(),
            ));
        }
        self.writer.write_all(encoded)?;
        self.records_written += 1;
        Ok(())
    }

    /// Flush the writer and mark it as finished.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing the underlying writer fails.
    pub fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Returns the number of records written so far.
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records_written
    }
}

/// Encode one record as ISO 2709 bytes, leader to record terminator.
///
/// # Errors
///
/// Returns [`MassageError::RecordTooLong`] when the record exceeds the
/// 99,999 bytes a five-digit record length can express, or an
/// [`MassageError::InvalidRecord`] / [`MassageError::InvalidLeader`] for
/// values the format cannot hold.
pub fn encode_record(record: &Record) -> Result<Vec<u8>> {
    let mut data_area = Vec::new();
    let mut directory = Vec::new();

    for (tag, value) in &record.control_fields {
        let start = data_area.len();
        data_area.extend_from_slice(value.as_bytes());
        data_area.push(FIELD_TERMINATOR);
        push_directory_entry(&mut directory, tag, data_area.len() - start, start)?;
    }

    for (tag, fields) in &record.fields {
        for field in fields {
            let start = data_area.len();
            push_char(&mut data_area, field.indicator1);
            push_char(&mut data_area, field.indicator2);
            for subfield in &field.subfields {
                data_area.push(SUBFIELD_DELIMITER);
                push_char(&mut data_area, subfield.code);
                data_area.extend_from_slice(subfield.value.as_bytes());
            }
            data_area.push(FIELD_TERMINATOR);
            push_directory_entry(&mut directory, tag, data_area.len() - start, start)?;
        }
    }

    directory.push(FIELD_TERMINATOR);

    let base_address = 24 + directory.len();
    let record_length = base_address + data_area.len() + 1;
    if record_length > MAX_RECORD_LENGTH {
        return Err(MassageError::RecordTooLong(record_length));
    }

    let mut leader = record.leader.clone();
    leader.record_length = u32::try_from(record_length)
        .map_err(|_| MassageError::InvalidRecord("Record length overflow".to_string()))?;
    leader.data_base_address = u32::try_from(base_address)
        .map_err(|_| MassageError::InvalidRecord("Base address overflow".to_string()))?;

    let mut encoded = leader.as_bytes()?;
    encoded.reserve(record_length - encoded.len());
    encoded.extend_from_slice(&directory);
    encoded.extend_from_slice(&data_area);
    encoded.push(RECORD_TERMINATOR);
    Ok(encoded)
}

impl<W: Write + std::fmt::Debug> FormatWriter for MarcWriter<W> {
    fn write_record(&mut self, record: &Record) -> Result<()> {
        MarcWriter::write_record(self, record)
    }

    fn finish(&mut self) -> Result<()> {
        MarcWriter::finish(self)
    }

    fn records_written(&self) -> Option<usize> {
        Some(self.records_written)
    }
}

fn push_char(buffer: &mut Vec<u8>, c: char) {
    let mut utf8 = [0u8; 4];
    buffer.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
}

fn push_directory_entry(
    directory: &mut Vec<u8>,
    tag: &str,
    length: usize,
    start: usize,
) -> Result<()> {
    if tag.len() != 3 {
        return Err(MassageError::InvalidField(format!(
            "Tag must be 3 characters: {tag:?}"
        )));
    }
    if length > 9999 {
        return Err(MassageError::InvalidField(format!(
            "Field {tag} is {length} bytes, exceeds ISO 2709 limit"
        )));
    }
    directory.extend_from_slice(tag.as_bytes());
    directory.extend_from_slice(format!("{length:04}").as_bytes());
    directory.extend_from_slice(format!("{start:05}").as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leader::Leader;
    use crate::record::Field;

    #[test]
    fn test_write_simple_record() {
        let mut record = Record::new(Leader::default());
        let mut field = Field::new("245".to_string(), '1', '0');
        field.add_subfield('a', "Test title".to_string());
        record.add_field(field);

        let mut buffer = Vec::new();
        let mut writer = MarcWriter::new(&mut buffer);
        writer.write_record(&record).unwrap();
        assert_eq!(writer.records_written(), 1);

        // 24 (leader) + 13 (directory) + 15 (field data) + 1 (record terminator)
        assert_eq!(buffer.len(), 53);
        assert_eq!(&buffer[0..5], b"00053");
        assert_eq!(&buffer[12..17], b"00037");
        assert_eq!(&buffer[24..36], b"245001500000");
    }

    #[test]
    fn test_write_after_finish_fails() {
        let mut buffer = Vec::new();
        let mut writer = MarcWriter::new(&mut buffer);
        writer.finish().unwrap();
        assert!(writer
            .write_record(&Record::new(Leader::default()))
            .is_err());
    }

    #[test]
    fn test_encode_matches_written_bytes() {
        let mut record = Record::new(Leader::default());
        record.add_control_field_str("001", "0379371");
        let mut buffer = Vec::new();
        MarcWriter::new(&mut buffer).write_record(&record).unwrap();
        assert_eq!(encode_record(&record).unwrap(), buffer);
    }

    #[test]
    fn test_oversized_record_is_rejected_before_writing() {
        let mut record = Record::new(Leader::default());
        for copy in 0..2_000 {
            let mut field = Field::new("952".to_string(), ' ', ' ');
            field.add_subfield('p', format!("0301000000{copy:04}"));
            field.add_subfield('c', "Miljøhylla".to_string());
            field.add_subfield('o', "641.3 Gra".to_string());
            record.add_field(field);
        }

        let err = encode_record(&record).unwrap_err();
        assert!(matches!(err, MassageError::RecordTooLong(n) if n > MAX_RECORD_LENGTH));

        let mut buffer = Vec::new();
        let mut writer = MarcWriter::new(&mut buffer);
        assert!(writer.write_record(&record).is_err());
        assert_eq!(writer.records_written(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_rejects_bad_tag() {
        let mut record = Record::new(Leader::default());
        record.add_field(Field::new("95".to_string(), ' ', ' '));
        let mut buffer = Vec::new();
        assert!(MarcWriter::new(&mut buffer).write_record(&record).is_err());
    }
}

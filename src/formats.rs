//! Format reader and writer traits for MARC records.
//!
//! The catalogue can arrive as line-MARC, ISO 2709 or MARCXML, and the
//! massaged records leave as ISO 2709 and MARCXML. These traits give the
//! orchestrator one streaming interface over all of them.

use crate::error::Result;
use crate::record::Record;

/// Trait for readers that can produce MARC records from a source.
///
/// Implementations return `Ok(None)` when the source is exhausted and must
/// preserve field and subfield order exactly as found in the source.
pub trait FormatReader: std::fmt::Debug {
    /// Read the next record from the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source contains malformed data or I/O fails.
    fn read_record(&mut self) -> Result<Option<Record>>;

    /// Number of records read so far, if tracked.
    fn records_read(&self) -> Option<usize> {
        None
    }
}

/// Trait for writers that serialize MARC records to a destination.
pub trait FormatWriter: std::fmt::Debug {
    /// Write one record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the underlying write fails.
    fn write_record(&mut self, record: &Record) -> Result<()>;

    /// Write any trailer and flush. No records may be written afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailer cannot be written or flushing fails.
    fn finish(&mut self) -> Result<()>;

    /// Number of records written so far, if tracked.
    fn records_written(&self) -> Option<usize> {
        None
    }
}

/// Serialization formats understood by the catalogue reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One field per line, `*TAG` prefix, `$` subfield delimiter, `^` record end.
    LineMarc,
    /// ISO 2709 binary exchange format.
    Iso2709,
    /// MARCXML (`<collection>` of `<record>` elements).
    MarcXml,
}

impl Format {
    /// Guess the format from the first bytes of a stream.
    ///
    /// Leading whitespace is skipped. Returns `None` if nothing recognizable
    /// is found.
    ///
    /// # Examples
    ///
    /// ```
    /// use catmassage::formats::Format;
    ///
    /// assert_eq!(Format::detect(b"\n*0010379371\n"), Some(Format::LineMarc));
    /// assert_eq!(Format::detect(b"00123cam  22"), Some(Format::Iso2709));
    /// assert_eq!(Format::detect(b"<?xml version"), Some(Format::MarcXml));
    /// ```
    #[must_use]
    pub fn detect(sniff: &[u8]) -> Option<Self> {
        let first = sniff.iter().find(|b| !b.is_ascii_whitespace())?;
        match first {
            b'*' => Some(Format::LineMarc),
            b'<' => Some(Format::MarcXml),
            b'0'..=b'9' => Some(Format::Iso2709),
            _ => None,
        }
    }

    /// Parse a user-supplied format name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "line" | "linemarc" | "line-marc" | "vmarc" => Some(Format::LineMarc),
            "iso2709" | "marc" | "mrc" => Some(Format::Iso2709),
            "marcxml" | "xml" => Some(Format::MarcXml),
            _ => None,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Format::LineMarc => "line-MARC",
            Format::Iso2709 => "ISO 2709",
            Format::MarcXml => "MARCXML",
        };
        f.write_str(name)
    }
}

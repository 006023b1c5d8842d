//! MARCXML serialization and deserialization of MARC records.
//!
//! The items-free catalogue and the two ownership subsets are written as one
//! MARCXML `<collection>` each. The collection header and footer are written
//! once by [`MarcxmlWriter`]; every record in between is a bare `<record>`
//! element without its own XML declaration or namespace.
//!
//! `tag`, `ind1`, `ind2` and `code` are XML attributes as in the LOC schema
//! (<https://www.loc.gov/standards/marcxml/>). For reading, both
//! default-namespace and prefixed (`<marc:record>`) documents are accepted.
//!
//! # Examples
//!
//! ```
//! use catmassage::marcxml::{marcxml_to_records, MarcxmlWriter};
//! use catmassage::{Field, Leader, Record};
//!
//! let mut record = Record::new(Leader::default());
//! record.add_control_field_str("001", "0192529");
//! let mut field = Field::new("942".to_string(), ' ', ' ');
//! field.add_subfield_str('y', "LYDBOK");
//! record.add_field(field);
//!
//! let mut buffer = Vec::new();
//! let mut writer = MarcxmlWriter::new(&mut buffer);
//! writer.write_record(&record)?;
//! writer.finish()?;
//!
//! let xml = String::from_utf8(buffer).unwrap();
//! let restored = marcxml_to_records(&xml)?;
//! assert_eq!(restored, vec![record]);
//! # Ok::<(), catmassage::MassageError>(())
//! ```

use crate::error::{MassageError, Result};
use crate::formats::{FormatReader, FormatWriter};
use crate::leader::Leader;
use crate::record::{Field, Record};
use quick_xml::de::from_str as xml_from_str;
use quick_xml::se::to_string as xml_to_string;
use regex::Regex;
use serde::{Deserialize, Serialize};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};
use std::io::{BufReader, Read, Write};

/// The MARCXML namespace URI.
pub const MARCXML_NS: &str = "http://www.loc.gov/MARC21/slim";

/// Written once before the first record of every MARCXML output.
pub const COLLECTION_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<collection xmlns=\"http://www.loc.gov/MARC21/slim\">";

/// Written once after the last record.
pub const COLLECTION_FOOTER: &str = "</collection>";

/// MARCXML record representation for serialization.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "record")]
pub struct MarcxmlRecord {
    /// MARC leader string
    pub leader: String,
    /// Control fields (tags 001-009)
    #[serde(default)]
    pub controlfield: Vec<MarcxmlControlField>,
    /// Data fields (tags 010+)
    #[serde(default)]
    pub datafield: Vec<MarcxmlDataField>,
}

/// MARCXML control field representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct MarcxmlControlField {
    /// Field tag as an XML attribute
    #[serde(rename = "@tag")]
    pub tag: String,
    /// Control field value (text content)
    #[serde(rename = "$value", default)]
    pub value: String,
}

/// MARCXML data field representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct MarcxmlDataField {
    /// Field tag as an XML attribute
    #[serde(rename = "@tag")]
    pub tag: String,
    /// First indicator as an XML attribute
    #[serde(rename = "@ind1")]
    pub ind1: String,
    /// Second indicator as an XML attribute
    #[serde(rename = "@ind2")]
    pub ind2: String,
    /// Subfields
    #[serde(default)]
    pub subfield: Vec<MarcxmlSubfield>,
}

/// MARCXML subfield representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct MarcxmlSubfield {
    /// Subfield code as an XML attribute
    #[serde(rename = "@code")]
    pub code: String,
    /// Subfield value (text content)
    #[serde(rename = "$value", default)]
    pub value: String,
}

/// MARCXML collection wrapper for multiple records.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "collection")]
pub struct MarcxmlCollection {
    /// Records in the collection
    #[serde(default, rename = "record")]
    pub records: Vec<MarcxmlRecord>,
}

/// Strip namespace declarations and element prefixes so the serde structs
/// above match both `<record>` and `<marc:record>` documents.
fn strip_marcxml_ns(xml: &str) -> Result<String> {
    let re_xmlns = Regex::new(r#"\s+xmlns(?::\w+)?="[^"]*""#)
        .map_err(|e| MassageError::ParseError(e.to_string()))?;
    let stripped = re_xmlns.replace_all(xml, "");

    let re_prefix =
        Regex::new(r"<(/?)(\w+):").map_err(|e| MassageError::ParseError(e.to_string()))?;
    Ok(re_prefix.replace_all(&stripped, "<$1").to_string())
}

/// Serialize one record as a bare `<record>` element.
///
/// # Errors
///
/// Returns an error if the leader cannot be encoded or serialization fails.
pub fn record_to_marcxml(record: &Record) -> Result<String> {
    let leader = String::from_utf8_lossy(&record.leader.as_bytes()?).to_string();

    let controlfield = record
        .control_fields_iter()
        .map(|(tag, value)| MarcxmlControlField {
            tag: tag.to_string(),
            value: value.to_string(),
        })
        .collect();

    let datafield = record
        .fields()
        .map(|field| MarcxmlDataField {
            tag: field.tag.clone(),
            ind1: field.indicator1.to_string(),
            ind2: field.indicator2.to_string(),
            subfield: field
                .subfields()
                .map(|sf| MarcxmlSubfield {
                    code: sf.code.to_string(),
                    value: sf.value.clone(),
                })
                .collect(),
        })
        .collect();

    xml_to_string(&MarcxmlRecord {
        leader,
        controlfield,
        datafield,
    })
    .map_err(|e| MassageError::ParseError(format!("Failed to serialize to MARCXML: {e}")))
}

/// Parse a single `<record>` document.
///
/// # Errors
///
/// Returns an error if the XML is invalid or the leader is malformed.
pub fn marcxml_to_record(xml: &str) -> Result<Record> {
    let cleaned = strip_marcxml_ns(xml)?;
    let xml_record: MarcxmlRecord = xml_from_str(&cleaned)
        .map_err(|e| MassageError::ParseError(format!("Failed to parse MARCXML: {e}")))?;
    marcxml_record_to_record(xml_record)
}

/// Parse a `<collection>` document into its records, in document order.
///
/// # Errors
///
/// Returns an error if the XML is invalid or any record is malformed.
pub fn marcxml_to_records(xml: &str) -> Result<Vec<Record>> {
    let cleaned = strip_marcxml_ns(xml)?;
    let collection: MarcxmlCollection = xml_from_str(&cleaned).map_err(|e| {
        MassageError::ParseError(format!("Failed to parse MARCXML collection: {e}"))
    })?;

    collection
        .records
        .into_iter()
        .map(marcxml_record_to_record)
        .collect()
}

fn marcxml_record_to_record(xml_record: MarcxmlRecord) -> Result<Record> {
    let leader = Leader::from_bytes(xml_record.leader.as_bytes())?;
    let mut record = Record::new(leader);

    for cf in xml_record.controlfield {
        record.add_control_field(cf.tag, cf.value);
    }

    for df in xml_record.datafield {
        let ind1 = df.ind1.chars().next().unwrap_or(' ');
        let ind2 = df.ind2.chars().next().unwrap_or(' ');
        let mut field = Field::new(df.tag, ind1, ind2);

        for sf in df.subfield {
            let code = sf
                .code
                .chars()
                .next()
                .ok_or_else(|| MassageError::InvalidField("Missing subfield code".to_string()))?;
            field.add_subfield(code, sf.value);
        }
        record.add_field(field);
    }

    Ok(record)
}

/// Streaming writer for one MARCXML collection.
///
/// The collection header is written before the first record (or by
/// [`finish`](Self::finish) when no record was written), so an empty output
/// is still a well-formed, empty collection.
#[derive(Debug)]
pub struct MarcxmlWriter<W: Write> {
    writer: W,
    records_written: usize,
    started: bool,
    finished: bool,
}

impl<W: Write> MarcxmlWriter<W> {
    /// Create a new MARCXML collection writer.
    pub fn new(writer: W) -> Self {
        MarcxmlWriter {
            writer,
            records_written: 0,
            started: false,
            finished: false,
        }
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.writer.write_all(COLLECTION_HEADER.as_bytes())?;
            self.started = true;
        }
        Ok(())
    }

    /// Append one record to the collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer was finished, serialization fails or
    /// the underlying write fails.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let xml = record_to_marcxml(record)?;
        self.write_encoded(&xml)
    }

    /// Append a `<record>` element already produced by [`record_to_marcxml`].
    ///
    /// # Errors
    ///
    /// Returns an error if the writer was finished or the write fails.
    pub fn write_encoded(&mut self, xml: &str) -> Result<()> {
        if self.finished {
            return Err(MassageError::InvalidRecord(
                "Cannot write to a finished writer".to_string(),
            ));
        }
        self.start()?;
        self.writer.write_all(xml.as_bytes())?;
        self.records_written += 1;
        Ok(())
    }

    /// Close the collection and flush. Calling it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the footer cannot be written or flushing fails.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.start()?;
        self.writer.write_all(COLLECTION_FOOTER.as_bytes())?;
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

impl<W: Write + std::fmt::Debug> FormatWriter for MarcxmlWriter<W> {
    fn write_record(&mut self, record: &Record) -> Result<()> {
        MarcxmlWriter::write_record(self, record)
    }

    fn finish(&mut self) -> Result<()> {
        MarcxmlWriter::finish(self)
    }

    fn records_written(&self) -> Option<usize> {
        Some(self.records_written)
    }
}

/// Streaming reader for a MARCXML collection.
///
/// quick-xml's pull reader walks the document; each `<record>` element is
/// copied out as a fragment and deserialized on its own, so only one record
/// is held in memory at a time.
pub struct MarcxmlReader<R: Read> {
    reader: XmlReader<BufReader<R>>,
    buf: Vec<u8>,
    records_read: usize,
}

impl<R: Read> std::fmt::Debug for MarcxmlReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarcxmlReader")
            .field("position", &self.reader.buffer_position())
            .field("records_read", &self.records_read)
            .finish_non_exhaustive()
    }
}

impl<R: Read> MarcxmlReader<R> {
    /// Create a new MARCXML reader.
    pub fn new(source: R) -> Self {
        MarcxmlReader {
            reader: XmlReader::from_reader(BufReader::new(source)),
            buf: Vec::new(),
            records_read: 0,
        }
    }

    fn xml_error(&self, e: &quick_xml::Error) -> MassageError {
        MassageError::ParseError(format!(
            "Failed to parse MARCXML at byte {}: {e}",
            self.reader.buffer_position()
        ))
    }

    /// Read the next record, or `Ok(None)` after the last one.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or is not MARCXML.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf).map(Event::into_owned);
            let event = event.map_err(|e| self.xml_error(&e))?;
            match event {
                Event::Start(start) if start.local_name().as_ref() == b"record" => {
                    let fragment = self.copy_record(start)?;
                    let record = marcxml_to_record(&fragment)?;
                    self.records_read += 1;
                    return Ok(Some(record));
                },
                Event::Eof => return Ok(None),
                _ => {},
            }
        }
    }

    /// Re-emit the events of one `<record>` element, from its start tag to
    /// the matching end tag.
    fn copy_record(&mut self, start: BytesStart<'static>) -> Result<String> {
        let mut fragment = XmlWriter::new(Vec::new());
        fragment
            .write_event(Event::Start(start))
            .map_err(|e| self.xml_error(&e))?;

        let mut depth = 1usize;
        while depth > 0 {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf).map(Event::into_owned);
            let event = event.map_err(|e| self.xml_error(&e))?;
            match &event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                Event::Eof => {
                    return Err(MassageError::ParseError(
                        "MARCXML ended inside a <record> element".to_string(),
                    ))
                },
                _ => {},
            }
            fragment.write_event(event).map_err(|e| self.xml_error(&e))?;
        }

        String::from_utf8(fragment.into_inner())
            .map_err(|e| MassageError::ParseError(format!("MARCXML record is not UTF-8: {e}")))
    }
}

impl<R: Read + std::fmt::Debug> FormatReader for MarcxmlReader<R> {
    fn read_record(&mut self) -> Result<Option<Record>> {
        MarcxmlReader::read_record(self)
    }

    fn records_read(&self) -> Option<usize> {
        Some(self.records_read)
    }
}

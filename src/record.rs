//! MARC bibliographic record structures and field accessors.
//!
//! This module provides the record types shared by every reader and writer:
//! - [`Record`]: Main bibliographic record structure
//! - [`Field`]: Variable data fields (010+)
//! - [`Subfield`]: Coded data elements within fields
//!
//! Lookups that the massaging rules need ("first value of tag X code Y",
//! "the title number") are free functions over `&Record` so they never carry
//! iteration state.
//!
//! # Examples
//!
//! ```
//! use catmassage::{Field, Leader, Record};
//! use catmassage::record::first_subfield;
//!
//! let record = Record::builder(Leader::default())
//!     .control_field_str("001", "0379371")
//!     .field(
//!         Field::builder("090".to_string(), ' ', ' ')
//!             .subfield_str('c', "641.3")
//!             .build(),
//!     )
//!     .build();
//!
//! assert_eq!(first_subfield(&record, "090", 'c'), "641.3");
//! assert_eq!(first_subfield(&record, "090", 'a'), "");
//! ```

use crate::leader::Leader;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A MARC bibliographic record
///
/// Fields are stored in insertion order using `IndexMap`, grouped by tag in
/// the order each tag was first seen. Removing every field of a tag and adding
/// it back therefore moves that tag to the end of the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Record leader (24 bytes)
    pub leader: Leader,
    /// Control fields (000-009) - tag -> value, preserves insertion order
    pub control_fields: IndexMap<String, String>,
    /// Data fields (010+) - tag -> fields, preserves insertion order
    pub fields: IndexMap<String, Vec<Field>>,
}

/// A data field in a MARC record (fields 010 and higher)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field tag (3 digits)
    pub tag: String,
    /// First indicator
    pub indicator1: char,
    /// Second indicator
    pub indicator2: char,
    /// Subfields (stored in `SmallVec` to avoid allocation for short fields)
    pub subfields: SmallVec<[Subfield; 4]>,
}

/// A subfield within a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subfield {
    /// Subfield code (single character)
    pub code: char,
    /// Subfield value
    pub value: String,
}

/// Structural equality: same leader, same control fields and same data
/// fields, both in the same order.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.leader == other.leader
            && self.control_fields.iter().eq(other.control_fields.iter())
            && self.fields().eq(other.fields())
    }
}

impl Eq for Record {}

impl Record {
    /// Create a new MARC record with the given leader
    #[must_use]
    pub fn new(leader: Leader) -> Self {
        Record {
            leader,
            control_fields: IndexMap::new(),
            fields: IndexMap::new(),
        }
    }

    /// Create a builder for fluently constructing MARC records
    #[must_use]
    pub fn builder(leader: Leader) -> RecordBuilder {
        RecordBuilder {
            record: Record::new(leader),
        }
    }

    /// Add a control field (000-009)
    pub fn add_control_field(&mut self, tag: String, value: String) {
        self.control_fields.insert(tag, value);
    }

    /// Add a control field using string slices
    pub fn add_control_field_str(&mut self, tag: &str, value: &str) {
        self.add_control_field(tag.to_string(), value.to_string());
    }

    /// Get a control field value
    #[must_use]
    pub fn get_control_field(&self, tag: &str) -> Option<&str> {
        self.control_fields
            .get(tag)
            .map(std::string::String::as_str)
    }

    /// Add a data field
    pub fn add_field(&mut self, field: Field) {
        self.fields
            .entry(field.tag.clone())
            .or_default()
            .push(field);
    }

    /// Get all fields with a given tag
    #[must_use]
    pub fn get_fields(&self, tag: &str) -> Option<&[Field]> {
        self.fields.get(tag).map(std::vec::Vec::as_slice)
    }

    /// Get first field with a given tag
    #[must_use]
    pub fn get_field(&self, tag: &str) -> Option<&Field> {
        self.fields.get(tag).and_then(|v| v.first())
    }

    /// Iterate over all fields in tag order
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().flat_map(|v| v.iter())
    }

    /// Iterate over fields matching a specific tag
    pub fn fields_by_tag(&self, tag: &str) -> impl Iterator<Item = &Field> {
        self.fields.get(tag).map(|v| v.iter()).into_iter().flatten()
    }

    /// Iterate over all control fields as (tag, value) tuples.
    pub fn control_fields_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.control_fields
            .iter()
            .map(|(tag, value)| (tag.as_str(), value.as_str()))
    }

    /// Remove all fields with a given tag
    ///
    /// Returns the removed fields.
    pub fn remove_fields_by_tag(&mut self, tag: &str) -> Vec<Field> {
        self.fields.shift_remove(tag).unwrap_or_default()
    }

    /// Remove fields matching a predicate
    ///
    /// Returns the removed fields, in record order.
    pub fn remove_fields_where<F>(&mut self, predicate: F) -> Vec<Field>
    where
        F: Fn(&Field) -> bool,
    {
        let mut removed = Vec::new();
        for fields in self.fields.values_mut() {
            let (taken, kept): (Vec<Field>, Vec<Field>) =
                std::mem::take(fields).into_iter().partition(|f| predicate(f));
            *fields = kept;
            removed.extend(taken);
        }
        // Clean up empty tag entries
        self.fields.retain(|_, v| !v.is_empty());
        removed
    }
}

/// Builder for fluently constructing MARC records
#[derive(Debug)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    /// Add a control field using string slices
    #[must_use]
    pub fn control_field_str(mut self, tag: &str, value: &str) -> Self {
        self.record.add_control_field_str(tag, value);
        self
    }

    /// Add a data field to the record being built
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.record.add_field(field);
        self
    }

    /// Build the record
    #[must_use]
    pub fn build(self) -> Record {
        self.record
    }
}

impl Field {
    /// Create a new data field
    #[must_use]
    pub fn new(tag: String, indicator1: char, indicator2: char) -> Self {
        Field {
            tag,
            indicator1,
            indicator2,
            subfields: SmallVec::new(),
        }
    }

    /// Create a builder for constructing fields fluently
    ///
    /// # Examples
    ///
    /// ```
    /// use catmassage::Field;
    ///
    /// let field = Field::builder("942".to_string(), ' ', ' ')
    ///     .subfield_str('y', "BOK")
    ///     .build();
    /// assert_eq!(field.get_subfield('y'), Some("BOK"));
    /// ```
    #[must_use]
    pub fn builder(tag: String, indicator1: char, indicator2: char) -> FieldBuilder {
        FieldBuilder {
            field: Field::new(tag, indicator1, indicator2),
        }
    }

    /// Add a subfield
    pub fn add_subfield(&mut self, code: char, value: String) {
        self.subfields.push(Subfield { code, value });
    }

    /// Add a subfield using a string slice
    pub fn add_subfield_str(&mut self, code: char, value: &str) {
        self.add_subfield(code, value.to_string());
    }

    /// Get all values for a subfield code
    #[must_use]
    pub fn get_subfield_values(&self, code: char) -> Vec<&str> {
        self.subfields_by_code(code).collect()
    }

    /// Get first value for a subfield code
    #[must_use]
    pub fn get_subfield(&self, code: char) -> Option<&str> {
        self.subfields
            .iter()
            .find(|sf| sf.code == code)
            .map(|sf| sf.value.as_str())
    }

    /// Iterate over all subfields
    pub fn subfields(&self) -> impl Iterator<Item = &Subfield> {
        self.subfields.iter()
    }

    /// Iterate over subfields with a specific code
    pub fn subfields_by_code(&self, code: char) -> impl Iterator<Item = &str> {
        self.subfields
            .iter()
            .filter(move |sf| sf.code == code)
            .map(|sf| sf.value.as_str())
    }

    /// Whether any subfield with `code` has exactly `value`.
    #[must_use]
    pub fn has_subfield_value(&self, code: char, value: &str) -> bool {
        self.subfields_by_code(code).any(|v| v == value)
    }
}

/// Builder for fluently constructing MARC fields
#[derive(Debug)]
pub struct FieldBuilder {
    field: Field,
}

impl FieldBuilder {
    /// Add a subfield to the field being built
    #[must_use]
    pub fn subfield(mut self, code: char, value: String) -> Self {
        self.field.add_subfield(code, value);
        self
    }

    /// Add a subfield using a string slice
    #[must_use]
    pub fn subfield_str(mut self, code: char, value: &str) -> Self {
        self.field.add_subfield_str(code, value);
        self
    }

    /// Build the field
    #[must_use]
    pub fn build(self) -> Field {
        self.field
    }
}

/// First value of subfield `code` in the first `tag` field carrying it, or
/// the empty string.
#[must_use]
pub fn first_subfield<'a>(record: &'a Record, tag: &str, code: char) -> &'a str {
    record
        .fields_by_tag(tag)
        .find_map(|f| f.get_subfield(code))
        .unwrap_or("")
}

/// A title number as used to join the catalogue with the item ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TitleNumber {
    /// Join key: the `001` value without leading zeros.
    pub key: String,
    /// Numeric value, used for barcode generation.
    pub number: u32,
}

/// The raw join key: control field `001` with leading zeros stripped.
///
/// Returns an empty string when the record has no `001`.
#[must_use]
pub fn title_key(record: &Record) -> &str {
    record
        .get_control_field("001")
        .map_or("", |v| v.trim_start_matches('0'))
}

/// Parse the record's title number.
///
/// Returns `None` when the key is empty or not purely numeric; such records
/// cannot be joined with the ledger.
#[must_use]
pub fn title_number(record: &Record) -> Option<TitleNumber> {
    let key = title_key(record);
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number = key.parse::<u32>().ok()?;
    Some(TitleNumber {
        key: key.to_string(),
        number,
    })
}

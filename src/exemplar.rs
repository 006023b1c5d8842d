//! Lookup tables built from the exemplar dump.
//!
//! The exemplar dump is a line-MARC file with one record per copy: `001`
//! title number, `002` copy number, `100 $c` the branch of the current loan
//! and `250 $a` the copy's loan category. It is read completely before the
//! catalogue pass and keyed by the generated barcode.

use crate::classify::{barcode, loan_category_item_type};
use crate::error::Result;
use crate::line_reader::LineMarcReader;
use crate::mappings::BRANCH_SYNONYMS;
use crate::record::{first_subfield, title_number, Record};
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, warn};

/// Barcode-keyed overrides from the exemplar dump.
#[derive(Debug, Clone, Default)]
pub struct ExemplarTables {
    item_types: HashMap<String, &'static str>,
    issuing_branches: HashMap<String, String>,
}

impl ExemplarTables {
    /// Materialize the tables from a line-MARC exemplar dump.
    ///
    /// Records without a numeric title or copy number are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the dump cannot be read.
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        let mut reader = LineMarcReader::new(source);
        let mut tables = ExemplarTables::default();
        let mut skipped = 0usize;

        while let Some(record) = reader.read_record()? {
            if !tables.add(&record) {
                skipped += 1;
            }
        }

        debug!(
            item_types = tables.item_types.len(),
            issuing_branches = tables.issuing_branches.len(),
            skipped,
            "loaded exemplar tables"
        );
        Ok(tables)
    }

    /// Add one exemplar record. Returns `false` if it could not be keyed.
    pub fn add(&mut self, record: &Record) -> bool {
        let Some(title) = title_number(record) else {
            warn!(
                title = record.get_control_field("001").unwrap_or(""),
                "exemplar without numeric title number"
            );
            return false;
        };
        let copy_raw = record.get_control_field("002").unwrap_or("");
        let Ok(copy) = copy_raw.parse::<u32>() else {
            warn!(title = %title.key, copy = copy_raw, "exemplar without numeric copy number");
            return false;
        };
        let code = barcode(title.number, copy);

        if let Some(itype) = loan_category_item_type(first_subfield(record, "250", 'a')) {
            self.item_types.insert(code.clone(), itype);
        }

        let branch = first_subfield(record, "100", 'c');
        if !branch.is_empty() {
            let branch = BRANCH_SYNONYMS.get(branch).copied().unwrap_or(branch);
            self.issuing_branches.insert(code, branch.to_string());
        }
        true
    }

    /// Item type override for a barcode.
    #[must_use]
    pub fn item_type(&self, barcode: &str) -> Option<&'static str> {
        self.item_types.get(barcode).copied()
    }

    /// Branch where the current loan of a barcode was issued.
    #[must_use]
    pub fn issuing_branch(&self, barcode: &str) -> Option<&str> {
        self.issuing_branches.get(barcode).map(String::as_str)
    }

    /// Whether both tables are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_types.is_empty() && self.issuing_branches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const DUMP: &str = "
*0011245593
*0020000001
*100  $a42498$t101613$chvua$fLaanerkategori$lNormal
^
*0011245593
*0020000003
*250  $aDagslån
^
*0011245593
*0020000006
*100  $a42571$t162715$cfboa$fLaanerkategori$lNormal
^
*001abc
*0020000001
*250  $aDagslån
^
";

    #[test]
    fn test_tables_keyed_by_barcode() {
        let tables = ExemplarTables::from_reader(Cursor::new(DUMP)).unwrap();
        assert_eq!(tables.item_type("03011245593003"), Some("DAGSLAAN"));
        assert_eq!(tables.item_type("03011245593001"), None);
        assert_eq!(tables.issuing_branch("03011245593001"), Some("hutl"));
        assert_eq!(tables.issuing_branch("03011245593006"), Some("fbol"));
        assert_eq!(tables.issuing_branch("03011245593003"), None);
    }

    #[test]
    fn test_empty_dump() {
        let tables = ExemplarTables::from_reader(Cursor::new("")).unwrap();
        assert!(tables.is_empty());
    }
}

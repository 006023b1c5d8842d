//! SQL side outputs: active loans and static lookup rows.
//!
//! Loans are emitted as one `INSERT ... SELECT` per copy so the target
//! database resolves borrower and item numbers itself; the whole file is one
//! transaction. Item types and authorized values are static tables written
//! next to the other outputs.

use crate::error::Result;
use crate::mappings::{ITEM_TYPES, STATUS_TABLE};
use std::collections::BTreeSet;
use std::io::Write;

/// An active loan found in the item ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Renewal count.
    pub renewals: i32,
    /// Due date as `YYYY-MM-DD`, if the ledger had one.
    pub due_date: Option<String>,
    /// Barcode of the borrowed copy.
    pub barcode: String,
    /// Borrower reference, matched against the borrower's user id.
    pub borrower: String,
    /// Branch where the loan was issued.
    pub branch: String,
}

/// Quote a value as a single-quoted SQL string literal.
#[must_use]
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Quote a value as a double-quoted SQL string literal.
#[must_use]
pub fn quote_double(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Issue {
    /// Render the loan as one SQL statement, terminated by a newline.
    ///
    /// # Examples
    ///
    /// ```
    /// use catmassage::sql::Issue;
    ///
    /// let issue = Issue {
    ///     renewals: 1,
    ///     due_date: Some("2016-11-03".to_string()),
    ///     barcode: "03010379371002".to_string(),
    ///     borrower: "2".to_string(),
    ///     branch: "hutl".to_string(),
    /// };
    /// let sql = issue.to_sql();
    /// assert!(sql.starts_with("INSERT IGNORE INTO issues"));
    /// assert!(sql.contains("CONCAT('2016-11-03', ' 23:59:00')"));
    /// assert!(sql.contains("items.barcode = '03010379371002'"));
    /// ```
    #[must_use]
    pub fn to_sql(&self) -> String {
        let due = self.due_date.as_deref().map_or_else(
            || "NULL".to_string(),
            |date| format!("CONCAT({}, ' 23:59:00')", quote(date)),
        );
        format!(
            "INSERT IGNORE INTO issues (borrowernumber, renewals, date_due, itemnumber, branchcode)\n\
             SELECT borrowers.borrowernumber,\n       {},\n       {},\n       items.itemnumber,\n       {}\n\
             FROM borrowers\n\
             INNER JOIN items ON items.barcode = {}\n\
             WHERE borrowers.userid = {};\n",
            self.renewals,
            due,
            quote(&self.branch),
            quote(&self.barcode),
            quote(&self.borrower),
        )
    }
}

/// Streaming writer for `issues.sql`.
#[derive(Debug)]
pub struct IssueWriter<W: Write> {
    writer: W,
    issues_written: usize,
    started: bool,
    finished: bool,
}

impl<W: Write> IssueWriter<W> {
    /// Create a new issue writer.
    pub fn new(writer: W) -> Self {
        IssueWriter {
            writer,
            issues_written: 0,
            started: false,
            finished: false,
        }
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.writer.write_all(b"START TRANSACTION;\n")?;
            self.started = true;
        }
        Ok(())
    }

    /// Append one loan.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the underlying writer.
    pub fn write_issue(&mut self, issue: &Issue) -> Result<()> {
        self.start()?;
        self.writer.write_all(issue.to_sql().as_bytes())?;
        self.issues_written += 1;
        Ok(())
    }

    /// Close the transaction and flush. Calling it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the underlying writer.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.start()?;
        self.writer.write_all(b"COMMIT;\n")?;
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Number of loans written.
    #[must_use]
    pub fn issues_written(&self) -> usize {
        self.issues_written
    }
}

/// Write a batch `INSERT IGNORE` with one row per pair.
///
/// Nothing is written for an empty batch.
///
/// # Errors
///
/// Returns an I/O error from the underlying writer.
pub fn write_insert<'a, W, I>(writer: &mut W, table: &str, columns: &[&str], rows: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = Vec<&'a str>>,
{
    let rows: Vec<String> = rows
        .into_iter()
        .map(|row| {
            let values: Vec<String> = row.iter().map(|v| quote_double(v)).collect();
            format!("  ({})", values.join(","))
        })
        .collect();
    if rows.is_empty() {
        return Ok(());
    }
    writeln!(writer, "INSERT IGNORE INTO {table}")?;
    writeln!(writer, "  ({})", columns.join(", "))?;
    writeln!(writer, "VALUES")?;
    writeln!(writer, "{};", rows.join(",\n"))?;
    Ok(())
}

/// Write `itypes.sql`.
///
/// # Errors
///
/// Returns an I/O error from the underlying writer.
pub fn write_item_types<W: Write>(writer: &mut W) -> Result<()> {
    write_insert(
        writer,
        "itemtypes",
        &["itemtype", "description"],
        ITEM_TYPES.iter().map(|(code, description)| vec![*code, *description]),
    )
}

/// Write `avalues.sql`: one authorized value per distinct status flag.
///
/// # Errors
///
/// Returns an I/O error from the underlying writer.
pub fn write_authorised_values<W: Write>(writer: &mut W) -> Result<()> {
    let mut seen = BTreeSet::new();
    let rows = STATUS_TABLE
        .iter()
        .filter(|(_, flag)| seen.insert((flag.family, flag.value)))
        .map(|(_, flag)| vec![flag.family.category(), flag.value, flag.description])
        .collect::<Vec<_>>();
    write_insert(
        writer,
        "authorised_values",
        &["category", "authorised_value", "lib"],
        rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> Issue {
        Issue {
            renewals: 10,
            due_date: None,
            barcode: "03011245593001".to_string(),
            borrower: "O'Brien".to_string(),
            branch: "hutl".to_string(),
        }
    }

    #[test]
    fn test_issue_without_due_date() {
        let sql = issue().to_sql();
        assert!(sql.contains("       10,\n       NULL,\n"));
        assert!(sql.contains("WHERE borrowers.userid = 'O''Brien';"));
        assert!(sql.ends_with(";\n"));
    }

    #[test]
    fn test_issue_writer_transaction() {
        let mut buffer = Vec::new();
        let mut writer = IssueWriter::new(&mut buffer);
        writer.write_issue(&issue()).unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.issues_written(), 1);

        let sql = String::from_utf8(buffer).unwrap();
        assert!(sql.starts_with("START TRANSACTION;\nINSERT IGNORE INTO issues"));
        assert!(sql.ends_with("COMMIT;\n"));
        assert_eq!(sql.matches("COMMIT;").count(), 1);
    }

    #[test]
    fn test_empty_issue_file_is_an_empty_transaction() {
        let mut buffer = Vec::new();
        IssueWriter::new(&mut buffer).finish().unwrap();
        assert_eq!(buffer, b"START TRANSACTION;\nCOMMIT;\n");
    }

    #[test]
    fn test_item_types_sql() {
        let mut buffer = Vec::new();
        write_item_types(&mut buffer).unwrap();
        let sql = String::from_utf8(buffer).unwrap();
        assert!(sql.starts_with("INSERT IGNORE INTO itemtypes\n  (itemtype, description)\nVALUES\n"));
        assert!(sql.contains("  (\"DAGSLAAN\",\"Dagslån\"),\n"));
        assert!(sql.ends_with("  (\"UKJENT\",\"Ukjent\");\n"));
    }

    #[test]
    fn test_authorised_values_are_distinct() {
        let mut buffer = Vec::new();
        write_authorised_values(&mut buffer).unwrap();
        let sql = String::from_utf8(buffer).unwrap();
        assert_eq!(sql.matches("(\"NOT_LOAN\",\"2\"").count(), 1);
        assert_eq!(sql.matches("(\"LOST\",\"4\"").count(), 1);
        assert!(sql.contains("(\"WITHDRAWN\",\"1\",\"Vurderes kassert\")"));
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let mut buffer = Vec::new();
        write_insert(&mut buffer, "branches", &["branchcode"], Vec::<Vec<&str>>::new()).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("a'b"), "'a''b'");
        assert_eq!(quote_double("Hovedbiblioteket, \"barn\""), "\"Hovedbiblioteket, \\\"barn\\\"\"");
    }
}

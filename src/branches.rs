//! Registry of the branch codes seen during a run.
//!
//! The registry is owned by the orchestrator and passed explicitly to the
//! enrichment engine. Entries are write-once: the first label recorded for a
//! code is kept. After the pass it is rendered as `branches.sql` and the
//! unresolved codes are reported on the console.

use crate::classify::Branch;
use crate::error::Result;
use crate::mappings::{BRANCH_LABELS, MISSING_LABEL, UNKNOWN_BRANCH};
use crate::sql::write_insert;
use std::collections::BTreeMap;
use std::io::Write;

/// Branch codes and labels collected from the item ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchRegistry {
    labels: BTreeMap<String, String>,
    misses: BTreeMap<String, usize>,
}

impl BranchRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `code` with `label` unless the code is already present.
    pub fn insert(&mut self, code: &str, label: &str) {
        self.labels
            .entry(code.to_string())
            .or_insert_with(|| label.to_string());
    }

    /// Record the outcome of resolving one copy's branch and return the
    /// branch code to write on the item.
    ///
    /// Excluded and subset branches keep their code and are not registered.
    /// Unresolved codes are counted, registered with a placeholder label and
    /// replaced by the unknown branch, which is registered as well.
    pub fn observe(&mut self, branch: Branch) -> String {
        match branch {
            Branch::Excluded(code) | Branch::Subset(code) => code,
            Branch::Known { code, label } => {
                self.insert(&code, label);
                code
            },
            Branch::Unresolved { observed } => {
                *self.misses.entry(observed.clone()).or_insert(0) += 1;
                if !observed.is_empty() {
                    self.insert(&observed, MISSING_LABEL);
                }
                let unknown_label = BRANCH_LABELS.get(UNKNOWN_BRANCH).copied().unwrap_or(MISSING_LABEL);
                self.insert(UNKNOWN_BRANCH, unknown_label);
                UNKNOWN_BRANCH.to_string()
            },
        }
    }

    /// Label recorded for `code`.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&str> {
        self.labels.get(code).map(String::as_str)
    }

    /// Number of registered codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no code was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Registered `(code, label)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(c, l)| (c.as_str(), l.as_str()))
    }

    /// Unresolved codes with the number of copies that carried them.
    pub fn misses(&self) -> impl Iterator<Item = (&str, usize)> {
        self.misses.iter().map(|(c, n)| (c.as_str(), *n))
    }

    /// Fold another registry into this one. Existing labels win; miss
    /// counts are summed.
    pub fn merge(&mut self, other: BranchRegistry) {
        for (code, label) in other.labels {
            self.labels.entry(code).or_insert(label);
        }
        for (code, count) in other.misses {
            *self.misses.entry(code).or_insert(0) += count;
        }
    }

    /// Write `branches.sql`, one row per registered code.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the underlying writer.
    pub fn write_sql<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_insert(
            writer,
            "branches",
            &["branchcode", "branchname"],
            self.iter().map(|(code, label)| vec![code, label]),
        )
    }

    /// Write the console report of unresolved branch codes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the underlying writer.
    pub fn write_report<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.misses.is_empty() {
            writeln!(writer, "All branch codes resolved.")?;
            return Ok(());
        }
        writeln!(writer, "Branch codes without a label (copies moved to {UNKNOWN_BRANCH:?}):")?;
        for (code, count) in self.misses() {
            let shown = if code.is_empty() { "(empty)" } else { code };
            writeln!(writer, "  {shown:<8} {count:>6}")?;
        }
        Ok(())
    }
}

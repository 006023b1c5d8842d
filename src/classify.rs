//! Classification rules applied to one copy of a title.
//!
//! Each function turns a raw ledger or catalogue value into the normalized
//! value written to the item field. None of them fail: data that cannot be
//! classified is reported through the return value and the caller decides
//! whether to log, substitute or omit.

use crate::error::{MassageError, Result};
use crate::mappings::{
    StatusFlag, BJORNHOLT_BRANCH, BRANCH_LABELS, BRANCH_SYNONYMS, DEFAULT_ITEM_TYPE,
    EXCLUDED_BRANCHES, ITEM_TYPE_RULES, LOAN_CATEGORIES, NYDALEN_BRANCH, SHELVING_LABELS,
    STATUS_FLAGS,
};
use crate::record::{first_subfield, Record};
use regex::Regex;

const BARCODE_PREFIX: &str = "0301";
const NO_DUE_DATE: &str = "00/00/0000";

/// Generate the barcode of a copy: prefix, 7-digit title, 3-digit copy.
///
/// # Examples
///
/// ```
/// use catmassage::classify::barcode;
///
/// assert_eq!(barcode(379_371, 2), "03010379371002");
/// ```
#[must_use]
pub fn barcode(title: u32, copy: u32) -> String {
    format!("{BARCODE_PREFIX}{title:07}{copy:03}")
}

/// Outcome of parsing a ledger due date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueDate {
    /// `00/00/0000`: the copy has no due date.
    NotSet,
    /// ISO `YYYY-MM-DD`.
    Date(String),
    /// Not a `DD/MM/YYYY` value.
    Malformed,
}

/// Parse a `DD/MM/YYYY` due date.
///
/// # Examples
///
/// ```
/// use catmassage::classify::{parse_due_date, DueDate};
///
/// assert_eq!(parse_due_date("03/11/2016"), DueDate::Date("2016-11-03".to_string()));
/// assert_eq!(parse_due_date("00/00/0000"), DueDate::NotSet);
/// assert_eq!(parse_due_date("3/11/2016"), DueDate::Malformed);
/// ```
#[must_use]
pub fn parse_due_date(raw: &str) -> DueDate {
    if raw == NO_DUE_DATE {
        return DueDate::NotSet;
    }
    let bytes = raw.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[2] == b'/'
        && bytes[5] == b'/'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || i == 5 || b.is_ascii_digit());
    if !well_formed {
        return DueDate::Malformed;
    }
    DueDate::Date(format!("{}-{}-{}", &raw[6..10], &raw[3..5], &raw[0..2]))
}

/// Renewal count from the ledger's single-character counter.
///
/// The counter follows the character table past `9`, so `:` is 10.
#[must_use]
pub fn renewals(raw: &str) -> Option<i32> {
    let first = raw.chars().next()?;
    let code = i32::try_from(u32::from(first)).ok()?;
    Some(code - i32::from(b'0'))
}

/// Borrower reference without the export's leading `-`.
#[must_use]
pub fn borrower(raw: &str) -> &str {
    raw.strip_prefix('-').unwrap_or(raw)
}

/// Full call number: `090 $a $b $c $d` joined by single spaces, empty parts
/// skipped.
#[must_use]
pub fn call_number(record: &Record) -> String {
    ['a', 'b', 'c', 'd']
        .iter()
        .map(|&code| first_subfield(record, "090", code))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Status flag for a ledger status code. Codes without a flag (including
/// the on-loan code) return `None`.
#[must_use]
pub fn status_flag(code: &str) -> Option<StatusFlag> {
    STATUS_FLAGS.get(code).copied()
}

/// Shelving label for a shelving code. Empty codes have no label; codes
/// without a mapping are used as their own label.
#[must_use]
pub fn shelving_label(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let label = SHELVING_LABELS
        .iter()
        .find(|(code, _)| *code == raw)
        .map_or(raw, |(_, label)| *label);
    Some(label.to_string())
}

/// Item type override for an exemplar loan category (`250 $a`).
#[must_use]
pub fn loan_category_item_type(category: &str) -> Option<&'static str> {
    LOAN_CATEGORIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(category.trim()))
        .map(|(_, itype)| *itype)
}

/// Where a copy's owning branch ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Branch {
    /// Copies of this branch are discarded.
    Excluded(String),
    /// Copies of this branch belong to an ownership subset.
    Subset(String),
    /// A canonical branch with a label.
    Known {
        /// Canonical branch code.
        code: String,
        /// Display label.
        label: &'static str,
    },
    /// Neither the code nor its synonym has a label.
    Unresolved {
        /// The code as found in the ledger, after synonym lookup.
        observed: String,
    },
}

/// Normalize a ledger branch code through the synonym table and classify it.
///
/// # Examples
///
/// ```
/// use catmassage::classify::{resolve_branch, Branch};
///
/// assert_eq!(
///     resolve_branch("hvua"),
///     Branch::Known { code: "hutl".to_string(), label: "Hovedbiblioteket" }
/// );
/// assert_eq!(resolve_branch("dfb"), Branch::Excluded("dfb".to_string()));
/// assert_eq!(resolve_branch("xyz"), Branch::Unresolved { observed: "xyz".to_string() });
/// ```
#[must_use]
pub fn resolve_branch(raw: &str) -> Branch {
    let code = BRANCH_SYNONYMS.get(raw).copied().unwrap_or(raw);
    if EXCLUDED_BRANCHES.contains(&code) {
        return Branch::Excluded(code.to_string());
    }
    if code == BJORNHOLT_BRANCH || code == NYDALEN_BRANCH {
        return Branch::Subset(code.to_string());
    }
    match BRANCH_LABELS.get(code).copied() {
        Some(label) => Branch::Known {
            code: code.to_string(),
            label,
        },
        None => Branch::Unresolved {
            observed: code.to_string(),
        },
    }
}

/// Compiled, ordered item-type rules over `019 $b` document codes.
#[derive(Debug, Clone)]
pub struct ItemTypeRules {
    rules: Vec<(Regex, &'static str)>,
}

impl ItemTypeRules {
    /// Compile the standard rule list.
    ///
    /// # Errors
    ///
    /// Returns an error if a rule pattern does not compile.
    pub fn new() -> Result<Self> {
        let rules = ITEM_TYPE_RULES
            .iter()
            .map(|(pattern, itype)| {
                Regex::new(pattern)
                    .map(|re| (re, *itype))
                    .map_err(|e| MassageError::ParseError(format!("item type rule {pattern}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ItemTypeRules { rules })
    }

    /// Item type for a pipe-separated list of document codes.
    ///
    /// Rules are tried in order; the first rule that matches any code wins.
    /// Without a match the default item type is returned.
    #[must_use]
    pub fn classify(&self, type_codes: &str) -> &'static str {
        let codes: Vec<&str> = type_codes
            .split('|')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        self.rules
            .iter()
            .find(|(re, _)| codes.iter().any(|code| re.is_match(code)))
            .map_or(DEFAULT_ITEM_TYPE, |(_, itype)| *itype)
    }
}

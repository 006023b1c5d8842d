//! Static classification tables for the legacy export.
//!
//! Everything here is data: branch renames, branch labels, copy status
//! codes, shelving labels, loan categories and the item-type rule list.
//! The rules that apply these tables live in [`crate::classify`].

use lazy_static::lazy_static;
use std::collections::HashMap;

/// Branch substituted for codes that cannot be resolved to a known branch.
pub const UNKNOWN_BRANCH: &str = "ukjent";

/// Registry label for an observed branch code without a known label.
pub const MISSING_LABEL: &str = "missing label";

/// Copies owned by these branches are dropped before encoding.
pub const EXCLUDED_BRANCHES: &[&str] = &["dfb"];

/// Owning branch of the Bjørnholt teaching collection.
pub const BJORNHOLT_BRANCH: &str = "fbjl";

/// Owning branch of the Nydalen teaching collection.
pub const NYDALEN_BRANCH: &str = "fnyl";

/// Ledger status code for a copy that is currently on loan.
pub const ON_LOAN_STATUS: &str = "u";

/// Item type used when no rule matches the record type code.
pub const DEFAULT_ITEM_TYPE: &str = "BOK";

/// Canonical label of the shelving code `m`.
pub const SHELVING_LABELS: &[(&str, &str)] = &[("m", "Miljøhylla")];

/// Which of the mutually exclusive item status families a flag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusFamily {
    /// `952 $0`
    Withdrawn,
    /// `952 $1`
    Lost,
    /// `952 $4`
    Damaged,
    /// `952 $7`; negative values still allow holds.
    NotForLoan,
}

impl StatusFamily {
    /// Item field subfield carrying this family.
    #[must_use]
    pub fn subfield_code(self) -> char {
        match self {
            StatusFamily::Withdrawn => '0',
            StatusFamily::Lost => '1',
            StatusFamily::Damaged => '4',
            StatusFamily::NotForLoan => '7',
        }
    }

    /// Authorized value category in the target system.
    #[must_use]
    pub fn category(self) -> &'static str {
        match self {
            StatusFamily::Withdrawn => "WITHDRAWN",
            StatusFamily::Lost => "LOST",
            StatusFamily::Damaged => "DAMAGED",
            StatusFamily::NotForLoan => "NOT_LOAN",
        }
    }
}

/// A normalized status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlag {
    /// Flag family; a copy carries at most one.
    pub family: StatusFamily,
    /// Authorized value written to the item field.
    pub value: &'static str,
    /// Staff-facing description.
    pub description: &'static str,
}

const fn flag(family: StatusFamily, value: &'static str, description: &'static str) -> StatusFlag {
    StatusFlag {
        family,
        value,
        description,
    }
}

/// Ledger status code → flag, in authorized value order.
pub const STATUS_TABLE: &[(&str, StatusFlag)] = &[
    ("n", flag(StatusFamily::NotForLoan, "-1", "Til klargjøring")),
    ("c", flag(StatusFamily::NotForLoan, "1", "Til internt bruk")),
    ("o", flag(StatusFamily::NotForLoan, "2", "Til reparasjon")),
    ("b", flag(StatusFamily::NotForLoan, "2", "Til reparasjon")),
    ("q", flag(StatusFamily::NotForLoan, "4", "Retting")),
    ("m", flag(StatusFamily::NotForLoan, "4", "Retting")),
    ("t", flag(StatusFamily::Lost, "1", "Tapt")),
    ("i", flag(StatusFamily::Lost, "4", "Ikke på plass")),
    ("V", flag(StatusFamily::Lost, "4", "Ikke på plass")),
    ("S", flag(StatusFamily::Lost, "8", "Tapt, regning betalt")),
    ("r", flag(StatusFamily::Lost, "12", "Forlengst forfalt")),
    ("p", flag(StatusFamily::Damaged, "2", "Menes levert")),
    ("l", flag(StatusFamily::Damaged, "3", "Menes ikke lånt")),
    ("v", flag(StatusFamily::Withdrawn, "1", "Vurderes kassert")),
];

/// Item types known to the target system, in `itypes.sql` order.
pub const ITEM_TYPES: &[(&str, &str)] = &[
    ("DAGSLAAN", "Dagslån"),
    ("UKESLAAN", "Hurtiglån (7 dager)"),
    ("TOUKESLAAN", "Hurtiglån (14 dager)"),
    ("SPRAAKKURS", "Språkkurs"),
    ("LYDBOK", "Lydbok"),
    ("MUSIKK", "Musikkopptak"),
    ("SPILL", "Spill"),
    ("FILM", "Film"),
    ("EBOK", "E-bok"),
    ("PERIODIKA", "Periodika"),
    ("BOK", "Bok"),
    ("NOTER", "Noter"),
    ("KART", "Kart"),
    ("REALIA", "Realia"),
    ("UKJENT", "Ukjent"),
];

/// Ordered item-type rules over single `019 $b` document codes.
///
/// The first pattern matching any of the record's codes decides.
pub const ITEM_TYPE_RULES: &[(&str, &str)] = &[
    (r"^dh$", "SPRAAKKURS"),
    (r"^d[ijkz]$", "LYDBOK"),
    (r"^d[a-gl-n]$", "MUSIKK"),
    (r"^g[ct]$", "SPILL"),
    (r"^e", "FILM"),
    (r"^g[e-g]$", "EBOK"),
    (r"^j", "PERIODIKA"),
    (r"^c$", "NOTER"),
    (r"^a", "KART"),
    (r"^r$", "REALIA"),
];

/// Exemplar loan category (`250 $a`) → item type override.
pub const LOAN_CATEGORIES: &[(&str, &str)] = &[
    ("Dagslån", "DAGSLAAN"),
    ("Ukeslån", "UKESLAAN"),
    ("Hurtiglån (7 dager)", "UKESLAAN"),
    ("Toukeslån", "TOUKESLAAN"),
    ("Hurtiglån (14 dager)", "TOUKESLAAN"),
];

lazy_static! {
    /// Retired or automat branch codes → canonical branch code.
    pub static ref BRANCH_SYNONYMS: HashMap<&'static str, &'static str> = [
        ("fbjh", "fbje"),
        ("fbji", "fbje"),
        ("fbli", "fbol"),
        ("fgyi", "fgry"),
        ("fnti", "fnor"),
        ("fsti", "fsto"),
        ("ftoi", "ftor"),
        ("hbbr", "hbar"),
        ("hvkr", "hutl"),
        ("hvlr", "hutl"),
        ("hvur", "hutl"),
        ("info", "hutl"),
        ("fstl", "fsto"),
        // automat branches
        ("fboa", "fbol"),
        ("ffua", "ffur"),
        ("fgaa", "fgam"),
        ("fgra", "fgry"),
        ("fgrb", "frgy"),
        ("fhoa", "fhol"),
        ("flaa", "flam"),
        ("flan", "flam"),
        ("fmaa", "fmaj"),
        ("fnya", "fnyd"),
        ("fopa", "fopp"),
        ("frma", "frmm"),
        ("frob", "froa"),
        ("ftoa", "ftor"),
        ("hvma", "hvmu"),
        ("hvua", "hutl"),
    ]
    .into_iter()
    .collect();

    /// Canonical branch code → display label.
    pub static ref BRANCH_LABELS: HashMap<&'static str, &'static str> = [
        ("api", "Internt API"),
        ("hutl", "Hovedbiblioteket"),
        ("hbar", "Hovedbiblioteket, barn"),
        ("hvmu", "Hovedbiblioteket, musikk"),
        ("fbje", "Bjerke"),
        ("fbjo", "Bjørnholt"),
        ("fbol", "Bøler"),
        ("ffur", "Furuset"),
        ("fgam", "Tøyen"),
        ("fgry", "Grünerløkka"),
        ("fhol", "Holmlia"),
        ("flam", "Lambertseter"),
        ("fmaj", "Majorstuen"),
        ("fnor", "Nordtvet"),
        ("fnyd", "Nydalen"),
        ("fopp", "Oppsal"),
        ("frik", "Rikshospitalet"),
        ("frmm", "Rommen"),
        ("froa", "Røa"),
        ("from", "Romsås"),
        ("fsme", "Smestad"),
        ("fsto", "Stovner"),
        ("ftor", "Torshov"),
        ("hsko", "Skoletjenesten"),
        (UNKNOWN_BRANCH, "Ukjent avdeling"),
    ]
    .into_iter()
    .collect();

    /// Ledger status code → flag.
    pub static ref STATUS_FLAGS: HashMap<&'static str, StatusFlag> =
        STATUS_TABLE.iter().copied().collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_resolve_to_labelled_branches() {
        // frgy is a known typo in the source system and stays unresolved
        for (old, new) in BRANCH_SYNONYMS.iter() {
            assert!(
                BRANCH_LABELS.contains_key(new) || *new == "frgy",
                "{old} -> {new} has no label"
            );
        }
    }

    #[test]
    fn test_status_codes_are_unique() {
        assert_eq!(STATUS_FLAGS.len(), STATUS_TABLE.len());
        assert_eq!(STATUS_FLAGS["V"].family, StatusFamily::Lost);
        assert_eq!(STATUS_FLAGS["n"].value, "-1");
        assert!(!STATUS_FLAGS.contains_key(ON_LOAN_STATUS));
    }

    #[test]
    fn test_rule_targets_are_known_item_types() {
        let known: Vec<&str> = ITEM_TYPES.iter().map(|(code, _)| *code).collect();
        for (_, itype) in ITEM_TYPE_RULES.iter().chain(LOAN_CATEGORIES) {
            assert!(known.contains(itype), "{itype} missing from item types");
        }
        assert!(known.contains(&DEFAULT_ITEM_TYPE));
    }

    #[test]
    fn test_family_subfields() {
        assert_eq!(StatusFamily::NotForLoan.subfield_code(), '7');
        assert_eq!(StatusFamily::Withdrawn.category(), "WITHDRAWN");
    }
}

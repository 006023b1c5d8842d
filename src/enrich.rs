//! Joining catalogue records with their copies from the item ledger.
//!
//! For every catalogue record the [`Enricher`] looks up the title number in
//! the [`TitleIndex`], seeks the ledger to the start of that title's run and
//! turns each copy into one `952` item field. Copies that are on loan also
//! yield an [`Issue`].
//!
//! Problems with individual values never abort the run: a record without a
//! numeric title number is skipped, a copy without a numeric copy number is
//! skipped, an unknown branch becomes `ukjent` and a malformed due date is
//! left out. Each of these is logged.

use crate::branches::BranchRegistry;
use crate::classify::{
    barcode, borrower, call_number, parse_due_date, renewals, resolve_branch, shelving_label,
    status_flag, Branch, DueDate, ItemTypeRules,
};
use crate::error::Result;
use crate::exemplar::ExemplarTables;
use crate::kv_decoder::{KvDecoder, LedgerRecord};
use crate::mappings::ON_LOAN_STATUS;
use crate::record::{first_subfield, title_number, Field, Record, TitleNumber};
use crate::sql::Issue;
use crate::title_index::TitleIndex;
use std::io::{Read, Seek};
use tracing::{debug, warn};

/// Tag of the item field.
pub const ITEM_TAG: &str = "952";

/// Tag of the record-level item type field.
pub const RECORD_TYPE_TAG: &str = "942";

const AGE_LIMIT_TAG: &str = "521";

/// Restricted-use value written to `952 $5` for reference copies.
const RESTRICTED: &str = "2";

/// A catalogue record with its item fields, plus the loans found on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enriched {
    /// The record carrying one `952` per retained copy.
    pub record: Record,
    /// Active loans, in ledger order.
    pub issues: Vec<Issue>,
    /// Copies dropped because their branch is excluded.
    pub discarded: usize,
    /// Copies skipped because their copy number was not numeric.
    pub skipped_copies: usize,
}

enum CopyOutcome {
    Item(Field, Option<Issue>),
    Discarded,
    Skipped,
}

/// Record-level massaging shared by the items-free and the enriched output.
///
/// Removes any pre-existing item fields, turns `019 $s` into an age-limit
/// note and writes a fresh `942 $y` with the item type derived from
/// `019 $b`. Returns that item type.
pub fn prepare_record(record: &mut Record, rules: &ItemTypeRules) -> &'static str {
    record.remove_fields_by_tag(ITEM_TAG);

    let age_limit = first_subfield(record, "019", 's').to_string();
    if !age_limit.is_empty() {
        record.remove_fields_by_tag(AGE_LIMIT_TAG);
        record.add_field(
            Field::builder(AGE_LIMIT_TAG.to_string(), ' ', ' ')
                .subfield('a', format!("Aldersgrense {age_limit}"))
                .build(),
        );
    }

    let item_type = rules.classify(first_subfield(record, "019", 'b'));
    record.remove_fields_by_tag(RECORD_TYPE_TAG);
    record.add_field(
        Field::builder(RECORD_TYPE_TAG.to_string(), ' ', ' ')
            .subfield_str('y', item_type)
            .build(),
    );
    item_type
}

/// Joins catalogue records with a seekable item ledger.
#[derive(Debug)]
pub struct Enricher<'a, R: Read> {
    ledger: KvDecoder<R>,
    index: &'a TitleIndex,
    exemplars: &'a ExemplarTables,
    rules: &'a ItemTypeRules,
}

impl<'a, R: Read + Seek> Enricher<'a, R> {
    /// Create an enricher over its own ledger handle.
    pub fn new(
        ledger: R,
        index: &'a TitleIndex,
        exemplars: &'a ExemplarTables,
        rules: &'a ItemTypeRules,
    ) -> Self {
        Enricher {
            ledger: KvDecoder::new(ledger),
            index,
            exemplars,
            rules,
        }
    }

    /// Swap in a fresh ledger handle after a failed read.
    pub fn replace_ledger(&mut self, ledger: R) {
        self.ledger = KvDecoder::new(ledger);
    }

    /// Enrich one catalogue record.
    ///
    /// Returns `Ok(None)` when the record has no numeric title number; the
    /// ledger is not touched in that case. Branches seen on retained and
    /// unresolved copies are recorded in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or seeked.
    pub fn enrich(
        &mut self,
        mut record: Record,
        registry: &mut BranchRegistry,
    ) -> Result<Option<Enriched>> {
        let Some(title) = title_number(&record) else {
            warn!(
                title = record.get_control_field("001").unwrap_or(""),
                "title number is not numeric; skipping record"
            );
            return Ok(None);
        };

        let record_item_type = prepare_record(&mut record, self.rules);
        let mut enriched = Enriched {
            record,
            issues: Vec::new(),
            discarded: 0,
            skipped_copies: 0,
        };

        let Some(offset) = self.index.get(&title.key) else {
            debug!(title = %title.key, "no copies in item ledger");
            return Ok(Some(enriched));
        };
        self.ledger.seek(offset)?;
        let copies = self.ledger.scan_run(&title.key)?;

        let mut items = Vec::with_capacity(copies.len());
        for copy in &copies {
            match self.build_item(copy, &enriched.record, &title, record_item_type, registry) {
                CopyOutcome::Item(field, issue) => {
                    items.push(field);
                    enriched.issues.extend(issue);
                },
                CopyOutcome::Discarded => enriched.discarded += 1,
                CopyOutcome::Skipped => enriched.skipped_copies += 1,
            }
        }
        for field in items {
            enriched.record.add_field(field);
        }

        Ok(Some(enriched))
    }

    fn build_item(
        &self,
        copy: &LedgerRecord,
        record: &Record,
        title: &TitleNumber,
        record_item_type: &'static str,
        registry: &mut BranchRegistry,
    ) -> CopyOutcome {
        let value = |key: &str| copy.get(key).unwrap_or("");

        let copy_number = value("ex_exnr");
        let Ok(number) = copy_number.parse::<u32>() else {
            warn!(title = %title.key, copy = copy_number, "copy number is not numeric; skipping copy");
            return CopyOutcome::Skipped;
        };
        let code = barcode(title.number, number);

        let branch = resolve_branch(value("ex_avd"));
        let subset = matches!(branch, Branch::Subset(_));
        if let Branch::Excluded(ref excluded) = branch {
            debug!(barcode = %code, branch = %excluded, "discarding copy of excluded branch");
            return CopyOutcome::Discarded;
        }
        let branch = registry.observe(branch);

        let mut field = Field::new(ITEM_TAG.to_string(), ' ', ' ');
        field.add_subfield_str('t', copy_number);
        field.add_subfield_str('p', &code);
        field.add_subfield_str('a', &branch);
        field.add_subfield_str('b', &branch);

        if let Some(label) = shelving_label(value("ex_plass")) {
            field.add_subfield('c', label);
        }
        let note = value("ex_note");
        if !note.is_empty() {
            field.add_subfield_str('z', note);
        }
        let volume = value("ex_bind");
        if !volume.is_empty() && volume != "0" {
            field.add_subfield_str('h', volume);
        }

        let status = value("ex_status");
        if let Some(flag) = status_flag(status) {
            field.add_subfield_str(flag.family.subfield_code(), flag.value);
        }

        let renewal_count = renewals(value("ex_laanstat"));
        if let Some(count) = renewal_count {
            field.add_subfield('m', count.to_string());
        }
        if matches!(value("ex_utlkode"), "e" | "r") {
            field.add_subfield_str('5', RESTRICTED);
        }

        let due_date = match parse_due_date(value("ex_forfall")) {
            DueDate::Date(date) => {
                field.add_subfield_str('q', &date);
                Some(date)
            },
            DueDate::NotSet => None,
            DueDate::Malformed => {
                warn!(barcode = %code, due = value("ex_forfall"), "unknown due date format; omitting");
                None
            },
        };

        let loans = value("ex_antlaan");
        if !loans.is_empty() {
            field.add_subfield_str('l', loans);
        }
        let call = call_number(record);
        if !call.is_empty() {
            field.add_subfield('o', call);
        }
        let item_type = self.exemplars.item_type(&code).unwrap_or(record_item_type);
        field.add_subfield_str('y', item_type);

        let issue = (status == ON_LOAN_STATUS && !subset).then(|| Issue {
            renewals: renewal_count.unwrap_or(0),
            due_date,
            borrower: borrower(value("ex_laanr")).to_string(),
            branch: self
                .exemplars
                .issuing_branch(&code)
                .unwrap_or(&branch)
                .to_string(),
            barcode: code,
        });

        CopyOutcome::Item(field, issue)
    }
}

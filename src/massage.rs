//! The massaging run: read the catalogue, enrich, route and write.
//!
//! [`run`] drives one pass over an already opened catalogue and writes to a
//! set of [`Outputs`]. [`massage_files`] wraps it with the file handling of a
//! complete run, including the lookup tables written after the pass.

use crate::branches::BranchRegistry;
use crate::classify::ItemTypeRules;
use crate::config::{MassageConfig, OutputLayout};
use crate::enrich::{Enriched, Enricher, ITEM_TAG};
use crate::error::{MassageError, Result};
use crate::exemplar::ExemplarTables;
use crate::formats::{Format, FormatReader};
use crate::line_reader::LineMarcReader;
use crate::marcxml::{record_to_marcxml, MarcxmlReader, MarcxmlWriter};
use crate::parallel;
use crate::reader::MarcReader;
use crate::record::Record;
use crate::router::{route, Subset};
use crate::sql::{write_authorised_values, write_item_types, IssueWriter};
use crate::title_index::TitleIndex;
use crate::writer::{encode_record, MarcWriter};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Leader record statuses that never leave the catalogue: interlibrary,
/// deposit and deleted records.
pub const DROPPED_STATUSES: [char; 7] = ['f', 'e', 'i', 'l', 't', 'm', 'd'];

/// Whether a catalogue record is dropped before skip counting.
#[must_use]
pub fn is_dropped(record: &Record) -> bool {
    DROPPED_STATUSES.contains(&record.leader.record_status)
}

/// Read-only tables shared by every enrichment.
#[derive(Debug)]
pub struct Lookups {
    /// Title offsets in the item ledger.
    pub index: TitleIndex,
    /// Barcode overrides from the exemplar dump.
    pub exemplars: ExemplarTables,
    /// Item type rules over `019 $b`.
    pub rules: ItemTypeRules,
}

impl Lookups {
    /// Index the ledger and load the optional exemplar dump.
    ///
    /// # Errors
    ///
    /// Returns an error if either source cannot be read.
    pub fn load<L: BufRead, E: Read>(ledger: L, exemplars: Option<E>) -> Result<Self> {
        let index = TitleIndex::build(ledger)?;
        let exemplars = match exemplars {
            Some(source) => ExemplarTables::from_reader(source)?,
            None => ExemplarTables::default(),
        };
        Ok(Lookups {
            index,
            exemplars,
            rules: ItemTypeRules::new()?,
        })
    }

    /// An enricher reading copies from `ledger`.
    pub fn enricher<R: Read + Seek>(&self, ledger: R) -> Enricher<'_, R> {
        Enricher::new(ledger, &self.index, &self.exemplars, &self.rules)
    }
}

/// Open a catalogue stream, sniffing its format unless one is given.
///
/// An empty stream is read as line-MARC and yields no records.
///
/// # Errors
///
/// Returns [`MassageError::ParseError`] if the format cannot be recognized.
pub fn open_catalogue<R>(source: R, format: Option<Format>) -> Result<Box<dyn FormatReader>>
where
    R: Read + std::fmt::Debug + 'static,
{
    let mut source = BufReader::new(source);
    let format = match format {
        Some(format) => format,
        None => {
            let sniff = source.fill_buf()?;
            if sniff.is_empty() {
                Format::LineMarc
            } else {
                Format::detect(sniff).ok_or_else(|| {
                    MassageError::ParseError("unrecognized catalogue format".to_string())
                })?
            }
        },
    };
    debug!(%format, "reading catalogue");

    Ok(match format {
        Format::LineMarc => Box::new(LineMarcReader::new(source)),
        Format::Iso2709 => Box::new(MarcReader::new(source)),
        Format::MarcXml => Box::new(MarcxmlReader::new(source)),
    })
}

/// Counters of one run plus the collected branch registry.
#[derive(Debug, Clone, Default)]
pub struct MassageReport {
    /// Catalogue records read.
    pub records_read: usize,
    /// Records dropped for their leader status.
    pub records_dropped: usize,
    /// Records passed over by the skip count.
    pub records_skipped: usize,
    /// Records without a numeric title number.
    pub records_invalid: usize,
    /// Records written to the main and items-free outputs.
    pub records_written: usize,
    /// Enriched records left out because they could not be encoded.
    pub records_unencodable: usize,
    /// Item fields written across main and subset outputs.
    pub items_written: usize,
    /// Copies of excluded branches.
    pub items_discarded: usize,
    /// Copies without a numeric copy number.
    pub copies_skipped: usize,
    /// Loans written to `issues.sql`.
    pub issues_written: usize,
    /// Records written per subset name.
    pub subset_records: BTreeMap<&'static str, usize>,
    /// Non-contiguous title runs in the ledger.
    pub duplicate_runs: usize,
    /// Branch codes seen on written copies.
    pub registry: BranchRegistry,
}

impl MassageReport {
    /// Log the counters at info level.
    pub fn log_summary(&self) {
        info!(
            read = self.records_read,
            dropped = self.records_dropped,
            skipped = self.records_skipped,
            invalid = self.records_invalid,
            written = self.records_written,
            "catalogue records"
        );
        if self.records_unencodable > 0 {
            warn!(records = self.records_unencodable, "records too large or malformed for ISO 2709");
        }
        info!(
            items = self.items_written,
            discarded = self.items_discarded,
            skipped = self.copies_skipped,
            issues = self.issues_written,
            branches = self.registry.len(),
            "items"
        );
        for (name, count) in &self.subset_records {
            info!(subset = name, records = count, "subset records");
        }
        if self.duplicate_runs > 0 {
            warn!(runs = self.duplicate_runs, "item ledger has reappearing title runs");
        }
    }
}

/// Counts and filters catalogue records before enrichment.
#[derive(Debug, Default)]
pub(crate) struct Admission {
    to_skip: usize,
    read: usize,
    dropped: usize,
    skipped: usize,
}

impl Admission {
    pub(crate) fn new(skip: usize) -> Self {
        Admission {
            to_skip: skip,
            ..Admission::default()
        }
    }

    /// Whether the record goes on to enrichment.
    pub(crate) fn admit(&mut self, record: &Record) -> bool {
        self.read += 1;
        if is_dropped(record) {
            self.dropped += 1;
            return false;
        }
        if self.to_skip > 0 {
            self.to_skip -= 1;
            self.skipped += 1;
            return false;
        }
        true
    }

    pub(crate) fn record_into(&self, report: &mut MassageReport) {
        report.records_read = self.read;
        report.records_dropped = self.dropped;
        report.records_skipped = self.skipped;
    }
}

/// Enrich one record into a private registry, reopening the ledger after
/// transient failures.
pub(crate) fn enrich_with_retry<L, F>(
    enricher: &mut Enricher<'_, L>,
    record: &Record,
    open_ledger: &F,
    max_retries: usize,
) -> Result<Option<(Enriched, BranchRegistry)>>
where
    L: Read + Seek,
    F: Fn() -> Result<L>,
{
    let mut attempt = 0;
    loop {
        let mut registry = BranchRegistry::new();
        match enricher.enrich(record.clone(), &mut registry) {
            Ok(enriched) => return Ok(enriched.map(|e| (e, registry))),
            Err(err) if err.is_transient() && attempt < max_retries => {
                attempt += 1;
                warn!(
                    title = record.get_control_field("001").unwrap_or(""),
                    attempt,
                    max_retries,
                    error = %err,
                    "ledger read failed; retrying with a fresh handle"
                );
                enricher.replace_ledger(open_ledger()?);
            },
            Err(err) => return Err(err),
        }
    }
}

/// The record sinks of one run.
#[derive(Debug)]
pub struct Outputs<W: Write> {
    catalogue: MarcWriter<W>,
    items_free: MarcxmlWriter<W>,
    subsets: Vec<(Subset, MarcxmlWriter<W>)>,
    issues: IssueWriter<W>,
}

impl<W: Write> Outputs<W> {
    /// Wrap the five sinks of a run.
    pub fn new(catalogue: W, items_free: W, bjornholt: W, nydalen: W, issues: W) -> Self {
        Outputs {
            catalogue: MarcWriter::new(catalogue),
            items_free: MarcxmlWriter::new(items_free),
            subsets: vec![
                (Subset::Bjornholt, MarcxmlWriter::new(bjornholt)),
                (Subset::Nydalen, MarcxmlWriter::new(nydalen)),
            ],
            issues: IssueWriter::new(issues),
        }
    }

    /// Write the loans of an enriched record and route it to the sinks.
    ///
    /// The main and items-free views are encoded before anything is written.
    /// A record that cannot be encoded, most often one whose items push it
    /// past the ISO 2709 length limit, is logged, counted and left out of
    /// every output so the two views stay paired by position. Returns whether
    /// the record was written.
    ///
    /// # Errors
    ///
    /// Returns an error if any sink fails.
    pub fn emit(&mut self, enriched: Enriched, report: &mut MassageReport) -> Result<bool> {
        let routed = route(enriched.record);
        let encoded = encode_record(&routed.main)
            .and_then(|main| record_to_marcxml(&routed.items_free).map(|xml| (main, xml)));
        let (main, items_free) = match encoded {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(
                    title = routed.main.get_control_field("001").unwrap_or(""),
                    items = routed.main.fields_by_tag(ITEM_TAG).count(),
                    error = %err,
                    "record cannot be encoded; left out of every output"
                );
                report.records_unencodable += 1;
                return Ok(false);
            },
        };

        for issue in &enriched.issues {
            self.issues.write_issue(issue)?;
        }
        report.issues_written += enriched.issues.len();
        report.items_discarded += enriched.discarded;
        report.copies_skipped += enriched.skipped_copies;

        self.items_free.write_encoded(&items_free)?;
        self.catalogue.write_encoded(&main)?;
        report.items_written += routed.main.fields_by_tag(ITEM_TAG).count();

        for (subset, record) in &routed.subsets {
            if let Some((_, writer)) = self.subsets.iter_mut().find(|(s, _)| s == subset) {
                writer.write_record(record)?;
            }
            report.items_written += record.fields_by_tag(ITEM_TAG).count();
            *report.subset_records.entry(subset.name()).or_insert(0) += 1;
        }

        report.records_written += 1;
        Ok(true)
    }

    /// Write trailers and flush every sink.
    ///
    /// # Errors
    ///
    /// Returns an error if any sink fails.
    pub fn finish(&mut self) -> Result<()> {
        self.catalogue.finish()?;
        self.items_free.finish()?;
        for (_, writer) in &mut self.subsets {
            writer.finish()?;
        }
        self.issues.finish()
    }
}

impl Outputs<BufWriter<File>> {
    /// Create the output files of `layout`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file cannot be created.
    pub fn create(layout: &OutputLayout) -> Result<Self> {
        let create = |path: PathBuf| -> Result<BufWriter<File>> { Ok(BufWriter::new(File::create(path)?)) };
        Ok(Outputs::new(
            create(layout.catalogue())?,
            create(layout.items_free())?,
            create(layout.subset(Subset::Bjornholt))?,
            create(layout.subset(Subset::Nydalen))?,
            create(layout.issues())?,
        ))
    }
}

/// Run one massaging pass.
///
/// Every handle returned by `open_ledger` must read the same ledger the
/// lookups were built from. With more than one worker the pass is handed to
/// the worker pool; the outputs are identical either way. The outputs are
/// finished before returning.
///
/// # Errors
///
/// Returns the first fatal error: a catalogue read failure, a ledger failure
/// that persisted through all retries, or a sink failure.
pub fn run<L, F, W>(
    catalogue: &mut dyn FormatReader,
    open_ledger: F,
    lookups: &Lookups,
    config: &MassageConfig,
    outputs: &mut Outputs<W>,
) -> Result<MassageReport>
where
    L: Read + Seek,
    F: Fn() -> Result<L> + Sync,
    W: Write + Send,
{
    let mut report = if config.is_parallel() {
        parallel::run(catalogue, &open_ledger, lookups, config, outputs)?
    } else {
        run_sequential(catalogue, &open_ledger, lookups, config, outputs)?
    };
    outputs.finish()?;
    report.duplicate_runs = lookups.index.duplicate_runs();
    Ok(report)
}

fn run_sequential<L, F, W>(
    catalogue: &mut dyn FormatReader,
    open_ledger: &F,
    lookups: &Lookups,
    config: &MassageConfig,
    outputs: &mut Outputs<W>,
) -> Result<MassageReport>
where
    L: Read + Seek,
    F: Fn() -> Result<L>,
    W: Write,
{
    let mut enricher = lookups.enricher(open_ledger()?);
    let mut admission = Admission::new(config.skip);
    let mut report = MassageReport::default();

    while !limit_reached(config, &report) {
        let Some(record) = catalogue.read_record()? else {
            break;
        };
        if !admission.admit(&record) {
            continue;
        }
        match enrich_with_retry(&mut enricher, &record, open_ledger, config.max_retries)? {
            Some((enriched, registry)) => {
                if outputs.emit(enriched, &mut report)? {
                    report.registry.merge(registry);
                }
            },
            None => report.records_invalid += 1,
        }
    }

    admission.record_into(&mut report);
    Ok(report)
}

pub(crate) fn limit_reached(config: &MassageConfig, report: &MassageReport) -> bool {
    config.limit.is_some_and(|limit| report.records_written >= limit)
}

/// Input files of a run.
#[derive(Debug, Clone)]
pub struct InputPaths {
    /// The catalogue export.
    pub catalogue: PathBuf,
    /// The item ledger.
    pub ledger: PathBuf,
    /// The exemplar dump, if any.
    pub exemplars: Option<PathBuf>,
    /// Catalogue format; sniffed when `None`.
    pub format: Option<Format>,
}

/// Write `branches.sql`, `itypes.sql` and `avalues.sql`.
///
/// # Errors
///
/// Returns an I/O error if a file cannot be written.
pub fn write_lookup_tables(layout: &OutputLayout, registry: &BranchRegistry) -> Result<()> {
    let mut branches = BufWriter::new(File::create(layout.branches())?);
    registry.write_sql(&mut branches)?;
    branches.flush()?;

    let mut item_types = BufWriter::new(File::create(layout.item_types())?);
    write_item_types(&mut item_types)?;
    item_types.flush()?;

    let mut values = BufWriter::new(File::create(layout.authorised_values())?);
    write_authorised_values(&mut values)?;
    values.flush()?;
    Ok(())
}

/// Run a complete massaging job from files into `layout`.
///
/// # Errors
///
/// Returns an error if an input cannot be read or an output written.
pub fn massage_files(
    inputs: &InputPaths,
    layout: &OutputLayout,
    config: &MassageConfig,
) -> Result<MassageReport> {
    let ledger = BufReader::new(File::open(&inputs.ledger)?);
    let exemplars = inputs.exemplars.as_ref().map(File::open).transpose()?;
    let lookups = Lookups::load(ledger, exemplars)?;
    info!(
        titles = lookups.index.len(),
        exemplars = !lookups.exemplars.is_empty(),
        "lookups loaded"
    );

    fs::create_dir_all(layout.dir())?;
    let mut catalogue = open_catalogue(File::open(&inputs.catalogue)?, inputs.format)?;
    let mut outputs = Outputs::create(layout)?;

    let report = run(
        catalogue.as_mut(),
        || Ok(File::open(&inputs.ledger)?),
        &lookups,
        config,
        &mut outputs,
    )?;
    write_lookup_tables(layout, &report.registry)?;
    report.log_summary();
    Ok(report)
}

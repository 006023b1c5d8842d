#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # catmassage
//!
//! Joins a catalogue export with the item ledger of the same library system
//! and writes the migration dumps: an enriched ISO 2709 catalogue, MARCXML
//! views without items and per teaching collection, loans as SQL and the
//! branch codes seen along the way.
//!
//! ## Enriching one record
//!
//! ```
//! use catmassage::branches::BranchRegistry;
//! use catmassage::massage::Lookups;
//! use catmassage::LineMarcReader;
//! use std::io::Cursor;
//!
//! let ledger = "ex_titnr |379371|\nex_exnr |1|\nex_avd |hutl|\n^\n";
//! let lookups = Lookups::load(Cursor::new(ledger), None::<&[u8]>)?;
//! let mut enricher = lookups.enricher(Cursor::new(ledger));
//!
//! let mut catalogue = LineMarcReader::new(Cursor::new("*000     n\n*0010379371\n^\n"));
//! let record = catalogue.read_record()?.expect("one record");
//!
//! let mut registry = BranchRegistry::new();
//! let enriched = enricher.enrich(record, &mut registry)?.expect("numeric title");
//! let item = enriched.record.get_field("952").expect("one item");
//! assert_eq!(item.get_subfield('p'), Some("03010379371001"));
//! assert_eq!(registry.get("hutl"), Some("Hovedbiblioteket"));
//! # Ok::<(), catmassage::MassageError>(())
//! ```
//!
//! ## Modules
//!
//! - [`kv_decoder`]: item ledger tokenizer
//! - [`title_index`]: byte offsets of each title's run in the ledger
//! - [`line_reader`], [`reader`], [`writer`], [`marcxml`]: record formats
//! - [`mappings`], [`classify`]: branch, status and item type tables
//! - [`exemplar`]: barcode overrides from the exemplar dump
//! - [`enrich`]: the join that builds `952` item fields
//! - [`router`]: items-free, main and subset views
//! - [`sql`], [`branches`]: SQL side outputs and the branch registry
//! - [`massage`]: a complete run; [`parallel`] spreads it over workers

pub mod branches;
pub mod classify;
pub mod config;
pub mod enrich;
pub mod error;
pub mod exemplar;
/// Reader and writer traits shared by the record formats.
pub mod formats;
pub mod kv_decoder;
pub mod leader;
pub mod line_reader;
pub mod mappings;
pub mod marcxml;
pub mod massage;
pub mod parallel;
pub mod reader;
/// Core MARC record structures (`Record`, `Field`, `Subfield`)
pub mod record;
pub mod router;
pub mod sql;
pub mod title_index;
pub mod writer;

pub use branches::BranchRegistry;
pub use config::{MassageConfig, OutputLayout};
pub use enrich::{Enriched, Enricher};
pub use error::{MassageError, Result};
pub use kv_decoder::{KvDecoder, LedgerRecord};
pub use leader::Leader;
pub use line_reader::LineMarcReader;
pub use marcxml::{MarcxmlReader, MarcxmlWriter};
pub use massage::{massage_files, InputPaths, Lookups, MassageReport, Outputs};
pub use reader::MarcReader;
pub use record::{Field, FieldBuilder, Record, RecordBuilder, Subfield};
pub use router::{route, Routed, Subset};
pub use title_index::TitleIndex;
pub use writer::MarcWriter;

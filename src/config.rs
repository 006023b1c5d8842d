//! Run configuration and output file layout.

use crate::router::Subset;
use std::path::{Path, PathBuf};

/// Configuration for one massaging run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MassageConfig {
    /// Number of eligible catalogue records to skip before processing.
    pub skip: usize,
    /// Stop after this many records have been routed.
    pub limit: Option<usize>,
    /// Enrichment threads; 1 runs everything on the calling thread.
    pub workers: usize,
    /// Retries per record after a transient ledger failure.
    pub max_retries: usize,
    /// Records in flight between the reader, the workers and the writer.
    pub channel_capacity: usize,
}

impl Default for MassageConfig {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: None,
            workers: 1,
            max_retries: 3,
            channel_capacity: 256,
        }
    }
}

impl MassageConfig {
    /// Whether the worker pool is used.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.workers > 1
    }
}

/// Paths of every file a run writes, inside one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    dir: PathBuf,
}

impl OutputLayout {
    /// Enriched catalogue, ISO 2709.
    pub const CATALOGUE: &'static str = "catalogue.mrc";
    /// Catalogue without items, MARCXML.
    pub const ITEMS_FREE: &'static str = "catalogue.marcxml";
    /// Active loans.
    pub const ISSUES: &'static str = "issues.sql";
    /// Branch codes seen in the ledger.
    pub const BRANCHES: &'static str = "branches.sql";
    /// Item type rows.
    pub const ITEM_TYPES: &'static str = "itypes.sql";
    /// Authorized status values.
    pub const AUTHORISED_VALUES: &'static str = "avalues.sql";

    /// Lay out outputs under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        OutputLayout { dir: dir.into() }
    }

    /// The output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the enriched ISO 2709 catalogue.
    #[must_use]
    pub fn catalogue(&self) -> PathBuf {
        self.dir.join(Self::CATALOGUE)
    }

    /// Path of the items-free MARCXML catalogue.
    #[must_use]
    pub fn items_free(&self) -> PathBuf {
        self.dir.join(Self::ITEMS_FREE)
    }

    /// Path of a subset's MARCXML file, e.g. `bjornholt.marcxml`.
    #[must_use]
    pub fn subset(&self, subset: Subset) -> PathBuf {
        self.dir.join(format!("{}.marcxml", subset.name()))
    }

    /// Path of `issues.sql`.
    #[must_use]
    pub fn issues(&self) -> PathBuf {
        self.dir.join(Self::ISSUES)
    }

    /// Path of `branches.sql`.
    #[must_use]
    pub fn branches(&self) -> PathBuf {
        self.dir.join(Self::BRANCHES)
    }

    /// Path of `itypes.sql`.
    #[must_use]
    pub fn item_types(&self) -> PathBuf {
        self.dir.join(Self::ITEM_TYPES)
    }

    /// Path of `avalues.sql`.
    #[must_use]
    pub fn authorised_values(&self) -> PathBuf {
        self.dir.join(Self::AUTHORISED_VALUES)
    }
}

//! Offset index over the item ledger.
//!
//! The ledger is sorted by title number, so all copies of a title form one
//! contiguous run. One forward pass records where each run starts; the
//! enrichment engine later seeks straight to it.

use crate::error::Result;
use crate::kv_decoder::TITLE_KEY;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;
use tracing::{debug, warn};

/// Map from join key to the byte offset of its first `ex_titnr` line.
#[derive(Debug, Clone, Default)]
pub struct TitleIndex {
    offsets: HashMap<String, u64>,
    duplicate_runs: usize,
}

impl TitleIndex {
    /// Index a ledger in a single sequential pass.
    ///
    /// Offsets count every byte including line terminators, so seeking to an
    /// offset lands exactly on the start of the title line. When a key shows
    /// up again after another key intervened, the first run is kept and the
    /// reappearance is counted and logged.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the ledger cannot be read.
    ///
    /// # Examples
    ///
    /// ```
    /// use catmassage::title_index::TitleIndex;
    /// use std::io::Cursor;
    ///
    /// let ledger = "ex_titnr |5|\n^\nex_titnr |6|\n^\n";
    /// let index = TitleIndex::build(Cursor::new(ledger))?;
    /// assert_eq!(index.get("5"), Some(0));
    /// assert_eq!(index.get("6"), Some(15));
    /// # Ok::<(), catmassage::MassageError>(())
    /// ```
    pub fn build<R: BufRead>(mut reader: R) -> Result<Self> {
        let prefix = format!("{TITLE_KEY} |");
        let mut index = TitleIndex::default();
        let mut line = Vec::new();
        let mut offset = 0u64;
        let mut current: Option<String> = None;

        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }

            if line.starts_with(prefix.as_bytes()) {
                let text = String::from_utf8_lossy(&line[prefix.len()..]);
                if let Cow::Owned(_) = text {
                    warn!(offset, "title line is not valid UTF-8; invalid bytes replaced");
                }
                let text = text.trim_end_matches(['\n', '\r']);
                let key = text.strip_suffix('|').unwrap_or(text).to_string();

                if current.as_deref() != Some(key.as_str()) {
                    if index.offsets.contains_key(&key) {
                        index.duplicate_runs += 1;
                        warn!(title = %key, offset, "title number reappears after another run; keeping the first run");
                    } else {
                        index.offsets.insert(key.clone(), offset);
                    }
                    current = Some(key);
                }
            }

            offset += n as u64;
        }

        debug!(titles = index.offsets.len(), bytes = offset, "indexed item ledger");
        Ok(index)
    }

    /// Offset of the first run for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).copied()
    }

    /// Number of distinct title numbers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the ledger held no title lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// How many non-contiguous reappearances of a title number were seen.
    #[must_use]
    pub fn duplicate_runs(&self) -> usize {
        self.duplicate_runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_decoder::KvDecoder;
    use std::io::Cursor;

    const LEDGER: &str = "ex_titnr |379371|\nex_exnr |1|\n^\nex_titnr |379371|\nex_exnr |2|\n^\n\
                          ex_titnr |1245593|\nex_exnr |1|\n^\n";

    #[test]
    fn test_first_occurrence_wins() {
        let index = TitleIndex::build(Cursor::new(LEDGER)).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("379371"), Some(0));
        assert_eq!(index.get("1245593"), Some(64));
        assert_eq!(index.get("1"), None);
        assert_eq!(index.duplicate_runs(), 0);
    }

    #[test]
    fn test_offsets_land_on_title_lines() {
        let index = TitleIndex::build(Cursor::new(LEDGER)).unwrap();
        let mut decoder = KvDecoder::new(Cursor::new(LEDGER));
        decoder.seek(index.get("1245593").unwrap()).unwrap();
        let record = decoder.read_record().unwrap().unwrap();
        assert_eq!(record.title(), Some("1245593"));
    }

    #[test]
    fn test_non_contiguous_reappearance_is_flagged() {
        let ledger = "ex_titnr |5|\n^\nex_titnr |6|\n^\nex_titnr |5|\n^\n";
        let index = TitleIndex::build(Cursor::new(ledger)).unwrap();
        assert_eq!(index.get("5"), Some(0));
        assert_eq!(index.duplicate_runs(), 1);
    }

    #[test]
    fn test_invalid_utf8_title_is_still_indexed() {
        let ledger = b"ex_titnr |5\xff|\n^\nex_titnr |6|\n^\n".to_vec();
        let index = TitleIndex::build(Cursor::new(ledger)).unwrap();
        assert_eq!(index.get("5\u{fffd}"), Some(0));
        assert_eq!(index.get("6"), Some(16));
    }

    #[test]
    fn test_crlf_offsets() {
        let ledger = "ex_titnr |5|\r\n^\r\nex_titnr |6|\r\n^\r\n";
        let index = TitleIndex::build(Cursor::new(ledger)).unwrap();
        assert_eq!(index.get("6"), Some(17));
    }
}

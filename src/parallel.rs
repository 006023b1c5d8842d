//! Worker pool variant of the massaging pass.
//!
//! The calling thread reads and admits catalogue records and feeds them,
//! numbered, into a bounded job channel. Each worker owns an [`Enricher`]
//! over its own ledger handle, so seeks never interfere. Results travel to a
//! single writer thread that restores input order before routing, which
//! keeps every output identical to the sequential pass.
//!
//! Branch codes are collected per record and merged by the writer in input
//! order, so records past the limit never reach the registry.
//!
//! [`Enricher`]: crate::enrich::Enricher

use crate::branches::BranchRegistry;
use crate::config::MassageConfig;
use crate::enrich::Enriched;
use crate::error::{MassageError, Result};
use crate::formats::FormatReader;
use crate::massage::{enrich_with_retry, limit_reached, Admission, Lookups, MassageReport, Outputs};
use crate::record::Record;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};
use std::thread;
use tracing::debug;

type Job = (u64, Record);
type Outcome = (u64, Result<Option<(Enriched, BranchRegistry)>>);

/// Run the massaging pass on `config.workers` threads.
///
/// Produces the same outputs as the sequential pass. The outputs are not
/// finished; [`crate::massage::run`] does that and should normally be used
/// instead.
///
/// # Errors
///
/// Returns the first fatal error in input order, or
/// [`MassageError::WorkerPool`] if a thread panicked.
pub fn run<L, F, W>(
    catalogue: &mut dyn FormatReader,
    open_ledger: &F,
    lookups: &Lookups,
    config: &MassageConfig,
    outputs: &mut Outputs<W>,
) -> Result<MassageReport>
where
    L: Read + Seek,
    F: Fn() -> Result<L> + Sync,
    W: Write + Send,
{
    let capacity = config.channel_capacity.max(1);
    let (job_tx, job_rx) = bounded::<Job>(capacity);
    let (outcome_tx, outcome_rx) = bounded::<Outcome>(capacity);
    let mut admission = Admission::new(config.skip);

    let mut report = thread::scope(|scope| -> Result<MassageReport> {
        let workers: Vec<_> = (0..config.workers)
            .map(|worker| {
                let jobs = job_rx.clone();
                let outcomes = outcome_tx.clone();
                scope.spawn(move || work(worker, &jobs, &outcomes, open_ledger, lookups, config.max_retries))
            })
            .collect();
        drop(job_rx);
        drop(outcome_tx);

        let writer = scope.spawn(move || write_in_order(outcome_rx, outputs, config));
        let fed = feed(catalogue, &job_tx, &mut admission);
        drop(job_tx);

        let report = writer
            .join()
            .map_err(|_| MassageError::WorkerPool("writer thread panicked".to_string()))??;
        for handle in workers {
            handle
                .join()
                .map_err(|_| MassageError::WorkerPool("enrichment worker panicked".to_string()))?;
        }
        fed?;
        Ok(report)
    })?;

    admission.record_into(&mut report);
    Ok(report)
}

/// Read and number admitted records until the catalogue ends or nobody is
/// listening any more.
fn feed(catalogue: &mut dyn FormatReader, jobs: &Sender<Job>, admission: &mut Admission) -> Result<()> {
    let mut seq = 0u64;
    while let Some(record) = catalogue.read_record()? {
        if !admission.admit(&record) {
            continue;
        }
        if jobs.send((seq, record)).is_err() {
            debug!(seq, "writer stopped; no more records needed");
            break;
        }
        seq += 1;
    }
    Ok(())
}

fn work<L, F>(
    worker: usize,
    jobs: &Receiver<Job>,
    outcomes: &Sender<Outcome>,
    open_ledger: &F,
    lookups: &Lookups,
    max_retries: usize,
) where
    L: Read + Seek,
    F: Fn() -> Result<L>,
{
    let mut enricher = match open_ledger() {
        Ok(ledger) => lookups.enricher(ledger),
        Err(err) => {
            if let Ok((seq, _)) = jobs.recv() {
                let _ = outcomes.send((seq, Err(err)));
            }
            return;
        },
    };

    let mut handled = 0usize;
    for (seq, record) in jobs {
        let outcome = enrich_with_retry(&mut enricher, &record, open_ledger, max_retries);
        let failed = outcome.is_err();
        handled += 1;
        if outcomes.send((seq, outcome)).is_err() || failed {
            break;
        }
    }
    debug!(worker, handled, "worker finished");
}

fn write_in_order<W: Write>(
    outcomes: Receiver<Outcome>,
    outputs: &mut Outputs<W>,
    config: &MassageConfig,
) -> Result<MassageReport> {
    let mut report = MassageReport::default();
    let mut pending = BTreeMap::new();
    let mut next = 0u64;

    if limit_reached(config, &report) {
        return Ok(report);
    }
    for (seq, outcome) in &outcomes {
        pending.insert(seq, outcome);
        while let Some(outcome) = pending.remove(&next) {
            next += 1;
            match outcome? {
                Some((enriched, registry)) => {
                    if outputs.emit(enriched, &mut report)? {
                        report.registry.merge(registry);
                    }
                    if limit_reached(config, &report) {
                        return Ok(report);
                    }
                },
                None => report.records_invalid += 1,
            }
        }
    }

    if !pending.is_empty() {
        return Err(MassageError::WorkerPool(format!(
            "result {next} never arrived; {} later results dropped",
            pending.len()
        )));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use crate::config::MassageConfig;
    use crate::line_reader::LineMarcReader;
    use crate::massage::{run, Lookups, MassageReport, Outputs};
    use std::fmt::Write as _;
    use std::io::Cursor;

    const BRANCHES: [&str; 6] = ["hutl", "fbjl", "xyz", "dfb", "fnyl", "fmaj"];

    fn fixture() -> (String, String) {
        let mut catalogue = String::new();
        let mut ledger = String::new();
        for title in 1..=60u32 {
            let status = if title % 11 == 0 { 'd' } else { 'n' };
            let _ = write!(catalogue, "*000     {status}\n*001{title:07}\n*24510$aTitle {title}\n^\n");
            if title % 7 == 0 {
                continue;
            }
            for copy in 1..=(title % 4 + 1) {
                let branch = BRANCHES[((title + copy) as usize) % BRANCHES.len()];
                let loan = if copy == 1 { "ex_status |u|\nex_laanr |-7|\n" } else { "" };
                let _ = write!(
                    ledger,
                    "ex_titnr |{title}|\nex_exnr |{copy}|\nex_avd |{branch}|\n{loan}^\n"
                );
            }
        }
        (catalogue, ledger)
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    struct Buffers {
        catalogue: Vec<u8>,
        items_free: Vec<u8>,
        bjornholt: Vec<u8>,
        nydalen: Vec<u8>,
        issues: Vec<u8>,
        branches: Vec<u8>,
    }

    fn massage(config: &MassageConfig) -> (MassageReport, Buffers) {
        let (catalogue, ledger) = fixture();
        let lookups = Lookups::load(Cursor::new(ledger.as_str()), None::<&[u8]>).unwrap();
        let mut reader = LineMarcReader::new(Cursor::new(catalogue));
        let mut buffers = Buffers::default();
        let report = {
            let mut outputs = Outputs::new(
                &mut buffers.catalogue,
                &mut buffers.items_free,
                &mut buffers.bjornholt,
                &mut buffers.nydalen,
                &mut buffers.issues,
            );
            run(
                &mut reader,
                || Ok(Cursor::new(ledger.as_bytes())),
                &lookups,
                config,
                &mut outputs,
            )
            .unwrap()
        };
        report.registry.write_sql(&mut buffers.branches).unwrap();
        (report, buffers)
    }

    #[test]
    fn test_pool_output_matches_sequential() {
        let (sequential_report, sequential) = massage(&MassageConfig::default());
        let config = MassageConfig {
            workers: 4,
            channel_capacity: 3,
            ..MassageConfig::default()
        };
        let (pool_report, pool) = massage(&config);

        assert_eq!(pool, sequential);
        assert_eq!(pool_report.records_written, sequential_report.records_written);
        assert_eq!(pool_report.records_dropped, sequential_report.records_dropped);
        assert_eq!(pool_report.issues_written, sequential_report.issues_written);
        assert!(pool_report.issues_written > 0);
        assert!(!pool.bjornholt.is_empty());
    }

    #[test]
    fn test_pool_honours_skip_and_limit() {
        let base = MassageConfig {
            skip: 5,
            limit: Some(17),
            ..MassageConfig::default()
        };
        let (sequential_report, sequential) = massage(&base);
        let (pool_report, pool) = massage(&MassageConfig {
            workers: 3,
            channel_capacity: 2,
            ..base
        });

        assert_eq!(sequential_report.records_written, 17);
        assert_eq!(pool_report.records_written, 17);
        assert_eq!(pool, sequential);
    }
}

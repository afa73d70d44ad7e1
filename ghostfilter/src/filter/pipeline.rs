use crossbeam_channel::{bounded, Receiver, Sender};
use std::io;
use std::num::NonZeroUsize;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::classifier::classify;
use crate::errors::{FilterError, FilterResult, Stage};
use crate::results::PipelineResult;
use crate::rules::RuleSet;
use crate::sink::ResultSink;
use crate::stats::StatsAggregator;

/// Capacity of the candidate and result queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Sizing of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Number of classification threads
    pub workers: NonZeroUsize,
    /// Bound of each queue; 0 is treated as 1
    pub queue_capacity: usize,
}

impl PipelineOptions {
    pub fn new(workers: NonZeroUsize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// A run that stopped on an I/O error.
///
/// Everything classified before the stop is still counted in `partial`.
#[derive(Debug, Error)]
#[error("pipeline stopped early: {error}")]
pub struct PipelineFailure {
    #[source]
    pub error: FilterError,
    pub partial: PipelineResult,
}

impl PipelineFailure {
    pub fn into_parts(self) -> (FilterError, PipelineResult) {
        (self.error, self.partial)
    }
}

/// What the collector saw while draining the result queue
#[derive(Debug, Default)]
struct Collected {
    matched: u64,
    written: u64,
    error: Option<FilterError>,
}

/// Classifies every input line and writes the sensitive ones to `sink`.
///
/// A producer thread feeds a bounded candidate queue, `options.workers`
/// threads classify and push hits onto a bounded result queue, and the
/// calling thread drains that queue into the sink. Output order follows
/// dequeue order, not input order. Returns once every thread has exited
/// and the statistics have been snapshotted.
///
/// A read error stops production. A sink error stops production and the
/// remaining results are drained without being written. In both cases the
/// error comes back together with the partial result.
pub fn run<I, S>(
    lines: I,
    rules: &RuleSet,
    options: &PipelineOptions,
    sink: &mut S,
) -> Result<PipelineResult, PipelineFailure>
where
    I: IntoIterator<Item = io::Result<String>>,
    I::IntoIter: Send,
    S: ResultSink + ?Sized,
{
    let started = Instant::now();
    let worker_count = options.workers.get();
    let capacity = options.queue_capacity.max(1);
    info!(
        "Starting filter: {} workers, queue capacity {}, {} rules, {} excluded extensions",
        worker_count,
        capacity,
        rules.len(),
        rules.excluded_extensions().count()
    );

    let stats = StatsAggregator::for_rules(rules);
    let stop = AtomicBool::new(false);
    let (job_tx, job_rx) = bounded::<String>(capacity);
    let (result_tx, result_rx) = bounded::<String>(capacity);
    let lines = lines.into_iter();

    let (processed, collected, production) = thread::scope(|scope| {
        let stats = &stats;
        let stop = &stop;

        let mut workers = Vec::with_capacity(worker_count);
        let mut spawn_error = None;
        for id in 0..worker_count {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("ghostfilter-worker-{id}"))
                .spawn_scoped(scope, move || work(id, jobs, results, rules, stats));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    spawn_error = Some(FilterError::io(Stage::Workers, e));
                    break;
                }
            }
        }
        // Queues close only when the producer and the workers hold the
        // last handles.
        drop(job_rx);
        drop(result_tx);

        let producer = match spawn_error {
            None => thread::Builder::new()
                .name("ghostfilter-producer".to_string())
                .spawn_scoped(scope, move || produce(lines, job_tx, stop))
                .map_err(|e| FilterError::io(Stage::Producer, e)),
            Some(e) => {
                drop(job_tx);
                Err(e)
            }
        };

        let collected = collect(result_rx, sink, stop);

        let processed = workers.into_iter().map(join).sum::<u64>();
        let production = producer.and_then(join);
        (processed, collected, production)
    });

    let result = PipelineResult {
        processed,
        matched: collected.matched,
        written: collected.written,
        stats: stats.snapshot(),
        elapsed: started.elapsed(),
    };

    match production.err().or(collected.error) {
        None => {
            info!(
                "Filter complete: {} of {} candidates sensitive in {:?}",
                result.matched, result.processed, result.elapsed
            );
            result.stats.log_stats();
            Ok(result)
        }
        Some(error) => {
            warn!(
                "Filter stopped after {} candidates ({} sensitive): {}",
                result.processed, result.matched, error
            );
            Err(PipelineFailure {
                error,
                partial: result,
            })
        }
    }
}

/// Joins a scoped thread, re-raising its panic on the caller
fn join<T>(handle: ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Streams lines into the candidate queue; dropping `jobs` closes it
fn produce<I>(lines: I, jobs: Sender<String>, stop: &AtomicBool) -> FilterResult<u64>
where
    I: Iterator<Item = io::Result<String>>,
{
    let mut read = 0u64;
    for line in lines {
        if stop.load(Ordering::Acquire) {
            debug!("Producer stopping after {} lines", read);
            break;
        }
        let line = line.map_err(|e| FilterError::io(Stage::Producer, e))?;
        if jobs.send(line).is_err() {
            break;
        }
        read += 1;
    }
    debug!("Producer finished after {} lines", read);
    Ok(read)
}

/// Classifies candidates until the queue is closed and empty
fn work(
    id: usize,
    jobs: Receiver<String>,
    results: Sender<String>,
    rules: &RuleSet,
    stats: &StatsAggregator,
) -> u64 {
    let mut processed = 0u64;
    let mut matched = 0u64;

    for candidate in jobs.iter() {
        processed += 1;
        let verdict = classify(&candidate, rules);
        if !verdict.is_sensitive() {
            continue;
        }
        for rule_id in verdict.matched() {
            stats.record_match(rule_id);
        }
        matched += 1;
        if results.send(candidate).is_err() {
            break;
        }
    }

    debug!(
        "Worker {} finished: {} processed, {} sensitive",
        id, processed, matched
    );
    processed
}

/// Drains the result queue into the sink.
///
/// After the first write error nothing more is written, but the queue is
/// still drained so the workers can finish and every match is counted.
fn collect<S>(results: Receiver<String>, sink: &mut S, stop: &AtomicBool) -> Collected
where
    S: ResultSink + ?Sized,
{
    let mut collected = Collected::default();

    for candidate in results.iter() {
        collected.matched += 1;
        if collected.error.is_some() {
            continue;
        }
        match sink.write(&candidate) {
            Ok(()) => collected.written += 1,
            Err(e) => {
                warn!("Sink write failed, draining remaining results: {}", e);
                stop.store(true, Ordering::Release);
                collected.error = Some(FilterError::io(Stage::Collector, e));
            }
        }
    }

    if collected.error.is_none() {
        if let Err(e) = sink.finish() {
            collected.error = Some(FilterError::io(Stage::Collector, e));
        }
    }
    collected
}

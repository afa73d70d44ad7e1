use anyhow::Result;
use ghostfilter::{
    classify, run, FilterError, JsonSink, LineSink, PipelineOptions, ResultSink, RuleSet,
    Stage,
};
use std::collections::HashSet;
use std::io;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

fn options(workers: usize, queue_capacity: usize) -> PipelineOptions {
    PipelineOptions {
        workers: NonZeroUsize::new(workers).unwrap(),
        queue_capacity,
    }
}

fn test_rules() -> RuleSet {
    RuleSet::build(["admin", "login"], [r"(?i)/api\b"], ["png"]).unwrap()
}

fn generate_candidates(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| match i % 6 {
            0 => format!("https://example.test/admin/{}", i),
            1 => format!("https://example.test/static/admin/{}.png", i),
            2 => format!("https://example.test/api/v{}", i),
            3 => format!("https://example.test/blog/{}", i),
            4 => format!("https://example.test/Login?user={}", i),
            _ => format!("https://example.test/apiary/{}", i),
        })
        .collect()
}

fn as_lines(candidates: &[String]) -> Vec<io::Result<String>> {
    candidates.iter().cloned().map(Ok).collect()
}

/// Fails every write after the first `limit`
struct FailingSink {
    limit: usize,
    written: Vec<String>,
}

impl ResultSink for FailingSink {
    fn write(&mut self, candidate: &str) -> io::Result<()> {
        if self.written.len() >= self.limit {
            return Err(io::Error::other("disk full"));
        }
        self.written.push(candidate.to_string());
        Ok(())
    }
}

/// Sleeps on every write so the bounded queues fill up
struct SlowSink(Vec<String>);

impl ResultSink for SlowSink {
    fn write(&mut self, candidate: &str) -> io::Result<()> {
        thread::sleep(Duration::from_micros(50));
        self.0.push(candidate.to_string());
        Ok(())
    }
}

#[test]
fn test_sink_receives_exactly_the_sensitive_candidates() -> Result<()> {
    let rules = test_rules();
    let candidates = generate_candidates(3_000);
    let expected: HashSet<&str> = candidates
        .iter()
        .map(String::as_str)
        .filter(|c| classify(c, &rules).is_sensitive())
        .collect();

    for workers in [1, 3, 8] {
        let mut sink: Vec<String> = Vec::new();
        let result = run(as_lines(&candidates), &rules, &options(workers, 100), &mut sink)?;

        let received: HashSet<&str> = sink.iter().map(String::as_str).collect();
        assert_eq!(received, expected, "workers = {}", workers);
        assert_eq!(sink.len(), expected.len());
        assert_eq!(result.matched as usize, expected.len());
        assert_eq!(result.processed as usize, candidates.len());
    }
    Ok(())
}

#[test]
fn test_stress_identical_across_worker_counts() -> Result<()> {
    let rules = test_rules();
    let candidates = generate_candidates(100_000);

    let mut runs = Vec::new();
    for workers in [1, 4, 32] {
        let mut sink: Vec<String> = Vec::new();
        let result = run(as_lines(&candidates), &rules, &options(workers, 100), &mut sink)?;
        assert_eq!(sink.len() as u64, result.matched);
        runs.push(result);
    }

    let first = &runs[0];
    assert_eq!(first.processed, 100_000);
    // admin, api and login buckets; the .png and apiary buckets never match
    assert_eq!(first.matched, 50_000);
    assert_eq!(first.stats.get("admin"), Some(16_667));
    assert_eq!(first.stats.get("login"), Some(16_666));
    assert_eq!(first.stats.get(r"(?i)/api\b"), Some(16_667));
    for other in &runs[1..] {
        assert_eq!(other.processed, first.processed);
        assert_eq!(other.matched, first.matched);
        assert_eq!(other.stats, first.stats);
    }
    Ok(())
}

#[test]
fn test_no_lost_updates_for_single_rule() -> Result<()> {
    let rules = RuleSet::build(["secret"], [] as [&str; 0], [] as [&str; 0])?;
    let candidates: Vec<String> = (0..20_000).map(|i| format!("/secret/{}", i)).collect();

    let mut sink: Vec<String> = Vec::new();
    let result = run(as_lines(&candidates), &rules, &options(16, 8), &mut sink)?;

    assert_eq!(result.stats.get("secret"), Some(20_000));
    assert_eq!(result.stats.len(), 1);
    Ok(())
}

#[test]
fn test_slow_sink_with_tiny_queues_completes() -> Result<()> {
    let rules = test_rules();
    let candidates = generate_candidates(2_000);

    let mut sink = SlowSink(Vec::new());
    let result = run(as_lines(&candidates), &rules, &options(4, 1), &mut sink)?;

    assert_eq!(sink.0.len() as u64, result.matched);
    assert!(result.is_complete());
    Ok(())
}

#[test]
fn test_read_error_returns_partial_result() {
    let rules = test_rules();
    let mut lines: Vec<io::Result<String>> = as_lines(&generate_candidates(60));
    lines.push(Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "stream did not contain valid UTF-8",
    )));
    lines.extend(as_lines(&generate_candidates(60)));

    let mut sink: Vec<String> = Vec::new();
    let failure = run(lines, &rules, &options(4, 8), &mut sink).unwrap_err();
    let (error, partial) = failure.into_parts();

    assert_eq!(error.stage(), Some(Stage::Producer));
    // Lines queued before the error are still drained and counted
    assert_eq!(partial.processed, 60);
    assert_eq!(partial.matched, 30);
    assert_eq!(sink.len(), 30);
    assert_eq!(partial.stats.total(), 30);
}

#[test]
fn test_sink_error_drains_and_keeps_stats_consistent() {
    let rules = RuleSet::build(["admin"], [] as [&str; 0], [] as [&str; 0]).unwrap();
    let candidates: Vec<String> = (0..5_000).map(|i| format!("/admin/{}", i)).collect();

    let mut sink = FailingSink {
        limit: 3,
        written: Vec::new(),
    };
    let failure = run(as_lines(&candidates), &rules, &options(4, 4), &mut sink).unwrap_err();

    assert!(matches!(
        failure.error,
        FilterError::Io {
            stage: Stage::Collector,
            ..
        }
    ));
    let partial = &failure.partial;
    assert_eq!(partial.written, 3);
    assert_eq!(sink.written.len(), 3);
    assert!(!partial.is_complete());
    assert_eq!(partial.processed, partial.matched);
    assert_eq!(partial.stats.get("admin"), Some(partial.matched));
    assert!(partial.processed <= candidates.len() as u64);
}

#[test]
fn test_sink_error_stops_reading_input() {
    let rules = RuleSet::build(["admin"], [] as [&str; 0], [] as [&str; 0]).unwrap();
    let candidates: Vec<String> = (0..200_000).map(|i| format!("/admin/{}", i)).collect();
    let (workers, capacity) = (4, 4);

    let mut sink = FailingSink {
        limit: 0,
        written: Vec::new(),
    };
    let failure = run(
        as_lines(&candidates),
        &rules,
        &options(workers, capacity),
        &mut sink,
    )
    .unwrap_err();

    let partial = &failure.partial;
    assert_eq!(failure.error.stage(), Some(Stage::Collector));
    assert_eq!(partial.written, 0);
    // Only what was already queued or held by a worker gets classified
    let in_flight = (2 * capacity + workers + 32) as u64;
    assert!(
        partial.processed <= in_flight,
        "processed {} candidates after the sink failed",
        partial.processed
    );
    assert_eq!(partial.processed, partial.matched);
    assert_eq!(partial.stats.get("admin"), Some(partial.matched));
}

#[test]
fn test_text_and_json_sinks_end_to_end() -> Result<()> {
    let rules = test_rules();
    let input = ["/admin", "/logo.png", "/about"];
    let lines = || {
        input
            .iter()
            .map(|s| Ok(s.to_string()))
            .collect::<Vec<io::Result<String>>>()
    };

    let mut text = LineSink::new(Vec::new());
    run(lines(), &rules, &options(2, 10), &mut text)?;
    assert_eq!(String::from_utf8(text.into_inner())?, "/admin\n");

    let mut json = JsonSink::new(Vec::new());
    run(lines(), &rules, &options(2, 10), &mut json)?;
    let parsed: Vec<String> = serde_json::from_slice(&json.into_inner())?;
    assert_eq!(parsed, vec!["/admin"]);
    Ok(())
}

#[test]
fn test_boxed_sink() -> Result<()> {
    let rules = test_rules();
    let mut sink: Box<dyn ResultSink> = Box::new(LineSink::new(io::sink()));
    let result = run(
        vec![Ok("/api".to_string()), Ok("/home".to_string())],
        &rules,
        &options(2, 2),
        &mut sink,
    )?;
    assert_eq!(result.written, 1);
    Ok(())
}

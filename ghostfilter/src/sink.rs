//! Destinations for matched candidates and writers for the statistics
//! report.
//!
//! The pipeline only knows the [`ResultSink`] trait. Output encoding is a
//! sink concern: [`LineSink`] writes one candidate per line, [`JsonSink`]
//! streams an indented JSON array. Both write through the caller's writer
//! and never hold the whole result set in memory.
use std::io::{self, Write};

use crate::results::PipelineResult;
use crate::stats::RuleStats;

/// Receives sensitive candidates from the collector, one at a time
pub trait ResultSink {
    /// Writes one candidate
    fn write(&mut self, candidate: &str) -> io::Result<()>;

    /// Called once after the last candidate of a successful run
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn write(&mut self, candidate: &str) -> io::Result<()> {
        (**self).write(candidate)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

impl ResultSink for Vec<String> {
    fn write(&mut self, candidate: &str) -> io::Result<()> {
        self.push(candidate.to_string());
        Ok(())
    }
}

/// Plain text output, one candidate per line
#[derive(Debug)]
pub struct LineSink<W: Write> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for LineSink<W> {
    fn write(&mut self, candidate: &str) -> io::Result<()> {
        self.writer.write_all(candidate.as_bytes())?;
        self.writer.write_all(b"\n")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// A JSON array of strings, two-space indented, written incrementally
#[derive(Debug)]
pub struct JsonSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for JsonSink<W> {
    fn write(&mut self, candidate: &str) -> io::Result<()> {
        let separator: &[u8] = if self.written == 0 { b"[\n  " } else { b",\n  " };
        self.writer.write_all(separator)?;
        serde_json::to_writer(&mut self.writer, candidate)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        let closing: &[u8] = if self.written == 0 { b"[]\n" } else { b"\n]\n" };
        self.writer.write_all(closing)?;
        self.writer.flush()
    }
}

/// Writes `rule: count` lines, most frequent rule first
pub fn write_stats_text<W: Write>(stats: &RuleStats, mut writer: W) -> io::Result<()> {
    for (rule, count) in stats.ranked() {
        writeln!(writer, "{}: {}", rule, count)?;
    }
    writer.flush()
}

/// Writes the run summary with its per-rule counts as pretty JSON
pub fn write_stats_json<W: Write>(result: &PipelineResult, mut writer: W) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, result)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

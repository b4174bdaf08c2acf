//! Append-only CSV stats log

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::bench::StatsSink;
use crate::models::{IntervalStats, RunSummary};
use crate::{NetOrbError, Result};

pub const LOG_HEADER: &str = "timestamp,elapsed_secs,interval,ok_per_sec,ok_total,fail_total,bytes_total";

/// One CSV row per interval. Existing files are appended to; the header is
/// only written when the file starts out empty.
pub struct LogFileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogFileSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| sink_error(&path, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| sink_error(&path, e))?;
        let is_new = file.metadata().map_err(|e| sink_error(&path, e))?.len() == 0;

        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "{}", LOG_HEADER).map_err(|e| sink_error(&path, e))?;
            writer.flush().map_err(|e| sink_error(&path, e))?;
        }

        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatsSink for LogFileSink {
    fn name(&self) -> &str {
        "log-file"
    }

    fn record(&mut self, stats: &IntervalStats) -> Result<()> {
        let interval = if stats.final_flush {
            "final".to_string()
        } else {
            stats.index.to_string()
        };
        writeln!(
            self.writer,
            "{},{:.3},{},{:.2},{},{},{}",
            Utc::now().to_rfc3339(),
            stats.elapsed.as_secs_f64(),
            interval,
            stats.success_rate(),
            stats.totals.successes,
            stats.totals.failures,
            stats.totals.bytes,
        )
        .and_then(|_| self.writer.flush())
        .map_err(|e| sink_error(&self.path, e))
    }

    fn finish(&mut self, _summary: &RunSummary) -> Result<()> {
        self.writer.flush().map_err(|e| sink_error(&self.path, e))
    }
}

fn sink_error(path: &Path, err: std::io::Error) -> NetOrbError {
    NetOrbError::SinkError(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::CounterSnapshot;
    use std::time::Duration;
    use tempfile::TempDir;

    fn stats(index: u64, successes: u64, final_flush: bool) -> IntervalStats {
        let snapshot = CounterSnapshot {
            successes,
            failures: 2,
            bytes: 64,
            latency_nanos: 0,
        };
        IntervalStats {
            index,
            elapsed: Duration::from_secs(index),
            window: Duration::from_secs(1),
            delta: snapshot,
            totals: snapshot,
            final_flush,
        }
    }

    #[test]
    fn test_header_written_once_and_rows_appended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("stats.csv");

        let mut sink = LogFileSink::open(&path).unwrap();
        sink.record(&stats(1, 10, false)).unwrap();
        drop(sink);

        let mut sink = LogFileSink::open(&path).unwrap();
        sink.record(&stats(2, 20, true)).unwrap();
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LOG_HEADER);
        assert_eq!(lines.iter().filter(|l| **l == LOG_HEADER).count(), 1);

        let first: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(first.len(), 7);
        assert_eq!(first[2], "1");
        assert_eq!(first[3], "10.00");
        assert_eq!(&first[4..], &["10", "2", "64"]);

        let last: Vec<&str> = lines[2].split(',').collect();
        assert_eq!(last[2], "final");
    }

    #[test]
    fn test_unwritable_path_is_sink_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened for append
        let err = LogFileSink::open(dir.path()).err().expect("should fail");
        assert!(matches!(err, NetOrbError::SinkError(_)));
    }
}

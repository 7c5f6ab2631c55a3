//! Output sink (`SPEC_FULL.md` §2): the engine's required stdout/stderr
//! surfaces (`spec.md` §6), kept separate from diagnostic logging so that
//! `RUST_LOG` noise never contaminates the data the caller explicitly asked
//! for (progress lines, per-operation results, reject notices).

use std::io::{self, Write};

/// Where the engine's required progress/result/notification text goes.
/// A trait rather than a concrete `Stdout`/`Stderr` pair so tests can
/// capture it. `Send` so a `&mut dyn OutputSink` can be captured by the
/// bulk-modify entry handler, whose `EntryHandler` impl async_trait expands
/// to a `Send` future.
pub trait OutputSink: Send {
    fn progress(&mut self, line: &str);
    fn failure(&mut self, line: &str);
}

pub struct StdOutputSink;

impl OutputSink for StdOutputSink {
    fn progress(&mut self, line: &str) {
        println!("{}", line);
    }

    fn failure(&mut self, line: &str) {
        eprintln!("{}", line);
    }
}

/// An `OutputSink` that records lines instead of printing them, used by
/// the engine's own tests and by anything embedding the engine.
#[derive(Default)]
pub struct CapturingOutputSink {
    pub progress_lines: Vec<String>,
    pub failure_lines: Vec<String>,
}

impl OutputSink for CapturingOutputSink {
    fn progress(&mut self, line: &str) {
        self.progress_lines.push(line.to_owned());
    }

    fn failure(&mut self, line: &str) {
        self.failure_lines.push(line.to_owned());
    }
}

/// Flushes stdout; used right before computing the process exit code so
/// buffered progress lines are never lost if the process exits abruptly.
pub fn flush_stdout() -> io::Result<()> {
    io::stdout().flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capturing_sink_records_both_channels() {
        let mut sink = CapturingOutputSink::default();
        sink.progress("Adding entry uid=a,dc=x");
        sink.failure("could not read change record");
        assert_eq!(sink.progress_lines, vec!["Adding entry uid=a,dc=x"]);
        assert_eq!(sink.failure_lines, vec!["could not read change record"]);
    }
}

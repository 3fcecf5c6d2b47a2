//! Transcript and runtime value tracing.
//!
//! A session traced at [`TraceLevel::Log`] writes one line per emitted
//! operation to its [`TraceSink`]. At [`TraceLevel::Full`] the procedure
//! itself is augmented: every transcript line is replayed to the sink when
//! the procedure runs, and the value produced by each load (or consumed by
//! each store) is formatted and written after it.

use alloc::sync::Arc;
use core::fmt;
use std::sync::{Mutex, PoisonError};

use log::LevelFilter;

// -----------------------------------------------------------------------------
// TraceLevel

/// How much of a session is traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TraceLevel {
    #[default]
    Off,
    /// Line-numbered transcript of the emission calls.
    Log,
    /// Transcript plus runtime value dumps injected into the procedure.
    Full,
}

/// `Trace` enables full tracing, `Debug` the transcript only.
impl From<LevelFilter> for TraceLevel {
    fn from(level: LevelFilter) -> Self {
        match level {
            LevelFilter::Trace => Self::Full,
            LevelFilter::Debug => Self::Log,
            _ => Self::Off,
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.pad("off"),
            Self::Log => f.pad("log"),
            Self::Full => f.pad("full"),
        }
    }
}

// -----------------------------------------------------------------------------
// TraceSink

/// Destination of transcript lines and runtime dumps.
///
/// Runtime lines are written by running procedures, possibly from several
/// threads at once.
pub trait TraceSink: Send + Sync {
    /// Receives the transcript line numbered `line_no` while a session is
    /// being built.
    fn write_instruction(&self, line_no: u32, line: &str);

    /// Receives a line written by a running procedure.
    fn write_runtime(&self, line: &str);
}

/// Forwards everything to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LogSink {
    pub const TARGET: &'static str = "crs_emit::codegen";
}

impl TraceSink for LogSink {
    fn write_instruction(&self, line_no: u32, line: &str) {
        log::debug!(target: Self::TARGET, "{line_no:05}: {line}");
    }

    fn write_runtime(&self, line: &str) {
        log::trace!(target: Self::TARGET, "{line}");
    }
}

/// Collects every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    runtime: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcript lines, without their line numbers.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lines written by running procedures.
    pub fn runtime_lines(&self) -> Vec<String> {
        self.runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TraceSink for MemorySink {
    fn write_instruction(&self, _line_no: u32, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
    }

    fn write_runtime(&self, line: &str) {
        self.runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
    }
}

// -----------------------------------------------------------------------------
// EmitOptions

/// Per-session settings passed to [`begin_method`].
///
/// [`begin_method`]: crate::ProcedureBuilder::begin_method
#[derive(Clone)]
pub struct EmitOptions {
    pub trace: TraceLevel,
    pub sink: Arc<dyn TraceSink>,
}

impl EmitOptions {
    #[must_use]
    pub fn with_trace(mut self, trace: TraceLevel) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The level a session actually runs at: always `Off` when the crate is
    /// built without the `trace` feature.
    #[inline]
    pub(crate) fn effective_trace(&self) -> TraceLevel {
        if cfg!(feature = "trace") {
            self.trace
        } else {
            TraceLevel::Off
        }
    }
}

/// Traces at the level implied by [`log::max_level`] into a [`LogSink`].
impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            trace: TraceLevel::from(log::max_level()),
            sink: Arc::new(LogSink),
        }
    }
}

impl fmt::Debug for EmitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitOptions")
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{EmitOptions, MemorySink, TraceLevel, TraceSink};
    use log::LevelFilter;

    #[test]
    fn level_from_filter() {
        assert_eq!(TraceLevel::from(LevelFilter::Trace), TraceLevel::Full);
        assert_eq!(TraceLevel::from(LevelFilter::Debug), TraceLevel::Log);
        assert_eq!(TraceLevel::from(LevelFilter::Warn), TraceLevel::Off);
    }

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.write_instruction(1, "a");
        sink.write_instruction(2, "b");
        sink.write_runtime("r");
        assert_eq!(sink.lines(), ["a", "b"]);
        assert_eq!(sink.runtime_lines(), ["r"]);
    }

    #[test]
    fn options_builder() {
        let options = EmitOptions::default().with_trace(TraceLevel::Full);
        assert_eq!(options.trace, TraceLevel::Full);
        #[cfg(feature = "trace")]
        assert_eq!(options.effective_trace(), TraceLevel::Full);
    }
}

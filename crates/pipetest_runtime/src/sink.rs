//! Line-oriented output sinks.
//!
//! The evaluator never prints: hook `print` statements and verbose
//! progress go to an injected output sink, assertion pass/fail lines to
//! an assertion sink. Tests capture lines with [`BufferSink`]; the CLI
//! wires stdout.

/// Receives one line of evaluator output at a time.
pub trait LogSink {
    fn line(&mut self, text: &str);
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub lines: Vec<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogSink for BufferSink {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn line(&mut self, _text: &str) {}
}

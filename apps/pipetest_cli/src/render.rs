//! Console rendering of diagnostics with source context.

use std::collections::HashMap;
use std::fs;

use pipetest_base::Diagnostic;

/// Lazily-read source cache for underline rendering.
#[derive(Default)]
pub struct SourceCache {
    files: HashMap<String, Option<String>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn source(&mut self, path: &str) -> Option<&str> {
        self.files
            .entry(path.to_string())
            .or_insert_with(|| fs::read_to_string(path).ok())
            .as_deref()
    }

    /// `file:line:col CODE: message`, with the offending line and a
    /// caret underline when the source is readable.
    pub fn render(&mut self, diag: &Diagnostic) -> String {
        let mut out = format!(
            "{}:{}:{}: {}: {}",
            diag.file, diag.line, diag.column, diag.code, diag.message
        );

        if diag.line > 0 {
            if let Some(source) = self.source(&diag.file) {
                if let Some(line_text) = source.lines().nth(diag.line as usize - 1) {
                    let column = (diag.column as usize).saturating_sub(1);
                    let caret = " ".repeat(column);
                    out.push_str(&format!("\n  | {}\n  | {}^", line_text, caret));
                }
            }
        }
        if !diag.hint.is_empty() {
            out.push_str(&format!("\n  = help: {}", diag.hint));
        }
        if let Some(related) = &diag.related {
            out.push_str(&format!(
                "\n  = note: {} ({}:{}:{})",
                related.message, related.file, related.line, related.column
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipetest_base::{Code, Pos, Span};

    #[test]
    fn renders_locator_code_and_hint_without_source() {
        let span = Span::new(Pos::new(0, 3, 5), Pos::new(1, 3, 6));
        let diag = Diagnostic::error(Code::SemUndefinedVariable, "undefined variable 'x'", "missing-file.pt", span)
            .with_hint("define it first");
        let text = SourceCache::new().render(&diag);
        assert!(text.contains("missing-file.pt:3:5"));
        assert!(text.contains("E_SEM_UNDEFINED_VARIABLE"));
        assert!(text.contains("help: define it first"));
    }
}

use crate::ast::SourceMap;
use super::{Diagnostic, Severity};

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn bold(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_red(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;31m{s}\x1b[0m") } else { s.to_string() }
    }

    fn cyan(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[36m{s}\x1b[0m") } else { s.to_string() }
    }

    fn dim(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[2m{s}\x1b[0m") } else { s.to_string() }
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        // "error[K-P005]: message"
        let severity = match d.severity {
            Severity::Error => "error",
        };
        let head = match d.code {
            Some(code) => format!("{severity}[{code}]"),
            None => severity.to_string(),
        };
        out.push_str(&format!("{}: {}\n", self.bold_red(&head), self.bold(&d.message)));

        let primary = d.labels.iter().find(|l| l.is_primary);
        match (primary, &d.source) {
            (Some(label), Some(source)) => {
                let map = SourceMap::new(source);
                let (line, col) = map.lookup(label.span.start);
                out.push_str(&format!("  {} {}:{}\n", self.cyan("-->"), line, col));

                let span_len = label.span.end.saturating_sub(label.span.start).max(1);
                let carets = self.bold_red(&"^".repeat(span_len));
                let indent = " ".repeat(col.saturating_sub(1));
                let marker = if label.message.is_empty() {
                    format!("{indent}{carets}")
                } else {
                    format!("{indent}{carets} {}", self.bold_red(&label.message))
                };
                self.snippet(&mut out, line, map.line_text(source, line), Some(&marker));
            }
            (None, Some(source)) if d.line.is_some() => {
                let line = d.line.unwrap_or(1) as usize;
                let map = SourceMap::new(source);
                out.push_str(&format!("  {} line {}\n", self.cyan("-->"), line));
                self.snippet(&mut out, line, map.line_text(source, line), None);
            }
            _ => {
                if let Some(line) = d.line {
                    out.push_str(&format!("  {} line {}\n", self.cyan("-->"), line));
                }
            }
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} suggestion: {}\n", self.dim("="), suggestion));
        }

        out
    }

    /// Gutter, the source line, and an optional marker line beneath it.
    fn snippet(&self, out: &mut String, line: usize, text: &str, marker: Option<&str>) {
        let gutter = line.to_string().len();
        let pipe = self.cyan("|");
        let pad = " ".repeat(gutter);
        let line_num = self.cyan(&format!("{line:>gutter$}"));

        out.push_str(&format!("{pad} {pipe}\n"));
        out.push_str(&format!("{line_num} {pipe} {text}\n"));
        if let Some(marker) = marker {
            out.push_str(&format!("{pad} {pipe} {marker}\n"));
        }
        out.push_str(&format!("{pad} {pipe}\n"));
    }
}

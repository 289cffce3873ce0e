use super::Span;

/// Maps byte offsets to line/column positions within source text.
pub struct SourceMap {
    line_starts: Vec<usize>,
    len: usize,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        SourceMap { line_starts, len: source.len() }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Returns (line, col), both 1-based.
    pub fn lookup(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let col = offset.saturating_sub(self.line_starts[line]);
        (line + 1, col + 1)
    }

    /// 1-based line holding `offset`.
    pub fn line_of(&self, offset: usize) -> u32 {
        self.lookup(offset).0 as u32
    }

    /// Byte span of a 1-based line, newline excluded.
    pub fn line_span(&self, line: usize) -> Option<Span> {
        if line == 0 || line > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[line - 1];
        let end = match self.line_starts.get(line) {
            Some(next) => next - 1,
            None => self.len,
        };
        Some(Span { start, end })
    }

    /// Returns the full text of the given 1-based line number.
    pub fn line_text<'a>(&self, source: &'a str, line: usize) -> &'a str {
        match self.line_span(line) {
            Some(span) => source.get(span.start..span.end).unwrap_or("").trim_end_matches('\r'),
            None => "",
        }
    }
}

#![forbid(unsafe_code)]

use crate::Span;

/// Byte offset → line/column lookup for one source text.
#[derive(Clone, Debug)]
pub struct LineIndex {
    pub file_name: String,
    line_starts: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCol {
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub col: u32,
}

impl std::fmt::Display for LineCol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl LineIndex {
    pub fn new(file_name: impl Into<String>, text: &str) -> Self {
        let mut line_starts: Vec<usize> = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            file_name: file_name.into(),
            line_starts,
        }
    }

    pub fn line_col(&self, span: Span) -> LineCol {
        let off: usize = span.offset();

        // Find the last line start <= off.
        let line_idx = match self.line_starts.binary_search(&off) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };

        let line_start = self.line_starts.get(line_idx).copied().unwrap_or(0);
        let col0 = off.saturating_sub(line_start);

        LineCol {
            line: (line_idx as u32) + 1,
            col: (col0 as u32) + 1,
        }
    }

    /// `file:line:col` for a span.
    pub fn location(&self, span: Span) -> String {
        format!("{}:{}", self.file_name, self.line_col(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span;

    #[test]
    fn line_col_is_one_based() {
        let idx = LineIndex::new("a.ts", "let a = 1;\nlet b = 2;\n");
        assert_eq!(idx.line_col(span(0, 1)), LineCol { line: 1, col: 1 });
        assert_eq!(idx.line_col(span(15, 1)), LineCol { line: 2, col: 5 });
        assert_eq!(idx.location(span(11, 3)), "a.ts:2:1");
    }
}

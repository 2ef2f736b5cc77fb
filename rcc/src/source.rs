//! Source file registry mapping byte offsets to human-readable locations

use crate::ast::{FileId, Span};

/// 1-based line/column position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
}

struct SourceFile {
    name: String,
    text: String,
    /// Byte offset of the start of each line
    line_starts: Vec<usize>,
}

/// Owns the text of every file in a compilation and resolves spans
#[derive(Default)]
pub struct SourceManager {
    files: Vec<SourceFile>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let text = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        self.files.push(SourceFile {
            name: name.into(),
            text,
            line_starts,
        });
        (self.files.len() - 1) as FileId
    }

    pub fn filename(&self, file: FileId) -> &str {
        &self.files[file as usize].name
    }

    pub fn text(&self, file: FileId) -> &str {
        &self.files[file as usize].text
    }

    /// Map a byte offset to its 1-based line and column
    pub fn to_line_col(&self, file: FileId, offset: usize) -> LineCol {
        let f = &self.files[file as usize];
        let line_idx = match f.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        LineCol {
            line: line_idx + 1,
            column: offset - f.line_starts[line_idx] + 1,
        }
    }

    /// The text of a 1-based line, without its trailing newline
    pub fn line_text(&self, file: FileId, line: usize) -> &str {
        let f = &self.files[file as usize];
        let start = f.line_starts[line - 1];
        let end = f
            .line_starts
            .get(line)
            .map(|&next| next)
            .unwrap_or(f.text.len());
        f.text[start..end].trim_end_matches(['\n', '\r'])
    }

    pub fn span_text(&self, span: Span) -> &str {
        &self.files[span.file as usize].text[span.start..span.end]
    }
}

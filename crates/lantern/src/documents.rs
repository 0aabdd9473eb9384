//
// documents.rs
//
// Open-buffer tracking for completion, definition, and diagnostics.
//

use dashmap::DashMap;
use ropey::Rope;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};

pub struct Document {
    pub contents: Rope,
    pub version: Option<i32>,
    /// Monotonic edit counter, used to discard superseded diagnostic passes.
    pub revision: u64,
}

impl Document {
    pub fn new(text: &str, version: Option<i32>) -> Self {
        Self {
            contents: Rope::from_str(text),
            version,
            revision: 0,
        }
    }

    pub fn apply_change(&mut self, change: TextDocumentContentChangeEvent) {
        if let Some(range) = change.range {
            let start_line = range.start.line as usize;
            let end_line = range.end.line as usize;
            if start_line >= self.contents.len_lines() || end_line >= self.contents.len_lines() {
                // Out-of-range edit: fall back to full replacement.
                self.contents = Rope::from_str(&change.text);
            } else {
                let start_line_text = self.contents.line(start_line).to_string();
                let end_line_text = self.contents.line(end_line).to_string();
                let start_char =
                    utf16_to_char_offset(&start_line_text, range.start.character as usize);
                let end_char = utf16_to_char_offset(&end_line_text, range.end.character as usize);

                let start_idx = self.contents.line_to_char(start_line) + start_char;
                let end_idx = self.contents.line_to_char(end_line) + end_char;

                self.contents.remove(start_idx..end_idx);
                self.contents.insert(start_idx, &change.text);
            }
        } else {
            // Full document sync
            self.contents = Rope::from_str(&change.text);
        }
        self.revision += 1;
    }

    pub fn text(&self) -> String {
        self.contents.to_string()
    }

    /// Text of one line, without the trailing newline.
    pub fn line_text(&self, line: usize) -> Option<String> {
        if line >= self.contents.len_lines() {
            return None;
        }
        let text = self.contents.line(line).to_string();
        Some(text.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Cursor position as a character offset into its line.
    pub fn char_offset_at(&self, position: Position) -> Option<usize> {
        let line = self.line_text(position.line as usize)?;
        Some(utf16_to_char_offset(&line, position.character as usize))
    }
}

/// Concurrent open-document store keyed by URI.
#[derive(Default)]
pub struct DocumentStore {
    docs: DashMap<Url, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, uri: Url, text: &str, version: Option<i32>) {
        self.docs.insert(uri, Document::new(text, version));
    }

    pub fn close(&self, uri: &Url) {
        self.docs.remove(uri);
    }

    pub fn apply_changes(
        &self,
        uri: &Url,
        version: Option<i32>,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Option<u64> {
        let mut doc = self.docs.get_mut(uri)?;
        for change in changes {
            doc.apply_change(change);
        }
        doc.version = version;
        Some(doc.revision)
    }

    pub fn revision(&self, uri: &Url) -> Option<u64> {
        self.docs.get(uri).map(|d| d.revision)
    }

    pub fn text(&self, uri: &Url) -> Option<String> {
        self.docs.get(uri).map(|d| d.text())
    }

    pub fn line_at(&self, uri: &Url, position: Position) -> Option<(String, usize)> {
        let doc = self.docs.get(uri)?;
        let line = doc.line_text(position.line as usize)?;
        let cursor = utf16_to_char_offset(&line, position.character as usize);
        Some((line, cursor))
    }
}

/// Convert a character offset within a line to an LSP UTF-16 column.
pub fn char_to_utf16_offset(line_text: &str, char_offset: usize) -> usize {
    line_text
        .chars()
        .take(char_offset)
        .map(|ch| ch.len_utf16())
        .sum()
}

/// Convert an LSP UTF-16 column to a character offset within a line.
pub fn utf16_to_char_offset(line_text: &str, utf16_offset: usize) -> usize {
    let mut utf16_count = 0;
    let mut char_count = 0;
    for ch in line_text.chars() {
        if utf16_count >= utf16_offset {
            return char_count;
        }
        utf16_count += ch.len_utf16();
        char_count += 1;
    }
    char_count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri() -> Url {
        Url::parse("file:///tmp/test.php").unwrap()
    }

    #[test]
    fn test_open_and_read_line() {
        let store = DocumentStore::new();
        store.open(uri(), "line one\nline two\n", Some(1));
        let (line, cursor) = store
            .line_at(&uri(), Position::new(1, 4))
            .unwrap();
        assert_eq!(line, "line two");
        assert_eq!(cursor, 4);
    }

    #[test]
    fn test_incremental_edit() {
        let store = DocumentStore::new();
        store.open(uri(), "view('welcome')", Some(1));
        let change = TextDocumentContentChangeEvent {
            range: Some(tower_lsp::lsp_types::Range {
                start: Position::new(0, 6),
                end: Position::new(0, 13),
            }),
            range_length: None,
            text: "home".to_string(),
        };
        let revision = store.apply_changes(&uri(), Some(2), vec![change]).unwrap();
        assert_eq!(revision, 1);
        assert_eq!(store.text(&uri()).unwrap(), "view('home')");
    }

    #[test]
    fn test_full_sync_replaces_contents() {
        let store = DocumentStore::new();
        store.open(uri(), "old", Some(1));
        let change = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "entirely new".to_string(),
        };
        store.apply_changes(&uri(), Some(2), vec![change]);
        assert_eq!(store.text(&uri()).unwrap(), "entirely new");
    }

    #[test]
    fn test_utf16_offset_with_wide_chars() {
        // '€' is one UTF-16 unit; '𐍈' is two.
        assert_eq!(utf16_to_char_offset("€abc", 2), 2);
        assert_eq!(utf16_to_char_offset("𐍈abc", 3), 2);
        assert_eq!(utf16_to_char_offset("abc", 10), 3);
    }

    #[test]
    fn test_close_removes_document() {
        let store = DocumentStore::new();
        store.open(uri(), "x", None);
        store.close(&uri());
        assert!(store.text(&uri()).is_none());
    }
}

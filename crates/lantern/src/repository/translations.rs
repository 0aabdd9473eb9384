//
// repository/translations.rs
//
// Translation keys from a recursive walk of the language directories.
// Merges two key spaces: grouped keys from PHP array files (`group.key`)
// and flat keys from per-locale JSON files. The first occurrence of a key
// wins across locales and files (locale precedence).
//

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::Fault;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

#[derive(Debug, Clone)]
pub struct TranslationRecord {
    /// `group.key` for PHP files, the literal key for JSON files.
    pub key: String,
    pub value: String,
    pub locale: String,
    pub path: PathBuf,
    /// Zero-based line of the key in its source file.
    pub line: u32,
}

impl NamedRecord for TranslationRecord {
    fn name(&self) -> &str {
        &self.key
    }
}

pub struct TranslationRepository {
    core: RepoCore<TranslationRecord>,
    root: PathBuf,
}

impl TranslationRepository {
    pub fn new(project_root: &Path) -> Self {
        Self {
            core: RepoCore::new(
                "translations",
                CollisionPolicy::FirstWins,
                Duration::from_secs(600),
            ),
            root: project_root.to_path_buf(),
        }
    }

    async fn acquire(&self) -> Result<Vec<TranslationRecord>, Fault> {
        // Laravel 9+ keeps translations in lang/; older projects under
        // resources/lang. Scan whichever exist, in that precedence order.
        let candidates = [
            self.root.join("lang"),
            self.root.join("resources").join("lang"),
        ];
        let existing: Vec<&PathBuf> = candidates.iter().filter(|d| d.is_dir()).collect();
        if existing.is_empty() {
            return Err(Fault::Filesystem("no language directory found".into()));
        }

        let mut records = Vec::new();
        for dir in existing {
            scan_lang_dir(dir, &mut records);
        }
        Ok(records)
    }

    pub fn find_by_key(&self, key: &str) -> Option<TranslationRecord> {
        self.core.find_by_name(key)
    }

    pub fn search(&self, prefix: &str) -> Vec<TranslationRecord> {
        self.core.search(prefix)
    }
}

fn scan_lang_dir(lang_dir: &Path, records: &mut Vec<TranslationRecord>) {
    for entry in WalkDir::new(lang_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(lang_dir) else {
            continue;
        };
        let rel_str = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");

        if let Some(locale) = rel_str.strip_suffix(".json") {
            // Flat key space: lang/{locale}.json
            if !locale.contains('/') {
                scan_json_file(path, locale, records);
            }
        } else if let Some(stem) = rel_str.strip_suffix(".php") {
            // Grouped key space: lang/{locale}/{group}.php
            let Some((locale, group)) = stem.split_once('/') else {
                continue;
            };
            scan_php_group_file(path, locale, group, records);
        }
    }
}

fn scan_json_file(path: &Path, locale: &str, records: &mut Vec<TranslationRecord>) {
    let Ok(text) = std::fs::read_to_string(path) else {
        return;
    };
    let Ok(map) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&text) else {
        log::warn!("Skipping malformed translation file: {}", path.display());
        return;
    };
    for (key, value) in map {
        let line = text
            .lines()
            .position(|l| l.contains(&format!("\"{key}\"")))
            .unwrap_or(0) as u32;
        records.push(TranslationRecord {
            value: value.as_str().map(String::from).unwrap_or_else(|| value.to_string()),
            key,
            locale: locale.to_string(),
            path: path.to_path_buf(),
            line,
        });
    }
}

fn scan_php_group_file(path: &Path, locale: &str, group: &str, records: &mut Vec<TranslationRecord>) {
    let Ok(source) = std::fs::read_to_string(path) else {
        return;
    };
    for entry in flatten_php_array(&source) {
        records.push(TranslationRecord {
            key: format!("{group}.{}", entry.key),
            value: entry.value,
            locale: locale.to_string(),
            path: path.to_path_buf(),
            line: entry.line,
        });
    }
}

#[derive(Debug, PartialEq)]
struct FlatEntry {
    key: String,
    value: String,
    line: u32,
}

struct Level {
    key: Option<String>,
}

fn join_key(levels: &[Level], key: &str) -> String {
    let mut parts: Vec<&str> = levels.iter().filter_map(|l| l.key.as_deref()).collect();
    parts.push(key);
    parts.join(".")
}

/// Flatten the keys of a PHP return-array file into dotted paths.
///
/// Lexical scan, not a PHP parser: tracks quote state, comments, and bracket
/// nesting. A quoted string followed by `=>` is a key; the next scalar is
/// its value; `[` after `=>` descends one level. Unkeyed list items are
/// skipped, and non-string values are captured as raw text.
fn flatten_php_array(source: &str) -> Vec<FlatEntry> {
    #[derive(PartialEq, Clone, Copy)]
    enum Mode {
        Normal,
        Single,
        Double,
        LineComment,
        BlockComment,
    }

    let mut out: Vec<FlatEntry> = Vec::new();
    let mut mode = Mode::Normal;
    let mut levels: Vec<Level> = Vec::new();
    let mut literal = String::new();
    let mut last_string: Option<(String, u32)> = None;
    let mut pending: Option<(String, u32)> = None;
    let mut raw = String::new();
    let mut line: u32 = 0;

    let flush = |out: &mut Vec<FlatEntry>,
                 levels: &[Level],
                 pending: &mut Option<(String, u32)>,
                 raw: &mut String| {
        if let Some((key, key_line)) = pending.take() {
            let value = raw.trim().to_string();
            out.push(FlatEntry {
                key: join_key(levels, &key),
                value,
                line: key_line,
            });
        }
        raw.clear();
    };

    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '\n' {
            line += 1;
        }
        match mode {
            Mode::Single | Mode::Double => {
                let close = if mode == Mode::Single { '\'' } else { '"' };
                if ch == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        literal.push(next);
                        i += 2;
                        continue;
                    }
                } else if ch == close {
                    mode = Mode::Normal;
                    let completed = std::mem::take(&mut literal);
                    match pending.take() {
                        Some((key, key_line)) if raw.trim().is_empty() => {
                            // The completed string is this key's value.
                            out.push(FlatEntry {
                                key: join_key(&levels, &key),
                                value: completed,
                                line: key_line,
                            });
                            last_string = None;
                        }
                        Some(kept) => {
                            // Part of a concatenated value; keep it raw.
                            raw.push_str(&completed);
                            pending = Some(kept);
                        }
                        None => {
                            last_string = Some((completed, line));
                        }
                    }
                } else {
                    literal.push(ch);
                }
            }
            Mode::LineComment => {
                if ch == '\n' {
                    mode = Mode::Normal;
                }
            }
            Mode::BlockComment => {
                if ch == '*' && chars.get(i + 1) == Some(&'/') {
                    mode = Mode::Normal;
                    i += 2;
                    continue;
                }
            }
            Mode::Normal => match ch {
                '\'' => {
                    mode = Mode::Single;
                    literal.clear();
                }
                '"' => {
                    mode = Mode::Double;
                    literal.clear();
                }
                '/' if chars.get(i + 1) == Some(&'/') => mode = Mode::LineComment,
                '/' if chars.get(i + 1) == Some(&'*') => {
                    mode = Mode::BlockComment;
                    i += 2;
                    continue;
                }
                '#' => mode = Mode::LineComment,
                '=' if chars.get(i + 1) == Some(&'>') => {
                    pending = last_string.take();
                    raw.clear();
                    i += 2;
                    continue;
                }
                '[' => {
                    levels.push(Level {
                        key: pending.take().map(|(k, _)| k),
                    });
                    raw.clear();
                }
                ']' => {
                    flush(&mut out, &levels, &mut pending, &mut raw);
                    levels.pop();
                }
                ',' => {
                    flush(&mut out, &levels, &mut pending, &mut raw);
                    last_string = None;
                }
                _ => {
                    if pending.is_some() && (!ch.is_whitespace() || !raw.is_empty()) {
                        raw.push(ch);
                    }
                }
            },
        }
        i += 1;
    }
    flush(&mut out, &levels, &mut pending, &mut raw);
    out
}

#[async_trait]
impl Repository for TranslationRepository {
    fn label(&self) -> &'static str {
        self.core.label()
    }

    async fn load(&self) {
        run_load(&self.core, || self.acquire()).await;
    }

    async fn reload(&self) {
        run_reload(&self.core, || self.acquire()).await;
    }

    fn count(&self) -> usize {
        self.core.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_flatten_simple_pairs() {
        let source = r#"<?php
return [
    'failed' => 'These credentials do not match our records.',
    'throttle' => 'Too many login attempts.',
];
"#;
        let entries = flatten_php_array(source);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "failed");
        assert_eq!(entries[0].value, "These credentials do not match our records.");
        assert_eq!(entries[0].line, 2);
        assert_eq!(entries[1].key, "throttle");
    }

    #[test]
    fn test_flatten_nested_arrays() {
        let source = r#"<?php
return [
    'password' => [
        'reset' => 'Your password has been reset.',
        'rules' => [
            'min' => 'Too short.',
        ],
    ],
    'sent' => 'Link sent.',
];
"#;
        let entries = flatten_php_array(source);
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["password.reset", "password.rules.min", "sent"]);
    }

    #[test]
    fn test_flatten_skips_comments_and_handles_escapes() {
        let source = r#"<?php
return [
    // 'ghost' => 'never parsed',
    /* 'phantom' => 'also never', */
    'quote' => 'it\'s fine',
];
"#;
        let entries = flatten_php_array(source);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "quote");
        assert_eq!(entries[0].value, "it's fine");
    }

    #[test]
    fn test_flatten_captures_non_string_values_raw() {
        let source = "<?php\nreturn [\n'limit' => 5,\n'expire' => 60 * 24,\n];\n";
        let entries = flatten_php_array(source);
        assert_eq!(entries[0].value, "5");
        assert_eq!(entries[1].value, "60 * 24");
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let write = |rel: &str, contents: &str| {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        };
        write(
            "lang/en/auth.php",
            "<?php\nreturn ['failed' => 'Bad credentials.'];\n",
        );
        write(
            "lang/fr/auth.php",
            "<?php\nreturn ['failed' => 'Identifiants incorrects.'];\n",
        );
        write("lang/en.json", "{\n  \"Welcome\": \"Welcome!\"\n}\n");
        dir
    }

    #[tokio::test]
    async fn test_first_occurrence_wins_across_locales() {
        let dir = fixture();
        let repo = TranslationRepository::new(dir.path());
        repo.load().await;
        // en sorts before fr; the en value is kept.
        let record = repo.find_by_key("auth.failed").unwrap();
        assert_eq!(record.locale, "en");
        assert_eq!(record.value, "Bad credentials.");
    }

    #[tokio::test]
    async fn test_grouped_and_json_key_spaces_merge() {
        let dir = fixture();
        let repo = TranslationRepository::new(dir.path());
        repo.load().await;
        assert!(repo.find_by_key("auth.failed").is_some());
        let flat = repo.find_by_key("Welcome").unwrap();
        assert_eq!(flat.value, "Welcome!");
        assert_eq!(flat.line, 1);
    }

    #[tokio::test]
    async fn test_missing_lang_dir_is_filesystem_fault() {
        let dir = tempfile::tempdir().unwrap();
        let repo = TranslationRepository::new(dir.path());
        repo.load().await;
        assert_eq!(repo.count(), 0);
    }
}

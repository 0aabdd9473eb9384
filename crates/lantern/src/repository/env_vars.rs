//
// repository/env_vars.rs
//
// Environment variables from the project's .env file. Quoted values keep
// their content verbatim (no inline-comment stripping); unquoted values are
// truncated at ` #`. When .env is missing, keys from .env.example are
// served instead so completions survive fresh checkouts.
//

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Fault;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

#[derive(Debug, Clone)]
pub struct EnvVarRecord {
    pub key: String,
    pub value: String,
    /// Zero-based line in the source file.
    pub line: u32,
    /// True when the record came from .env.example rather than .env.
    pub from_example: bool,
}

impl NamedRecord for EnvVarRecord {
    fn name(&self) -> &str {
        &self.key
    }
}

pub struct EnvVarRepository {
    core: RepoCore<EnvVarRecord>,
    root: PathBuf,
}

impl EnvVarRepository {
    pub fn new(project_root: &Path) -> Self {
        Self {
            // dotenv semantics: the first definition of a key is the one
            // the application sees.
            core: RepoCore::new("env vars", CollisionPolicy::FirstWins, Duration::from_secs(300)),
            root: project_root.to_path_buf(),
        }
    }

    async fn acquire(&self) -> Result<Vec<EnvVarRecord>, Fault> {
        let env_path = self.root.join(".env");
        if let Ok(text) = std::fs::read_to_string(&env_path) {
            return Ok(parse_env(&text, false));
        }

        let example_path = self.root.join(".env.example");
        match std::fs::read_to_string(&example_path) {
            Ok(text) => {
                log::info!(".env missing, falling back to .env.example");
                Ok(parse_env(&text, true))
            }
            Err(_) => Err(Fault::Filesystem(format!(
                "neither {} nor {} is readable",
                env_path.display(),
                example_path.display()
            ))),
        }
    }

    pub fn find_by_key(&self, key: &str) -> Option<EnvVarRecord> {
        self.core.find_by_name(key)
    }

    pub fn search(&self, prefix: &str) -> Vec<EnvVarRecord> {
        self.core.search(prefix)
    }
}

fn parse_env(text: &str, from_example: bool) -> Vec<EnvVarRecord> {
    text.lines()
        .enumerate()
        .filter_map(|(line, raw)| {
            let (key, value) = parse_env_line(raw)?;
            Some(EnvVarRecord {
                key,
                value,
                line: line as u32,
                from_example,
            })
        })
        .collect()
}

/// Parse one `KEY=VALUE` line. Returns `None` for blanks, comments, and
/// lines without `=`.
fn parse_env_line(raw: &str) -> Option<(String, String)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim_start();

    let (key, rest) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    Some((key.to_string(), parse_env_value(rest.trim())))
}

fn parse_env_value(rest: &str) -> String {
    let mut chars = rest.chars();
    match chars.next() {
        // Quotes suppress inline-comment stripping; everything up to the
        // matching close quote is the value.
        Some(quote @ ('"' | '\'')) => {
            let inner: String = chars.collect();
            match inner.find(quote) {
                Some(close) => inner[..close].to_string(),
                None => inner,
            }
        }
        _ => {
            let unquoted = match rest.find(" #") {
                Some(at) => &rest[..at],
                None => rest,
            };
            unquoted.trim().to_string()
        }
    }
}

#[async_trait]
impl Repository for EnvVarRepository {
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
    fn test_quoted_value_preserves_hash() {
        let (key, value) = parse_env_line(r##"API_KEY="abc#def""##).unwrap();
        assert_eq!(key, "API_KEY");
        assert_eq!(value, "abc#def");
    }

    #[test]
    fn test_unquoted_value_strips_inline_comment() {
        let (key, value) = parse_env_line("DEBUG=true # toggle").unwrap();
        assert_eq!(key, "DEBUG");
        assert_eq!(value, "true");
    }

    #[test]
    fn test_single_quoted_value() {
        let (_, value) = parse_env_line("MAIL_FROM='no-reply # internal'").unwrap();
        assert_eq!(value, "no-reply # internal");
    }

    #[test]
    fn test_empty_and_comment_lines_skipped() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("   ").is_none());
        assert!(parse_env_line("# A comment").is_none());
        assert!(parse_env_line("not a pair").is_none());
    }

    #[test]
    fn test_export_prefix_and_empty_value() {
        let (key, value) = parse_env_line("export APP_ENV=local").unwrap();
        assert_eq!(key, "APP_ENV");
        assert_eq!(value, "local");
        let (_, value) = parse_env_line("APP_KEY=").unwrap();
        assert_eq!(value, "");
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(parse_env_line("BAD KEY=1").is_none());
    }

    #[tokio::test]
    async fn test_first_occurrence_wins_for_duplicate_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "APP_ENV=local\nAPP_ENV=production\n").unwrap();
        let repo = EnvVarRepository::new(dir.path());
        repo.load().await;
        assert_eq!(repo.find_by_key("APP_ENV").unwrap().value, "local");
    }

    #[tokio::test]
    async fn test_example_fallback_when_env_missing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env.example"), "APP_NAME=Laravel\nAPP_KEY=\n").unwrap();
        let repo = EnvVarRepository::new(dir.path());
        repo.load().await;
        assert_eq!(repo.count(), 2);
        assert!(repo.find_by_key("APP_NAME").unwrap().from_example);
    }

    #[tokio::test]
    async fn test_env_preferred_over_example() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "APP_NAME=Real\n").unwrap();
        fs::write(dir.path().join(".env.example"), "APP_NAME=Laravel\nEXTRA=1\n").unwrap();
        let repo = EnvVarRepository::new(dir.path());
        repo.load().await;
        assert_eq!(repo.count(), 1);
        assert!(!repo.find_by_key("APP_NAME").unwrap().from_example);
    }
}

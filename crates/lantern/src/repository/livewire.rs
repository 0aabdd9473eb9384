//
// repository/livewire.rs
//
// Livewire component tags from a walk of app/Livewire (and the legacy
// app/Http/Livewire location).
//

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::Fault;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

#[derive(Debug, Clone)]
pub struct LivewireRecord {
    /// Tag name as written after `<livewire:` or in `@livewire`, e.g.
    /// `admin.user-table`.
    pub name: String,
    pub class: String,
    pub path: PathBuf,
}

impl NamedRecord for LivewireRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct LivewireRepository {
    core: RepoCore<LivewireRecord>,
    root: PathBuf,
}

impl LivewireRepository {
    pub fn new(project_root: &Path) -> Self {
        Self {
            core: RepoCore::new(
                "livewire components",
                CollisionPolicy::FirstWins,
                Duration::from_secs(300),
            ),
            root: project_root.to_path_buf(),
        }
    }

    async fn acquire(&self) -> Result<Vec<LivewireRecord>, Fault> {
        let candidates = [
            (self.root.join("app").join("Livewire"), "App\\Livewire"),
            (
                self.root.join("app").join("Http").join("Livewire"),
                "App\\Http\\Livewire",
            ),
        ];
        let mut records = Vec::new();
        let mut any_dir = false;
        for (dir, namespace) in &candidates {
            if dir.is_dir() {
                any_dir = true;
                scan_components(dir, namespace, &mut records);
            }
        }
        if !any_dir {
            return Err(Fault::Filesystem("no Livewire directory found".into()));
        }
        Ok(records)
    }

    pub fn find_by_name(&self, name: &str) -> Option<LivewireRecord> {
        self.core.find_by_name(name)
    }

    pub fn search(&self, prefix: &str) -> Vec<LivewireRecord> {
        self.core.search(prefix)
    }
}

fn scan_components(dir: &Path, namespace: &str, records: &mut Vec<LivewireRecord>) {
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
        let Some(stem) = rel.strip_suffix(".php") else {
            continue;
        };
        let name = stem
            .split('/')
            .map(kebab_case)
            .collect::<Vec<_>>()
            .join(".");
        records.push(LivewireRecord {
            name,
            class: format!("{namespace}\\{}", stem.replace('/', "\\")),
            path: entry.path().to_path_buf(),
        });
    }
}

fn kebab_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() + 4);
    for (i, ch) in segment.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[async_trait]
impl Repository for LivewireRepository {
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

    #[tokio::test]
    async fn test_scan_derives_kebab_tags_and_classes() {
        let dir = tempfile::tempdir().unwrap();
        for rel in [
            "app/Livewire/UserProfile.php",
            "app/Livewire/Admin/UserTable.php",
        ] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        let repo = LivewireRepository::new(dir.path());
        repo.load().await;
        assert_eq!(repo.count(), 2);
        let admin = repo.find_by_name("admin.user-table").unwrap();
        assert_eq!(admin.class, "App\\Livewire\\Admin\\UserTable");
        assert!(repo.find_by_name("user-profile").is_some());
    }

    #[tokio::test]
    async fn test_modern_location_shadows_legacy() {
        let dir = tempfile::tempdir().unwrap();
        for rel in ["app/Livewire/Counter.php", "app/Http/Livewire/Counter.php"] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        let repo = LivewireRepository::new(dir.path());
        repo.load().await;
        assert_eq!(repo.count(), 1);
        assert_eq!(
            repo.find_by_name("counter").unwrap().class,
            "App\\Livewire\\Counter"
        );
    }
}

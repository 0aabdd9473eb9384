//
// repository/inertia.rs
//
// Inertia page names from a walk of the JavaScript pages directory.
//

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::Fault;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

const PAGE_EXTENSIONS: &[&str] = &[".vue", ".jsx", ".tsx", ".js", ".ts", ".svelte"];

#[derive(Debug, Clone)]
pub struct InertiaPageRecord {
    /// Page name as passed to `Inertia::render`, with `/` separators,
    /// e.g. `Auth/Login`.
    pub name: String,
    pub path: PathBuf,
}

impl NamedRecord for InertiaPageRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct InertiaRepository {
    core: RepoCore<InertiaPageRecord>,
    root: PathBuf,
}

impl InertiaRepository {
    pub fn new(project_root: &Path) -> Self {
        Self {
            core: RepoCore::new(
                "inertia pages",
                CollisionPolicy::FirstWins,
                Duration::from_secs(300),
            ),
            root: project_root.to_path_buf(),
        }
    }

    async fn acquire(&self) -> Result<Vec<InertiaPageRecord>, Fault> {
        let pages_dir = self.root.join("resources").join("js").join("Pages");
        if !pages_dir.is_dir() {
            return Err(Fault::Filesystem(format!(
                "pages directory missing: {}",
                pages_dir.display()
            )));
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(&pages_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&pages_dir) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            let Some(name) = PAGE_EXTENSIONS
                .iter()
                .find_map(|ext| rel.strip_suffix(ext))
            else {
                continue;
            };
            records.push(InertiaPageRecord {
                name: name.to_string(),
                path: entry.path().to_path_buf(),
            });
        }
        Ok(records)
    }

    pub fn find_by_name(&self, name: &str) -> Option<InertiaPageRecord> {
        self.core.find_by_name(name)
    }

    pub fn search(&self, prefix: &str) -> Vec<InertiaPageRecord> {
        self.core.search(prefix)
    }
}

#[async_trait]
impl Repository for InertiaRepository {
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
    async fn test_pages_keep_slash_separators() {
        let dir = tempfile::tempdir().unwrap();
        for rel in [
            "resources/js/Pages/Dashboard.vue",
            "resources/js/Pages/Auth/Login.vue",
            "resources/js/Pages/Settings/Profile.tsx",
            "resources/js/Pages/readme.md",
        ] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        let repo = InertiaRepository::new(dir.path());
        repo.load().await;
        assert_eq!(repo.count(), 3);
        assert!(repo.find_by_name("Auth/Login").is_some());
        assert!(repo.find_by_name("Settings/Profile").is_some());
        assert!(repo.find_by_name("readme").is_none());
    }
}

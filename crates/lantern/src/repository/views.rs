//
// repository/views.rs
//
// Blade/PHP view names from a recursive walk of resources/views.
//

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::Fault;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

#[derive(Debug, Clone)]
pub struct ViewRecord {
    /// Dot-separated view name, e.g. `admin.users.index`.
    pub name: String,
    pub path: PathBuf,
    pub is_blade: bool,
}

impl NamedRecord for ViewRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct ViewRepository {
    core: RepoCore<ViewRecord>,
    root: PathBuf,
}

impl ViewRepository {
    pub fn new(project_root: &Path) -> Self {
        Self {
            core: RepoCore::new("views", CollisionPolicy::LastWins, Duration::from_secs(300)),
            root: project_root.to_path_buf(),
        }
    }

    async fn acquire(&self) -> Result<Vec<ViewRecord>, Fault> {
        let views_dir = self.root.join("resources").join("views");
        if !views_dir.is_dir() {
            return Err(Fault::Filesystem(format!(
                "views directory missing: {}",
                views_dir.display()
            )));
        }
        Ok(walk_views(&views_dir))
    }

    pub fn find_by_name(&self, name: &str) -> Option<ViewRecord> {
        self.core.find_by_name(name)
    }

    pub fn search(&self, prefix: &str) -> Vec<ViewRecord> {
        self.core.search(prefix)
    }
}

fn walk_views(views_dir: &Path) -> Vec<ViewRecord> {
    let mut records = Vec::new();
    for entry in WalkDir::new(views_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = view_name(views_dir, entry.path()) else {
            continue;
        };
        let is_blade = entry
            .path()
            .to_string_lossy()
            .ends_with(".blade.php");
        records.push(ViewRecord {
            name,
            path: entry.path().to_path_buf(),
            is_blade,
        });
    }
    records
}

/// Derive the dot-separated view name from a path under the views root.
/// Non-PHP files (editor droppings, assets) yield `None`.
fn view_name(views_dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(views_dir).ok()?;
    let rel = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
    let stem = rel
        .strip_suffix(".blade.php")
        .or_else(|| rel.strip_suffix(".php"))?;
    Some(stem.replace('/', "."))
}

#[async_trait]
impl Repository for ViewRepository {
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

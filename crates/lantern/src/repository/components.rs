//
// repository/components.rs
//
// Blade component tags. Anonymous components come from a walk of
// resources/views/components; class-backed components from
// app/View/Components, with class names kebab-cased into tags.
//

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::Fault;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    /// Plain Blade file under resources/views/components.
    Anonymous,
    /// Backed by a class under app/View/Components.
    ClassBased,
}

#[derive(Debug, Clone)]
pub struct ComponentRecord {
    /// Tag name as written after `<x-`, e.g. `forms.input`.
    pub name: String,
    pub kind: ComponentKind,
    pub path: PathBuf,
}

impl NamedRecord for ComponentRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct ComponentRepository {
    core: RepoCore<ComponentRecord>,
    root: PathBuf,
}

impl ComponentRepository {
    pub fn new(project_root: &Path) -> Self {
        Self {
            // A class-backed component takes precedence over an anonymous
            // view of the same tag, matching Blade's resolution order.
            core: RepoCore::new(
                "blade components",
                CollisionPolicy::LastWins,
                Duration::from_secs(300),
            ),
            root: project_root.to_path_buf(),
        }
    }

    async fn acquire(&self) -> Result<Vec<ComponentRecord>, Fault> {
        let anon_dir = self.root.join("resources").join("views").join("components");
        let class_dir = self.root.join("app").join("View").join("Components");
        if !anon_dir.is_dir() && !class_dir.is_dir() {
            return Err(Fault::Filesystem("no component directories found".into()));
        }

        let mut records = Vec::new();
        if anon_dir.is_dir() {
            scan_anonymous(&anon_dir, &mut records);
        }
        if class_dir.is_dir() {
            scan_class_based(&class_dir, &mut records);
        }
        Ok(records)
    }

    pub fn find_by_name(&self, name: &str) -> Option<ComponentRecord> {
        self.core.find_by_name(name)
    }

    pub fn search(&self, prefix: &str) -> Vec<ComponentRecord> {
        self.core.search(prefix)
    }
}

fn scan_anonymous(dir: &Path, records: &mut Vec<ComponentRecord>) {
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
        let Some(stem) = rel.strip_suffix(".blade.php") else {
            continue;
        };
        records.push(ComponentRecord {
            name: stem.replace('/', "."),
            kind: ComponentKind::Anonymous,
            path: entry.path().to_path_buf(),
        });
    }
}

fn scan_class_based(dir: &Path, records: &mut Vec<ComponentRecord>) {
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
        records.push(ComponentRecord {
            name,
            kind: ComponentKind::ClassBased,
            path: entry.path().to_path_buf(),
        });
    }
}

/// `DatePicker` -> `date-picker`, matching Blade's tag derivation.
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
impl Repository for ComponentRepository {
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
    fn test_kebab_case() {
        assert_eq!(kebab_case("Alert"), "alert");
        assert_eq!(kebab_case("DatePicker"), "date-picker");
        assert_eq!(kebab_case("input"), "input");
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let write = |rel: &str| {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        };
        write("resources/views/components/forms/input.blade.php");
        write("resources/views/components/alert.blade.php");
        write("app/View/Components/Forms/DatePicker.php");
        write("app/View/Components/Alert.php");
        dir
    }

    #[tokio::test]
    async fn test_both_component_kinds_indexed() {
        let dir = fixture();
        let repo = ComponentRepository::new(dir.path());
        repo.load().await;
        assert_eq!(repo.find_by_name("forms.input").unwrap().kind, ComponentKind::Anonymous);
        assert_eq!(
            repo.find_by_name("forms.date-picker").unwrap().kind,
            ComponentKind::ClassBased
        );
    }

    #[tokio::test]
    async fn test_class_component_shadows_anonymous_twin() {
        let dir = fixture();
        let repo = ComponentRepository::new(dir.path());
        repo.load().await;
        // `alert` exists in both spaces; the class-backed one wins.
        assert_eq!(repo.find_by_name("alert").unwrap().kind, ComponentKind::ClassBased);
        assert_eq!(repo.count(), 3);
    }
}

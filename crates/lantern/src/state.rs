//
// state.rs
//
// Session-wide state: project info, the twelve domain repositories, open
// documents, and the watch layer. Built once at startup and shared by
// reference; there are no ambient singletons.
//

use std::path::PathBuf;
use std::sync::Arc;

use crate::category::Category;
use crate::context::ContextParser;
use crate::documents::DocumentStore;
use crate::php_bridge::PhpBridge;
use crate::project::{detect_project, ProjectInfo};
use crate::repository::auth::AuthRepository;
use crate::repository::components::ComponentRepository;
use crate::repository::configs::ConfigRepository;
use crate::repository::env_vars::EnvVarRepository;
use crate::repository::inertia::InertiaRepository;
use crate::repository::livewire::LivewireRepository;
use crate::repository::middleware::MiddlewareRepository;
use crate::repository::models::ModelRepository;
use crate::repository::routes::RouteRepository;
use crate::repository::translations::TranslationRepository;
use crate::repository::validation::ValidationRepository;
use crate::repository::views::ViewRepository;
use crate::repository::Repository;
use crate::watcher::{classify_change, FileWatcher, WATCHED_DIRS};

pub struct Repositories {
    pub routes: RouteRepository,
    pub configs: ConfigRepository,
    pub middleware: MiddlewareRepository,
    pub models: ModelRepository,
    pub validation: ValidationRepository,
    pub auth: AuthRepository,
    pub views: ViewRepository,
    pub translations: TranslationRepository,
    pub env_vars: EnvVarRepository,
    pub components: ComponentRepository,
    pub livewire: LivewireRepository,
    pub inertia: InertiaRepository,
}

impl Repositories {
    pub fn new(project: &ProjectInfo, bridge: Option<Arc<PhpBridge>>) -> Self {
        let root = &project.root;
        Self {
            routes: RouteRepository::new(bridge.clone()),
            configs: ConfigRepository::new(bridge.clone()),
            middleware: MiddlewareRepository::new(bridge.clone()),
            models: ModelRepository::new(bridge.clone()),
            validation: ValidationRepository::new(bridge.clone()),
            auth: AuthRepository::new(bridge),
            views: ViewRepository::new(root),
            translations: TranslationRepository::new(root),
            env_vars: EnvVarRepository::new(root),
            components: ComponentRepository::new(root),
            livewire: LivewireRepository::new(root),
            inertia: InertiaRepository::new(root),
        }
    }

    /// The repository invalidated by a change in the given domain.
    pub fn by_category(&self, category: Category) -> &dyn Repository {
        match category {
            Category::Route => &self.routes,
            Category::Config => &self.configs,
            Category::Middleware => &self.middleware,
            Category::Model | Category::ModelColumn | Category::ModelRelation => &self.models,
            Category::ValidationRule => &self.validation,
            Category::Auth => &self.auth,
            Category::View => &self.views,
            Category::Translation => &self.translations,
            Category::Env => &self.env_vars,
            Category::BladeComponent => &self.components,
            Category::LivewireComponent => &self.livewire,
            Category::InertiaPage => &self.inertia,
        }
    }

    /// Issue every domain's initial load concurrently. Best-effort: a
    /// repository that fails logs and keeps an empty snapshot; it never
    /// blocks or fails the others.
    pub async fn load_all(&self) {
        tokio::join!(
            self.routes.load(),
            self.configs.load(),
            self.middleware.load(),
            self.models.load(),
            self.validation.load(),
            self.auth.load(),
            self.views.load(),
            self.translations.load(),
            self.env_vars.load(),
            self.components.load(),
            self.livewire.load(),
            self.inertia.load(),
        );
    }
}

pub struct SessionState {
    pub project: ProjectInfo,
    pub bridge: Option<Arc<PhpBridge>>,
    /// `None` when the workspace is not a recognized Laravel project; every
    /// facade call then returns empty results.
    pub repos: Option<Repositories>,
    pub documents: DocumentStore,
    pub parser: ContextParser,
    pub watcher: FileWatcher,
}

impl SessionState {
    /// Resolve the project, the PHP runtime, and the repository set.
    pub async fn initialize(root: PathBuf, php_override: Option<PathBuf>) -> Arc<Self> {
        let mut project = detect_project(&root);

        if !project.is_laravel_project {
            return Arc::new(Self {
                project,
                bridge: None,
                repos: None,
                documents: DocumentStore::new(),
                parser: ContextParser::new(),
                watcher: FileWatcher::new(),
            });
        }

        let bridge = PhpBridge::new(php_override, root.clone()).map(Arc::new);
        match &bridge {
            Some(bridge) => {
                project.php_path = Some(bridge.php_path().to_path_buf());
                match bridge.runtime_version().await {
                    Ok(version) => {
                        log::info!("Laravel Framework {version}");
                        project.laravel_version = Some(version);
                    }
                    Err(fault) => log::warn!("Could not resolve framework version: {fault}"),
                }
            }
            None => {
                log::warn!("No PHP runtime found; bridge-backed domains will stay empty");
            }
        }

        let repos = Repositories::new(&project, bridge.clone());
        Arc::new(Self {
            project,
            bridge,
            repos: Some(repos),
            documents: DocumentStore::new(),
            parser: ContextParser::new(),
            watcher: FileWatcher::new(),
        })
    }

    /// Begin observing the project tree. Each change path is classified by
    /// subtree and fans out to the affected domains' `reload()`; overlapping
    /// triggers rely on the repositories' single-flight guards.
    pub fn start_watcher(self: &Arc<Self>) {
        if self.repos.is_none() {
            return;
        }
        let state = Arc::clone(self);
        let result = self.watcher.watch(&self.project.root, WATCHED_DIRS, move |path| {
            state.handle_file_change(path);
        });
        if let Err(fault) = result {
            log::warn!("File watching unavailable: {fault}");
        }
    }

    /// Funnel for both native filesystem events and editor-reported
    /// changed-file batches.
    pub fn handle_file_change(self: &Arc<Self>, path: PathBuf) {
        if self.repos.is_none() {
            return;
        }
        let domains = classify_change(&path);
        if domains.is_empty() {
            return;
        }
        log::trace!("Change {} invalidates {:?}", path.display(), domains);
        for category in domains {
            let state = Arc::clone(self);
            tokio::spawn(async move {
                if let Some(repos) = &state.repos {
                    repos.by_category(category).reload().await;
                }
            });
        }
    }

    pub fn is_active(&self) -> bool {
        self.repos.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn laravel_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("artisan"), "#!/usr/bin/env php\n").unwrap();
        fs::write(
            dir.path().join("composer.json"),
            r#"{"require": {"laravel/framework": "^11.0"}}"#,
        )
        .unwrap();
        for rel in [
            "resources/views/welcome.blade.php",
            "lang/en/auth.php",
        ] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "<?php return ['failed' => 'No.'];").unwrap();
        }
        fs::write(dir.path().join(".env"), "APP_ENV=local\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_unrecognized_project_builds_no_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let state = SessionState::initialize(dir.path().to_path_buf(), None).await;
        assert!(!state.is_active());
        assert!(state.repos.is_none());
    }

    #[tokio::test]
    async fn test_recognized_project_loads_fs_domains() {
        let dir = laravel_fixture();
        // Force-disable the bridge so the test never shells out.
        let state = SessionState::initialize(
            dir.path().to_path_buf(),
            Some(PathBuf::from("/nonexistent/php")),
        )
        .await;
        assert!(state.is_active());
        let repos = state.repos.as_ref().unwrap();
        repos.load_all().await;

        // Filesystem domains populate without a PHP runtime.
        assert_eq!(repos.views.count(), 1);
        assert_eq!(repos.translations.count(), 1);
        assert_eq!(repos.env_vars.count(), 1);
        // Validation serves its built-in fallback even with no bridge.
        assert!(repos.validation.count() > 0);
        // Bridge-backed domains degrade to empty rather than failing.
        assert_eq!(repos.routes.count(), 0);
    }

    #[tokio::test]
    async fn test_file_change_triggers_targeted_reload() {
        let dir = laravel_fixture();
        let state = SessionState::initialize(
            dir.path().to_path_buf(),
            Some(PathBuf::from("/nonexistent/php")),
        )
        .await;
        let repos = state.repos.as_ref().unwrap();
        repos.load_all().await;
        assert_eq!(repos.views.count(), 1);

        // Add a view, then report the change through the funnel.
        fs::write(
            dir.path().join("resources/views/about.blade.php"),
            "",
        )
        .unwrap();
        state.handle_file_change(dir.path().join("resources/views/about.blade.php"));

        // The reload runs on a spawned task; poll until it lands.
        for _ in 0..50 {
            if state.repos.as_ref().unwrap().views.count() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(state.repos.as_ref().unwrap().views.count(), 2);
    }
}

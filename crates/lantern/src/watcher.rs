//
// watcher.rs
//
// Filesystem watch layer. Observes well-known source subtrees and funnels
// debounced change paths to a callback; the owning service classifies each
// path into the domains it invalidates.
//

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::category::Category;
use crate::error::Fault;

/// Project-relative subtrees worth watching. Anything outside these cannot
/// invalidate an indexed domain.
pub const WATCHED_DIRS: &[&str] = &[
    "routes",
    "config",
    "resources/views",
    "lang",
    "resources/lang",
    "resources/js/Pages",
    "app/Models",
    "app/View/Components",
    "app/Livewire",
    "app/Http/Livewire",
    "app/Http/Middleware",
    "app/Rules",
    "app/Providers",
    "database/migrations",
    ".env",
    ".env.example",
];

/// Debounce window for bursts of filesystem events.
const DEBOUNCE: Duration = Duration::from_millis(300);

pub struct FileWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    forwarder: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWatcher {
    pub fn new() -> Self {
        Self {
            watcher: Mutex::new(None),
            forwarder: Mutex::new(None),
        }
    }

    /// Recursively observe each existing directory under `root`, invoking
    /// `callback(changed_path)` for every change after debouncing.
    /// Directories that are missing or cannot be watched are skipped
    /// silently; that is not a fatal condition.
    pub fn watch(
        &self,
        root: &Path,
        relative_dirs: &[&str],
        callback: impl Fn(PathBuf) + Send + Sync + 'static,
    ) -> Result<(), Fault> {
        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            if !is_mutation(&event.kind) {
                return;
            }
            for path in event.paths {
                let _ = tx.send(path);
            }
        })
        .map_err(|e| Fault::Process(format!("failed to create filesystem watcher: {e}")))?;

        let mut watched = 0usize;
        for rel in relative_dirs {
            let path = root.join(rel);
            if !path.exists() {
                continue;
            }
            let mode = if path.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            match watcher.watch(&path, mode) {
                Ok(()) => watched += 1,
                Err(e) => log::trace!("Cannot watch {}: {e}", path.display()),
            }
        }
        log::info!("Watching {watched} project subtrees");

        let handle = tokio::spawn(debounce_loop(rx, callback));

        *self.watcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(watcher);
        *self.forwarder.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Stop all watches. Safe to call any number of times.
    pub fn dispose(&self) {
        if let Some(watcher) = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take() {
            drop(watcher);
        }
        if let Some(handle) = self
            .forwarder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn is_mutation(kind: &notify::EventKind) -> bool {
    use notify::EventKind;
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

/// Collapse event bursts: wait out the debounce window after the first
/// event, then deliver each distinct path once.
async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    callback: impl Fn(PathBuf) + Send + Sync + 'static,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        loop {
            match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                Ok(Some(path)) => batch.push(path),
                Ok(None) | Err(_) => break,
            }
        }
        let mut seen = HashSet::new();
        for path in batch {
            if seen.insert(path.clone()) {
                callback(path);
            }
        }
    }
}

/// Classify a changed path into the domains it invalidates. One change may
/// touch several domains; a views-subtree change invalidates both the view
/// index and the component index.
pub fn classify_change(path: &Path) -> Vec<Category> {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let mut domains = Vec::new();
    let mut push = |category: Category| {
        if !domains.contains(&category) {
            domains.push(category);
        }
    };

    if normalized.contains("routes/") {
        push(Category::Route);
    }
    if normalized.contains("config/") {
        push(Category::Config);
    }
    if normalized.contains("resources/views/") {
        push(Category::View);
        push(Category::BladeComponent);
    }
    if normalized.contains("lang/") {
        push(Category::Translation);
    }
    if normalized.contains("resources/js/Pages/") {
        push(Category::InertiaPage);
    }
    if normalized.contains("app/Models/") || normalized.contains("database/migrations/") {
        push(Category::Model);
    }
    if normalized.contains("app/View/Components/") {
        push(Category::BladeComponent);
    }
    if normalized.contains("app/Livewire/") || normalized.contains("app/Http/Livewire/") {
        push(Category::LivewireComponent);
    }
    if normalized.contains("app/Http/Middleware/") {
        push(Category::Middleware);
    }
    if normalized.contains("app/Rules/") {
        push(Category::ValidationRule);
    }
    if normalized.contains("app/Providers/") {
        push(Category::Auth);
        push(Category::Middleware);
        push(Category::Route);
    }
    if normalized.ends_with(".env") || normalized.contains(".env.") {
        push(Category::Env);
    }
    domains
}

//
// project.rs
//
// Laravel project detection and session-wide project info.
//

use std::path::{Path, PathBuf};

/// Immutable description of the host project, resolved once at session
/// start. Components receive it by reference through `SessionState`; nothing
/// mutates it after initialization.
#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub root: PathBuf,
    pub is_laravel_project: bool,
    /// Resolved PHP executable, when one was found.
    pub php_path: Option<PathBuf>,
    /// Framework version reported by artisan, when the bridge could run.
    pub laravel_version: Option<String>,
}

impl ProjectInfo {
    pub fn unrecognized(root: PathBuf) -> Self {
        Self {
            root,
            is_laravel_project: false,
            php_path: None,
            laravel_version: None,
        }
    }
}

/// Decide whether a directory holds a Laravel application.
///
/// Requires the `artisan` entry point plus a composer.json that depends on
/// `laravel/framework`. A vendored framework checkout without artisan, or an
/// arbitrary PHP project, is not recognized.
pub fn detect_project(root: &Path) -> ProjectInfo {
    let artisan = root.join("artisan");
    let composer = root.join("composer.json");

    let recognized = artisan.is_file() && composer_requires_laravel(&composer);
    if !recognized {
        log::info!("Not a Laravel project: {}", root.display());
        return ProjectInfo::unrecognized(root.to_path_buf());
    }

    log::info!("Laravel project detected at {}", root.display());
    ProjectInfo {
        root: root.to_path_buf(),
        is_laravel_project: true,
        php_path: None,
        laravel_version: None,
    }
}

fn composer_requires_laravel(composer: &Path) -> bool {
    let Ok(text) = std::fs::read_to_string(composer) else {
        return false;
    };
    let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) else {
        return false;
    };
    for section in ["require", "require-dev"] {
        if json
            .get(section)
            .and_then(|r| r.get("laravel/framework"))
            .is_some()
        {
            return true;
        }
    }
    false
}

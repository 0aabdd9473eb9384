//
// repository/middleware.rs
//
// Route middleware aliases, acquired through the PHP bridge with the
// backing class resolved via reflection.
//

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Fault;
use crate::php_bridge::PhpBridge;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

#[derive(Debug, Clone, Deserialize)]
pub struct MiddlewareRecord {
    /// Alias usable in route definitions, e.g. `auth` or `throttle`.
    pub name: String,
    pub class: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl NamedRecord for MiddlewareRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

const MIDDLEWARE_FRAGMENT: &str = r#"
$out = [];
foreach (app('router')->getMiddleware() as $alias => $class) {
    $class = is_string($class) ? $class : get_debug_type($class);
    // Parameterized aliases look like Class:param; reflect the class part.
    $target = explode(':', $class, 2)[0];
    $entry = ['name' => $alias, 'class' => $class, 'file' => null, 'line' => null];
    try {
        $ref = new ReflectionClass($target);
        $entry['file'] = $ref->getFileName() ?: null;
        $entry['line'] = $ref->getStartLine() ?: null;
    } catch (\Throwable $e) {
    }
    $out[] = $entry;
}
echo json_encode($out);
"#;

pub struct MiddlewareRepository {
    core: RepoCore<MiddlewareRecord>,
    bridge: Option<Arc<PhpBridge>>,
}

impl MiddlewareRepository {
    pub fn new(bridge: Option<Arc<PhpBridge>>) -> Self {
        Self {
            core: RepoCore::new("middleware", CollisionPolicy::LastWins, Duration::from_secs(1800)),
            bridge,
        }
    }

    async fn acquire(&self) -> Result<Vec<MiddlewareRecord>, Fault> {
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| Fault::Process("no PHP runtime available".into()))?;
        let payload = bridge.run(MIDDLEWARE_FRAGMENT).await?;
        Ok(serde_json::from_str(payload.trim())?)
    }

    pub fn find_by_name(&self, name: &str) -> Option<MiddlewareRecord> {
        self.core.find_by_name(name)
    }

    pub fn search(&self, prefix: &str) -> Vec<MiddlewareRecord> {
        self.core.search(prefix)
    }
}

#[async_trait]
impl Repository for MiddlewareRepository {
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

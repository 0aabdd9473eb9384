//
// repository/routes.rs
//
// Named application routes, acquired through the PHP bridge. Each route's
// backing handler is resolved via reflection so definitions can jump
// straight to the controller method.
//

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Fault;
use crate::php_bridge::PhpBridge;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

/// One named route. Unnamed routes are not indexable and never appear here.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRecord {
    pub name: String,
    pub uri: String,
    pub methods: Vec<String>,
    pub action: String,
    #[serde(default)]
    pub middleware: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl NamedRecord for RouteRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

const ROUTES_FRAGMENT: &str = r#"
$routes = [];
foreach (app('router')->getRoutes() as $route) {
    $name = $route->getName();
    if ($name === null || $name === '') {
        continue;
    }
    $entry = [
        'name' => $name,
        'uri' => $route->uri(),
        'methods' => array_values(array_diff($route->methods(), ['HEAD'])),
        'action' => $route->getActionName(),
        'middleware' => array_values(array_map(
            fn ($m) => is_string($m) ? $m : get_class($m),
            $route->gatherMiddleware()
        )),
        'parameters' => $route->parameterNames(),
        'file' => null,
        'line' => null,
    ];
    try {
        $uses = $route->getAction('uses');
        if (is_string($uses) && str_contains($uses, '@')) {
            [$class, $method] = explode('@', $uses, 2);
            $ref = new ReflectionMethod($class, $method);
            $entry['file'] = $ref->getFileName();
            $entry['line'] = $ref->getStartLine();
        } elseif ($uses instanceof Closure) {
            $ref = new ReflectionFunction($uses);
            $entry['file'] = $ref->getFileName();
            $entry['line'] = $ref->getStartLine();
        }
    } catch (\Throwable $e) {
        // Handler no longer resolvable; keep the route without a target.
    }
    $routes[] = $entry;
}
echo json_encode($routes);
"#;

pub struct RouteRepository {
    core: RepoCore<RouteRecord>,
    bridge: Option<Arc<PhpBridge>>,
}

impl RouteRepository {
    pub fn new(bridge: Option<Arc<PhpBridge>>) -> Self {
        Self {
            // A redefined route name replaces the earlier definition.
            core: RepoCore::new("routes", CollisionPolicy::LastWins, Duration::from_secs(300)),
            bridge,
        }
    }

    async fn acquire(&self) -> Result<Vec<RouteRecord>, Fault> {
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| Fault::Process("no PHP runtime available".into()))?;
        let payload = bridge.run(ROUTES_FRAGMENT).await?;
        let records: Vec<RouteRecord> = serde_json::from_str(payload.trim())?;
        Ok(records.into_iter().filter(|r| !r.name.is_empty()).collect())
    }

    pub fn find_by_name(&self, name: &str) -> Option<RouteRecord> {
        self.core.find_by_name(name)
    }

    pub fn search(&self, prefix: &str) -> Vec<RouteRecord> {
        self.core.search(prefix)
    }
}

#[async_trait]
impl Repository for RouteRepository {
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

    #[test]
    fn test_route_payload_decodes() {
        let payload = r#"[
            {"name":"users.index","uri":"users","methods":["GET"],"action":"App\\Http\\Controllers\\UserController@index","middleware":["web"],"parameters":[],"file":"/app/Http/Controllers/UserController.php","line":12},
            {"name":"login","uri":"login","methods":["GET","POST"],"action":"Closure","middleware":[],"parameters":[]}
        ]"#;
        let records: Vec<RouteRecord> = serde_json::from_str(payload).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "users.index");
        assert_eq!(records[0].line, Some(12));
        assert_eq!(records[1].file, None);
    }

    #[test]
    fn test_duplicate_route_name_keeps_last_definition() {
        let core: RepoCore<RouteRecord> =
            RepoCore::new("routes", CollisionPolicy::LastWins, Duration::from_secs(60));
        let mk = |uri: &str| RouteRecord {
            name: "home".into(),
            uri: uri.into(),
            methods: vec!["GET".into()],
            action: "Closure".into(),
            middleware: vec![],
            parameters: vec![],
            file: None,
            line: None,
        };
        core.install(vec![mk("old"), mk("new")]);
        assert_eq!(core.find_by_name("home").unwrap().uri, "new");
    }
}

//
// repository/auth.rs
//
// Authorization rules: gate abilities and policy methods, acquired through
// the PHP bridge.
//

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Fault;
use crate::php_bridge::PhpBridge;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthRuleKind {
    /// Closure-based ability registered on the gate.
    Gate,
    /// Public method on a registered policy class.
    Policy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthRuleRecord {
    /// Ability name as used in `can`/`authorize` calls.
    pub name: String,
    pub kind: AuthRuleKind,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl NamedRecord for AuthRuleRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

const AUTH_FRAGMENT: &str = r#"
$out = [];
$gate = app(Illuminate\Contracts\Auth\Access\Gate::class);
foreach ($gate->abilities() as $ability => $callback) {
    $entry = ['name' => $ability, 'kind' => 'gate', 'class' => null, 'file' => null, 'line' => null];
    try {
        if ($callback instanceof Closure) {
            $ref = new ReflectionFunction($callback);
            $entry['file'] = $ref->getFileName();
            $entry['line'] = $ref->getStartLine();
        }
    } catch (\Throwable $e) {
    }
    $out[] = $entry;
}
foreach ($gate->policies() as $model => $policy) {
    try {
        $ref = new ReflectionClass($policy);
        foreach ($ref->getMethods(ReflectionMethod::IS_PUBLIC) as $method) {
            if ($method->isConstructor() || $method->class !== $ref->getName()) {
                continue;
            }
            $out[] = [
                'name' => $method->getName(),
                'kind' => 'policy',
                'class' => $policy,
                'file' => $method->getFileName(),
                'line' => $method->getStartLine(),
            ];
        }
    } catch (\Throwable $e) {
    }
}
echo json_encode($out);
"#;

pub struct AuthRepository {
    core: RepoCore<AuthRuleRecord>,
    bridge: Option<Arc<PhpBridge>>,
}

impl AuthRepository {
    pub fn new(bridge: Option<Arc<PhpBridge>>) -> Self {
        Self {
            core: RepoCore::new(
                "authorization rules",
                CollisionPolicy::FirstWins,
                Duration::from_secs(900),
            ),
            bridge,
        }
    }

    async fn acquire(&self) -> Result<Vec<AuthRuleRecord>, Fault> {
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| Fault::Process("no PHP runtime available".into()))?;
        let payload = bridge.run(AUTH_FRAGMENT).await?;
        Ok(serde_json::from_str(payload.trim())?)
    }

    pub fn find_by_name(&self, name: &str) -> Option<AuthRuleRecord> {
        self.core.find_by_name(name)
    }

    pub fn search(&self, prefix: &str) -> Vec<AuthRuleRecord> {
        self.core.search(prefix)
    }
}

#[async_trait]
impl Repository for AuthRepository {
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
    fn test_auth_payload_decodes_both_kinds() {
        let payload = r#"[
            {"name":"view-dashboard","kind":"gate","file":"/app/Providers/AuthServiceProvider.php","line":22},
            {"name":"update","kind":"policy","class":"App\\Policies\\PostPolicy","file":"/app/Policies/PostPolicy.php","line":30}
        ]"#;
        let records: Vec<AuthRuleRecord> = serde_json::from_str(payload).unwrap();
        assert_eq!(records[0].kind, AuthRuleKind::Gate);
        assert_eq!(records[1].kind, AuthRuleKind::Policy);
        assert_eq!(records[1].class.as_deref(), Some("App\\Policies\\PostPolicy"));
    }
}

//
// repository/configs.rs
//
// Configuration keys, acquired through the PHP bridge as a dot-flattened
// view of the nested configuration tree.
//

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Fault;
use crate::php_bridge::PhpBridge;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

/// Display values longer than this are truncated; completions only need a
/// hint of the value, not the value itself.
const VALUE_DISPLAY_LIMIT: usize = 120;

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigRecord {
    /// Dot-separated key, e.g. `app.providers` or `database.connections.mysql.host`.
    pub key: String,
    pub value: Option<String>,
    /// True for internal (non-leaf) keys.
    pub has_children: bool,
}

impl NamedRecord for ConfigRecord {
    fn name(&self) -> &str {
        &self.key
    }
}

const CONFIGS_FRAGMENT: &str = r#"
$out = [];
$flatten = function ($items, $prefix) use (&$flatten, &$out) {
    foreach ($items as $key => $value) {
        $full = $prefix === '' ? (string) $key : $prefix . '.' . $key;
        if (is_array($value)) {
            $out[] = ['key' => $full, 'value' => null, 'has_children' => true];
            $flatten($value, $full);
        } else {
            $display = is_scalar($value) || $value === null
                ? var_export($value, true)
                : get_debug_type($value);
            $out[] = ['key' => $full, 'value' => $display, 'has_children' => false];
        }
    }
};
$flatten(config()->all(), '');
echo json_encode($out);
"#;

pub struct ConfigRepository {
    core: RepoCore<ConfigRecord>,
    bridge: Option<Arc<PhpBridge>>,
}

impl ConfigRepository {
    pub fn new(bridge: Option<Arc<PhpBridge>>) -> Self {
        Self {
            core: RepoCore::new("config keys", CollisionPolicy::LastWins, Duration::from_secs(600)),
            bridge,
        }
    }

    async fn acquire(&self) -> Result<Vec<ConfigRecord>, Fault> {
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| Fault::Process("no PHP runtime available".into()))?;
        let payload = bridge.run(CONFIGS_FRAGMENT).await?;
        let mut records: Vec<ConfigRecord> = serde_json::from_str(payload.trim())?;
        for record in &mut records {
            record.value = record.value.take().map(truncate_display);
        }
        Ok(records)
    }

    pub fn find_by_key(&self, key: &str) -> Option<ConfigRecord> {
        self.core.find_by_name(key)
    }

    pub fn search(&self, prefix: &str) -> Vec<ConfigRecord> {
        self.core.search(prefix)
    }
}

fn truncate_display(value: String) -> String {
    if value.chars().count() <= VALUE_DISPLAY_LIMIT {
        return value;
    }
    let truncated: String = value.chars().take(VALUE_DISPLAY_LIMIT).collect();
    format!("{truncated}…")
}

#[async_trait]
impl Repository for ConfigRepository {
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

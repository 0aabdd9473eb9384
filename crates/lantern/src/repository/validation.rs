//
// repository/validation.rs
//
// Validation rules. Built-in framework rules are served from a static
// list; project-defined rule objects are discovered through the PHP bridge.
// This is the only domain with a two-tier fallback: custom-rule discovery
// failure is swallowed and the built-ins are still served.
//

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Fault;
use crate::php_bridge::PhpBridge;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationRuleRecord {
    pub name: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

impl NamedRecord for ValidationRuleRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ValidationRuleRecord {
    pub fn is_custom(&self) -> bool {
        self.class.is_some()
    }
}

/// Framework-provided rule names.
pub const BUILTIN_RULES: &[&str] = &[
    "accepted", "accepted_if", "active_url", "after", "after_or_equal", "alpha", "alpha_dash",
    "alpha_num", "array", "ascii", "bail", "before", "before_or_equal", "between", "boolean",
    "confirmed", "current_password", "date", "date_equals", "date_format", "decimal", "declined",
    "declined_if", "different", "digits", "digits_between", "dimensions", "distinct", "doesnt_end_with",
    "doesnt_start_with", "email", "ends_with", "enum", "exclude", "exclude_if", "exclude_unless",
    "exclude_with", "exclude_without", "exists", "extensions", "file", "filled", "gt", "gte",
    "hex_color", "image", "in", "in_array", "integer", "ip", "ipv4", "ipv6", "json", "list", "lt",
    "lte", "lowercase", "mac_address", "max", "max_digits", "mimes", "mimetypes", "min",
    "min_digits", "missing", "missing_if", "missing_unless", "missing_with", "missing_with_all",
    "multiple_of", "not_in", "not_regex", "nullable", "numeric", "present", "present_if",
    "present_unless", "present_with", "present_with_all", "prohibited", "prohibited_if",
    "prohibited_unless", "prohibits", "regex", "required", "required_array_keys", "required_if",
    "required_if_accepted", "required_unless", "required_with", "required_with_all",
    "required_without", "required_without_all", "same", "size", "sometimes", "starts_with",
    "string", "timezone", "ulid", "unique", "uppercase", "url", "uuid",
];

const CUSTOM_RULES_FRAGMENT: &str = r#"
$out = [];
$dir = app_path('Rules');
$files = is_dir($dir) ? glob($dir . '/*.php') : [];
foreach ($files as $file) {
    $class = 'App\\Rules\\' . basename($file, '.php');
    if (!class_exists($class)) {
        continue;
    }
    $ref = new ReflectionClass($class);
    if ($ref->isAbstract()) {
        continue;
    }
    $out[] = [
        'name' => Illuminate\Support\Str::snake($ref->getShortName()),
        'class' => $class,
        'file' => $ref->getFileName(),
    ];
}
echo json_encode($out);
"#;

pub struct ValidationRepository {
    core: RepoCore<ValidationRuleRecord>,
    bridge: Option<Arc<PhpBridge>>,
}

impl ValidationRepository {
    pub fn new(bridge: Option<Arc<PhpBridge>>) -> Self {
        Self {
            // A custom rule shadowing a built-in name does not replace it.
            core: RepoCore::new(
                "validation rules",
                CollisionPolicy::FirstWins,
                Duration::from_secs(1800),
            ),
            bridge,
        }
    }

    /// Built-ins always succeed; custom discovery is best-effort.
    async fn acquire(&self) -> Result<Vec<ValidationRuleRecord>, Fault> {
        let mut records = builtin_records();
        match self.discover_custom_rules().await {
            Ok(custom) => records.extend(custom),
            Err(fault) => {
                log::warn!("Custom validation rule discovery failed: {fault}");
            }
        }
        Ok(records)
    }

    async fn discover_custom_rules(&self) -> Result<Vec<ValidationRuleRecord>, Fault> {
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| Fault::Process("no PHP runtime available".into()))?;
        let payload = bridge.run(CUSTOM_RULES_FRAGMENT).await?;
        Ok(serde_json::from_str(payload.trim())?)
    }

    pub fn find_by_name(&self, name: &str) -> Option<ValidationRuleRecord> {
        self.core.find_by_name(name)
    }

    pub fn search(&self, prefix: &str) -> Vec<ValidationRuleRecord> {
        self.core.search(prefix)
    }
}

fn builtin_records() -> Vec<ValidationRuleRecord> {
    BUILTIN_RULES
        .iter()
        .map(|name| ValidationRuleRecord {
            name: (*name).to_string(),
            class: None,
            file: None,
        })
        .collect()
}

#[async_trait]
impl Repository for ValidationRepository {
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

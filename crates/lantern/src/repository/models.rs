//
// repository/models.rs
//
// Eloquent models. Column metadata comes from live database schema
// introspection through the PHP bridge, overlaid with declared casts;
// relation declarations are inferred lexically from the model source by
// matching the Eloquent relation-method vocabulary.
//

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::Fault;
use crate::php_bridge::PhpBridge;
use crate::repository::{run_load, run_reload, CollisionPolicy, NamedRecord, RepoCore, Repository};

#[derive(Debug, Clone, Deserialize)]
pub struct ModelAttribute {
    pub name: String,
    /// Database column type, overlaid by the declared cast when present.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub cast: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelRelation {
    pub name: String,
    /// Relation method used in the declaration, e.g. `hasMany`.
    pub kind: String,
    pub line: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelRecord {
    /// Short class name, e.g. `User`.
    pub name: String,
    pub class: String,
    pub file: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub attributes: Vec<ModelAttribute>,
    #[serde(default, skip_deserializing)]
    pub relations: Vec<ModelRelation>,
}

impl NamedRecord for ModelRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

const MODELS_FRAGMENT: &str = r#"
$out = [];
$dir = app_path('Models');
$files = is_dir($dir) ? glob($dir . '/*.php') : [];
foreach ($files as $file) {
    $class = 'App\\Models\\' . basename($file, '.php');
    if (!class_exists($class)) {
        continue;
    }
    $ref = new ReflectionClass($class);
    if ($ref->isAbstract() || !$ref->isSubclassOf(Illuminate\Database\Eloquent\Model::class)) {
        continue;
    }
    $entry = [
        'name' => $ref->getShortName(),
        'class' => $class,
        'file' => $ref->getFileName(),
        'table' => null,
        'attributes' => [],
    ];
    try {
        $model = $ref->newInstanceWithoutConstructor();
        $table = $model->getTable();
        $casts = $model->getCasts();
        $entry['table'] = $table;
        foreach (Illuminate\Support\Facades\Schema::getColumns($table) as $column) {
            $name = $column['name'];
            $entry['attributes'][] = [
                'name' => $name,
                'type' => $casts[$name] ?? $column['type_name'],
                'cast' => $casts[$name] ?? null,
            ];
        }
    } catch (\Throwable $e) {
        // Schema unavailable (no database); keep the model without columns.
    }
    $out[] = $entry;
}
echo json_encode($out);
"#;

/// Eloquent relation-method vocabulary used for lexical inference.
const RELATION_METHODS: &str = "hasOne|hasMany|hasOneThrough|hasManyThrough|belongsTo|belongsToMany|morphOne|morphMany|morphTo|morphToMany|morphedByMany";

pub struct ModelRepository {
    core: RepoCore<ModelRecord>,
    bridge: Option<Arc<PhpBridge>>,
    relation_pattern: Regex,
}

impl ModelRepository {
    pub fn new(bridge: Option<Arc<PhpBridge>>) -> Self {
        let relation_pattern = Regex::new(&format!(
            r"(?s)function\s+(\w+)\s*\([^)]*\)[^{{}}]*\{{\s*return\s+\$this->({RELATION_METHODS})\("
        ))
        .expect("relation pattern is valid");
        Self {
            core: RepoCore::new("models", CollisionPolicy::LastWins, Duration::from_secs(300)),
            bridge,
            relation_pattern,
        }
    }

    async fn acquire(&self) -> Result<Vec<ModelRecord>, Fault> {
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| Fault::Process("no PHP runtime available".into()))?;
        let payload = bridge.run(MODELS_FRAGMENT).await?;
        let mut records: Vec<ModelRecord> = serde_json::from_str(payload.trim())?;
        for record in &mut records {
            record.relations = scan_relations(&self.relation_pattern, Path::new(&record.file));
        }
        Ok(records)
    }

    pub fn find_by_name(&self, name: &str) -> Option<ModelRecord> {
        self.core.find_by_name(name)
    }

    pub fn search(&self, prefix: &str) -> Vec<ModelRecord> {
        self.core.search(prefix)
    }
}

/// Infer relation declarations from source text.
///
/// Lexical by design: a method whose body immediately returns a call to one
/// of the Eloquent relation builders is treated as a relation. No PHP
/// parsing, consistent with the rest of the scanning layer.
fn scan_relations(pattern: &Regex, file: &Path) -> Vec<ModelRelation> {
    let Ok(source) = std::fs::read_to_string(file) else {
        return Vec::new();
    };
    scan_relations_in_source(pattern, &source)
}

fn scan_relations_in_source(pattern: &Regex, source: &str) -> Vec<ModelRelation> {
    pattern
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let line = source[..whole.start()].matches('\n').count() as u32;
            Some(ModelRelation {
                name: caps.get(1)?.as_str().to_string(),
                kind: caps.get(2)?.as_str().to_string(),
                line,
            })
        })
        .collect()
}

#[async_trait]
impl Repository for ModelRepository {
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

    fn pattern() -> Regex {
        ModelRepository::new(None).relation_pattern
    }

    #[test]
    fn test_scan_relations_finds_vocabulary_methods() {
        let source = r#"<?php
class User extends Model
{
    public function posts(): HasMany
    {
        return $this->hasMany(Post::class);
    }

    public function company()
    {
        return $this->belongsTo(Company::class, 'company_id');
    }

    public function fullName(): string
    {
        return $this->first_name . ' ' . $this->last_name;
    }
}
"#;
        let relations = scan_relations_in_source(&pattern(), source);
        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].name, "posts");
        assert_eq!(relations[0].kind, "hasMany");
        assert_eq!(relations[1].name, "company");
        assert_eq!(relations[1].kind, "belongsTo");
    }

    #[test]
    fn test_scan_relations_reports_zero_based_lines() {
        let source = "<?php\nclass A extends Model {\npublic function b()\n{\nreturn $this->hasOne(B::class);\n}\n}";
        let relations = scan_relations_in_source(&pattern(), source);
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].line, 2);
    }

    #[test]
    fn test_model_payload_decodes_with_cast_overlay() {
        let payload = r#"[
            {"name":"User","class":"App\\Models\\User","file":"/app/Models/User.php","table":"users",
             "attributes":[
                {"name":"id","type":"int","cast":null},
                {"name":"email_verified_at","type":"datetime","cast":"datetime"}
             ]}
        ]"#;
        let records: Vec<ModelRecord> = serde_json::from_str(payload).unwrap();
        assert_eq!(records[0].attributes[1].type_name, "datetime");
        assert_eq!(records[0].attributes[1].cast.as_deref(), Some("datetime"));
        assert!(records[0].relations.is_empty());
    }
}

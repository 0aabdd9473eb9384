//
// handlers.rs
//
// Completion, definition, and diagnostics over the repository contract.
// Everything here consumes the five-method repository surface only;
// presentation stays at labels, kinds, and detail strings.
//

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionResponse, CompletionTextEdit, Diagnostic,
    DiagnosticSeverity, Location, Position, Range, TextEdit, Url,
};

use crate::category::{dispatch, Category};
use crate::context::FunctionCallContext;
use crate::documents::char_to_utf16_offset;
use crate::repository::Repository;
use crate::state::{Repositories, SessionState};

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

pub fn completion(state: &SessionState, uri: &Url, position: Position) -> Option<CompletionResponse> {
    let repos = state.repos.as_ref()?;
    let (line, cursor) = state.documents.line_at(uri, position)?;

    // Lexical triggers that are not function calls in this grammar; they
    // bypass the call-context parser entirely.
    if let Some(prefix) = state.parser.component_tag_at_cursor(&line, cursor) {
        let items = component_tag_items(repos, &prefix);
        return Some(CompletionResponse::Array(items));
    }
    if let Some(prefix) = state.parser.livewire_tag_at_cursor(&line, cursor) {
        let items = repos
            .livewire
            .search(&prefix)
            .into_iter()
            .map(|r| item(&r.name, CompletionItemKind::CLASS, Some(r.class)))
            .collect();
        return Some(CompletionResponse::Array(items));
    }
    if state.parser.directive_at_cursor(&line, cursor).is_some() {
        // Directive snippets are static presentation data served elsewhere.
        return None;
    }

    let ctx = state.parser.get_context(&line, cursor)?;
    let category = dispatch(&ctx.function_name, ctx.class_name.as_deref())?;
    let replace = replace_range(&line, position.line, &ctx);

    let items: Vec<CompletionItem> = match category {
        Category::Route => repos
            .routes
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| item(&r.name, CompletionItemKind::VALUE, Some(format!("/{}", r.uri))))
            .collect(),
        Category::View => repos
            .views
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| item(&r.name, CompletionItemKind::FILE, None))
            .collect(),
        Category::Config => repos
            .configs
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| {
                let detail = if r.has_children {
                    Some("(+ children)".to_string())
                } else {
                    r.value.clone()
                };
                item(&r.key, CompletionItemKind::PROPERTY, detail)
            })
            .collect(),
        Category::Translation => repos
            .translations
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| item(&r.key, CompletionItemKind::VALUE, Some(r.value.clone())))
            .collect(),
        Category::Env => repos
            .env_vars
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| item(&r.key, CompletionItemKind::CONSTANT, Some(r.value.clone())))
            .collect(),
        Category::Middleware => repos
            .middleware
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| item(&r.name, CompletionItemKind::CLASS, Some(r.class.clone())))
            .collect(),
        Category::Model => repos
            .models
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| item(&r.name, CompletionItemKind::CLASS, Some(r.class.clone())))
            .collect(),
        Category::ValidationRule => repos
            .validation
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| {
                let detail = r.class.clone();
                item(&r.name, CompletionItemKind::ENUM_MEMBER, detail)
            })
            .collect(),
        Category::BladeComponent => component_tag_items(repos, &ctx.prefix),
        Category::LivewireComponent => repos
            .livewire
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| item(&r.name, CompletionItemKind::CLASS, Some(r.class.clone())))
            .collect(),
        Category::InertiaPage => repos
            .inertia
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| item(&r.name, CompletionItemKind::FILE, None))
            .collect(),
        Category::Auth => repos
            .auth
            .search(&ctx.prefix)
            .into_iter()
            .map(|r| item(&r.name, CompletionItemKind::FUNCTION, r.class.clone()))
            .collect(),
        Category::ModelColumn => {
            let model = resolve_model_name(&line)?;
            let record = repos.models.find_by_name(&model)?;
            record
                .attributes
                .iter()
                .filter(|a| matches_prefix(&a.name, &ctx.prefix))
                .map(|a| item(&a.name, CompletionItemKind::FIELD, Some(a.type_name.clone())))
                .collect()
        }
        Category::ModelRelation => {
            let model = resolve_model_name(&line)?;
            let record = repos.models.find_by_name(&model)?;
            record
                .relations
                .iter()
                .filter(|r| matches_prefix(&r.name, &ctx.prefix))
                .map(|r| item(&r.name, CompletionItemKind::METHOD, Some(r.kind.clone())))
                .collect()
        }
    };

    let items = items
        .into_iter()
        .map(|mut i| {
            i.text_edit = Some(CompletionTextEdit::Edit(TextEdit {
                range: replace,
                new_text: i.label.clone(),
            }));
            i
        })
        .collect();
    Some(CompletionResponse::Array(items))
}

fn component_tag_items(repos: &Repositories, prefix: &str) -> Vec<CompletionItem> {
    repos
        .components
        .search(prefix)
        .into_iter()
        .map(|r| item(&r.name, CompletionItemKind::PROPERTY, None))
        .collect()
}

fn item(label: &str, kind: CompletionItemKind, detail: Option<String>) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind: Some(kind),
        detail,
        ..CompletionItem::default()
    }
}

fn matches_prefix(name: &str, prefix: &str) -> bool {
    prefix.is_empty() || name.to_lowercase().contains(&prefix.to_lowercase())
}

fn replace_range(line: &str, line_number: u32, ctx: &FunctionCallContext) -> Range {
    let start = char_to_utf16_offset(line, ctx.range.start) as u32;
    let end = char_to_utf16_offset(line, ctx.range.end) as u32;
    Range {
        start: Position::new(line_number, start),
        end: Position::new(line_number, end),
    }
}

/// Secondary model resolution for query-builder calls: the receiver written
/// as a static class on the same line (`User::where(`), lexically.
fn resolve_model_name(line: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"([A-Z][A-Za-z0-9_]*)::(?:query\(\)|where|with|has|orderBy)").expect("model receiver pattern")
    });
    pattern
        .captures(line)
        .map(|caps| caps[1].to_string())
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

pub fn definition(state: &SessionState, uri: &Url, position: Position) -> Option<Location> {
    let repos = state.repos.as_ref()?;
    let (line, cursor) = state.documents.line_at(uri, position)?;

    // Component tags are not quoted strings; resolve them separately.
    if let Some(tag) = component_tag_containing(&line, cursor) {
        let record = repos.components.find_by_name(&tag)?;
        return location_at(&record.path, 0);
    }

    let ctx = state.parser.get_string_at_position(&line, cursor)?;
    let category = dispatch(&ctx.function_name, ctx.class_name.as_deref())?;
    let name = ctx.prefix;

    match category {
        Category::Route => {
            let record = repos.routes.find_by_name(&name)?;
            location_at(Path::new(record.file.as_deref()?), record.line.unwrap_or(1).saturating_sub(1))
        }
        Category::View => {
            let record = repos.views.find_by_name(&name)?;
            location_at(&record.path, 0)
        }
        Category::Config => {
            // Config entries come from the runtime; jump to the top-level
            // config file for the key's first segment.
            repos.configs.find_by_key(&name)?;
            let group = name.split('.').next()?;
            let file = state.project.root.join("config").join(format!("{group}.php"));
            location_at(&file, 0)
        }
        Category::Translation => {
            let record = repos.translations.find_by_key(&name)?;
            location_at(&record.path, record.line)
        }
        Category::Env => {
            let record = repos.env_vars.find_by_key(&name)?;
            let file = if record.from_example {
                state.project.root.join(".env.example")
            } else {
                state.project.root.join(".env")
            };
            location_at(&file, record.line)
        }
        Category::Middleware => {
            let record = repos.middleware.find_by_name(&name)?;
            location_at(
                Path::new(record.file.as_deref()?),
                record.line.unwrap_or(1).saturating_sub(1),
            )
        }
        Category::Model => {
            let record = repos.models.find_by_name(&name)?;
            location_at(Path::new(&record.file), 0)
        }
        Category::ValidationRule => {
            let record = repos.validation.find_by_name(&name)?;
            location_at(Path::new(record.file.as_deref()?), 0)
        }
        Category::BladeComponent => {
            let record = repos.components.find_by_name(&name)?;
            location_at(&record.path, 0)
        }
        Category::LivewireComponent => {
            let record = repos.livewire.find_by_name(&name)?;
            location_at(&record.path, 0)
        }
        Category::InertiaPage => {
            let record = repos.inertia.find_by_name(&name)?;
            location_at(&record.path, 0)
        }
        Category::Auth => {
            let record = repos.auth.find_by_name(&name)?;
            location_at(
                Path::new(record.file.as_deref()?),
                record.line.unwrap_or(1).saturating_sub(1),
            )
        }
        Category::ModelColumn | Category::ModelRelation => {
            let model = resolve_model_name(&line)?;
            let record = repos.models.find_by_name(&model)?;
            let line_no = record
                .relations
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.line)
                .unwrap_or(0);
            location_at(Path::new(&record.file), line_no)
        }
    }
}

fn component_tag_containing(line: &str, cursor: usize) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"<x-([A-Za-z0-9_.:-]+)").expect("component tag pattern"));
    for caps in pattern.captures_iter(line) {
        let whole = caps.get(0)?;
        let start = line[..whole.start()].chars().count();
        let end = start + whole.as_str().chars().count();
        if cursor >= start && cursor <= end {
            return Some(caps[1].to_string());
        }
    }
    None
}

fn location_at(path: &Path, line: u32) -> Option<Location> {
    let uri = Url::from_file_path(path).ok()?;
    let position = Position::new(line, 0);
    Some(Location {
        uri,
        range: Range {
            start: position,
            end: position,
        },
    })
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

struct RefPattern {
    pattern: Regex,
    category: Category,
    label: &'static str,
}

fn ref_patterns() -> &'static [RefPattern] {
    static PATTERNS: OnceLock<Vec<RefPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let make = |re: &str, category, label| RefPattern {
            pattern: Regex::new(re).expect("ref pattern"),
            category,
            label,
        };
        vec![
            make(
                r#"\bview\(\s*['"]([^'"]+)['"]"#,
                Category::View,
                "view",
            ),
            make(
                r#"\b(?:route|to_route)\(\s*['"]([^'"]+)['"]"#,
                Category::Route,
                "route",
            ),
            make(
                r#"\bconfig\(\s*['"]([^'"]+)['"]"#,
                Category::Config,
                "config key",
            ),
            make(
                r#"(?:\b__|\btrans|@lang)\(\s*['"]([^'"]+)['"]"#,
                Category::Translation,
                "translation key",
            ),
            make(
                r#"\benv\(\s*['"]([^'"]+)['"]"#,
                Category::Env,
                "env var",
            ),
        ]
    })
}

/// Flag string references that resolve to no record. A domain whose
/// repository is empty is skipped entirely: an empty snapshot usually means
/// a failed or missing load, and flagging everything would be noise.
pub fn diagnostics(state: &SessionState, uri: &Url) -> Vec<Diagnostic> {
    let Some(repos) = state.repos.as_ref() else {
        return Vec::new();
    };
    let Some(text) = state.documents.text(uri) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        for rp in ref_patterns() {
            for caps in rp.pattern.captures_iter(line) {
                let Some(group) = caps.get(1) else { continue };
                let Some(whole) = caps.get(0) else { continue };
                let name = group.as_str();
                // Interpolated or concatenated names cannot be checked.
                if name.contains('$') || name.contains('{') {
                    continue;
                }
                if line[whole.end()..].trim_start().starts_with('.') {
                    continue;
                }
                if resolves(repos, rp.category, name) {
                    continue;
                }
                let start = char_to_utf16_offset(line, line[..group.start()].chars().count());
                let end = start + name.chars().map(|c| c.len_utf16()).sum::<usize>();
                out.push(Diagnostic {
                    range: Range {
                        start: Position::new(line_no as u32, start as u32),
                        end: Position::new(line_no as u32, end as u32),
                    },
                    severity: Some(DiagnosticSeverity::WARNING),
                    source: Some("lantern".to_string()),
                    message: format!("Unknown {} '{}'", rp.label, name),
                    ..Diagnostic::default()
                });
            }
        }
    }
    out
}

fn resolves(repos: &Repositories, category: Category, name: &str) -> bool {
    match category {
        Category::View => repos.views.count() == 0 || repos.views.find_by_name(name).is_some(),
        Category::Route => repos.routes.count() == 0 || repos.routes.find_by_name(name).is_some(),
        Category::Config => {
            repos.configs.count() == 0 || repos.configs.find_by_key(name).is_some()
        }
        Category::Translation => {
            if repos.translations.count() == 0 {
                return true;
            }
            if repos.translations.find_by_key(name).is_some() {
                return true;
            }
            // Referencing a whole group returns the nested array; treat a
            // key-prefix match as resolving.
            let group_prefix = format!("{name}.");
            repos
                .translations
                .search("")
                .iter()
                .any(|r| r.key.starts_with(&group_prefix))
        }
        Category::Env => {
            repos.env_vars.count() == 0 || repos.env_vars.find_by_key(name).is_some()
        }
        _ => true,
    }
}

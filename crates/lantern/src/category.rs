//
// category.rs
//
// Maps a parsed call context to the data domain it references. Pure
// lookup against two static tables plus the Eloquent query-builder
// vocabulary; new domains are added by extending the enum, never by string
// comparison at call sites.
//

/// Semantic data domain inferred for a source reference site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Route,
    View,
    Config,
    Translation,
    Env,
    Middleware,
    Model,
    ValidationRule,
    BladeComponent,
    LivewireComponent,
    InertiaPage,
    Auth,
    /// Eloquent builder call naming a column; needs secondary model
    /// resolution by the caller.
    ModelColumn,
    /// Eloquent builder call naming a relation; needs secondary model
    /// resolution by the caller.
    ModelRelation,
}

/// Receiver classes whose name alone decides the domain, overriding any
/// function-name inference. Matched case-insensitively.
const BY_CLASS: &[(&str, Category)] = &[
    ("route", Category::Route),
    ("redirect", Category::Route),
    ("url", Category::Route),
    ("view", Category::View),
    ("config", Category::Config),
    ("lang", Category::Translation),
    ("trans", Category::Translation),
    ("gate", Category::Auth),
    ("inertia", Category::InertiaPage),
    ("validator", Category::ValidationRule),
];

/// Bare function and method names. Includes Blade directive call forms
/// (`@include(`, `@can(`), which reach the dispatcher with the `@`
/// stripped.
const BY_FUNCTION: &[(&str, Category)] = &[
    ("route", Category::Route),
    ("to_route", Category::Route),
    ("signedRoute", Category::Route),
    ("view", Category::View),
    ("render", Category::View),
    ("markdown", Category::View),
    ("include", Category::View),
    ("includeIf", Category::View),
    ("includeWhen", Category::View),
    ("includeUnless", Category::View),
    ("includeFirst", Category::View),
    ("extends", Category::View),
    ("each", Category::View),
    ("component", Category::BladeComponent),
    ("config", Category::Config),
    ("__", Category::Translation),
    ("trans", Category::Translation),
    ("trans_choice", Category::Translation),
    ("lang", Category::Translation),
    ("choice", Category::Translation),
    ("env", Category::Env),
    ("middleware", Category::Middleware),
    ("withoutMiddleware", Category::Middleware),
    ("can", Category::Auth),
    ("cannot", Category::Auth),
    ("cant", Category::Auth),
    ("allows", Category::Auth),
    ("denies", Category::Auth),
    ("authorize", Category::Auth),
    ("livewire", Category::LivewireComponent),
    ("inertia", Category::InertiaPage),
    ("validate", Category::ValidationRule),
];

/// Eloquent query-builder methods naming a column.
const COLUMN_METHODS: &[&str] = &[
    "where",
    "whereNot",
    "whereIn",
    "whereNotIn",
    "whereNull",
    "whereNotNull",
    "whereBetween",
    "whereColumn",
    "whereDate",
    "whereTime",
    "orWhere",
    "orWhereIn",
    "orWhereNull",
    "orderBy",
    "orderByDesc",
    "groupBy",
    "value",
    "pluck",
    "min",
    "max",
    "sum",
    "avg",
    "firstWhere",
];

/// Eloquent query-builder methods naming a relation.
const RELATION_METHODS: &[&str] = &[
    "with",
    "without",
    "has",
    "orHas",
    "whereHas",
    "orWhereHas",
    "doesntHave",
    "whereDoesntHave",
    "withCount",
    "withSum",
    "withAvg",
    "withExists",
    "load",
    "loadMissing",
    "loadCount",
];

/// Decide the domain for a `(function_name, class_name?)` pair.
///
/// Precedence: receiver class first, then function name, then the
/// query-builder vocabulary. `None` means the caller performs no
/// completion, definition, or diagnostic at that position.
pub fn dispatch(function_name: &str, class_name: Option<&str>) -> Option<Category> {
    if let Some(class) = class_name {
        let class = class.to_lowercase();
        if let Some(&(_, category)) = BY_CLASS.iter().find(|(name, _)| *name == class) {
            return Some(category);
        }
        // An unknown receiver with a builder-vocabulary method is still a
        // model scope (`User::where(...)`).
        return builder_category(function_name);
    }

    if let Some(&(_, category)) = BY_FUNCTION
        .iter()
        .find(|(name, _)| *name == function_name)
    {
        return Some(category);
    }

    builder_category(function_name)
}

fn builder_category(function_name: &str) -> Option<Category> {
    if COLUMN_METHODS.contains(&function_name) {
        return Some(Category::ModelColumn);
    }
    if RELATION_METHODS.contains(&function_name) {
        return Some(Category::ModelRelation);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_overrides_function_name() {
        // `Route::has(` — `has` alone is a relation method, but the
        // receiver class decides.
        assert_eq!(dispatch("has", Some("Route")), Some(Category::Route));
        assert_eq!(dispatch("get", Some("Config")), Some(Category::Config));
        assert_eq!(dispatch("make", Some("View")), Some(Category::View));
        assert_eq!(dispatch("allows", Some("Gate")), Some(Category::Auth));
        assert_eq!(dispatch("render", Some("Inertia")), Some(Category::InertiaPage));
    }

    #[test]
    fn test_class_match_is_case_insensitive() {
        assert_eq!(dispatch("has", Some("route")), Some(Category::Route));
        assert_eq!(dispatch("has", Some("ROUTE")), Some(Category::Route));
    }

    #[test]
    fn test_function_table() {
        assert_eq!(dispatch("route", None), Some(Category::Route));
        assert_eq!(dispatch("view", None), Some(Category::View));
        assert_eq!(dispatch("config", None), Some(Category::Config));
        assert_eq!(dispatch("__", None), Some(Category::Translation));
        assert_eq!(dispatch("trans_choice", None), Some(Category::Translation));
        assert_eq!(dispatch("env", None), Some(Category::Env));
        assert_eq!(dispatch("middleware", None), Some(Category::Middleware));
        assert_eq!(dispatch("can", None), Some(Category::Auth));
        assert_eq!(dispatch("livewire", None), Some(Category::LivewireComponent));
        assert_eq!(dispatch("inertia", None), Some(Category::InertiaPage));
        assert_eq!(dispatch("validate", None), Some(Category::ValidationRule));
    }

    #[test]
    fn test_builder_vocabulary() {
        assert_eq!(dispatch("where", None), Some(Category::ModelColumn));
        assert_eq!(dispatch("orderBy", None), Some(Category::ModelColumn));
        assert_eq!(dispatch("with", None), Some(Category::ModelRelation));
        assert_eq!(dispatch("whereHas", None), Some(Category::ModelRelation));
    }

    #[test]
    fn test_builder_vocabulary_through_model_receiver() {
        assert_eq!(dispatch("where", Some("User")), Some(Category::ModelColumn));
        assert_eq!(dispatch("with", Some("Post")), Some(Category::ModelRelation));
    }

    #[test]
    fn test_unrecognized_names_yield_none() {
        assert_eq!(dispatch("str_pad", None), None);
        assert_eq!(dispatch("frobnicate", Some("Widget")), None);
        assert_eq!(dispatch("", None), None);
    }
}

//
// context.rs
//
// Lexical call-context detection at the cursor. A per-keystroke scan of the
// current line against an ordered regex catalog; deliberately a heuristic
// in place of a PHP parser, kept behind this interface so an AST-based
// implementation could be substituted without touching the dispatcher or
// the repositories.
//

use std::ops::Range;

use regex::Regex;

/// Call context enclosing the cursor. Ephemeral, produced per keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCallContext {
    pub function_name: String,
    /// Receiver class for static calls, e.g. `Route` in `Route::has(`.
    pub class_name: Option<String>,
    /// String-argument text typed so far (or the full string content for
    /// position-based lookups).
    pub prefix: String,
    pub full_match: String,
    /// Character-column range of the prefix within its line.
    pub range: Range<usize>,
}

pub struct ContextParser {
    static_call: Regex,
    function_call: Regex,
    method_call: Regex,
    directive_call: Regex,
    directive_trigger: Regex,
    component_trigger: Regex,
    livewire_trigger: Regex,
}

impl Default for ContextParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextParser {
    pub fn new() -> Self {
        // Each call pattern requires an open parenthesis followed by an
        // unterminated quoted string ending exactly at the cursor.
        Self {
            static_call: Regex::new(
                r#"([A-Za-z_][A-Za-z0-9_]*)::([A-Za-z_][A-Za-z0-9_]*)\(\s*['"]([^'"]*)$"#,
            )
            .expect("static call pattern"),
            function_call: Regex::new(
                r#"(?:^|[^\w$>:@])([A-Za-z_][A-Za-z0-9_]*)\(\s*['"]([^'"]*)$"#,
            )
            .expect("function call pattern"),
            method_call: Regex::new(r#"->([A-Za-z_][A-Za-z0-9_]*)\(\s*['"]([^'"]*)$"#)
                .expect("method call pattern"),
            directive_call: Regex::new(r#"@([A-Za-z_][A-Za-z0-9_]*)\(\s*['"]([^'"]*)$"#)
                .expect("directive call pattern"),
            directive_trigger: Regex::new(r"(?:^|[^\w@])@([A-Za-z][A-Za-z0-9_]*)$")
                .expect("directive trigger"),
            component_trigger: Regex::new(r"<x-([A-Za-z0-9_.:-]*)$").expect("component trigger"),
            livewire_trigger: Regex::new(r"<livewire:([A-Za-z0-9_.-]*)$").expect("livewire trigger"),
        }
    }

    /// Detect the call context for a cursor sitting inside an unterminated
    /// string argument. `cursor` is a character offset into `line`.
    ///
    /// Patterns are tried in a fixed priority order; the first match wins.
    /// Static-method detection runs before bare-function detection so
    /// `Route::has('` is not misread as a call to `has`.
    pub fn get_context(&self, line: &str, cursor: usize) -> Option<FunctionCallContext> {
        let head = char_slice(line, cursor);

        if let Some(caps) = self.static_call.captures(head) {
            return Some(make_context(
                head,
                &caps,
                caps.get(2)?.as_str(),
                Some(caps.get(1)?.as_str()),
                3,
            ));
        }
        if let Some(caps) = self.function_call.captures(head) {
            return Some(make_context(head, &caps, caps.get(1)?.as_str(), None, 2));
        }
        if let Some(caps) = self.method_call.captures(head) {
            return Some(make_context(head, &caps, caps.get(1)?.as_str(), None, 2));
        }
        if let Some(caps) = self.directive_call.captures(head) {
            return Some(make_context(head, &caps, caps.get(1)?.as_str(), None, 2));
        }
        None
    }

    /// Variant for go-to-definition: the cursor may be anywhere inside a
    /// complete quoted string. Scans backward for the nearest unescaped
    /// quote, forward for its match, re-derives the call context at the
    /// string start, and substitutes the full string content as the
    /// effective prefix.
    pub fn get_string_at_position(&self, line: &str, cursor: usize) -> Option<FunctionCallContext> {
        let chars: Vec<char> = line.chars().collect();
        if cursor > chars.len() {
            return None;
        }

        // Nearest unescaped quote of either style, scanning backward.
        let mut open = None;
        for i in (0..cursor.min(chars.len())).rev() {
            let ch = chars[i];
            if (ch == '\'' || ch == '"') && (i == 0 || chars[i - 1] != '\\') {
                open = Some((i, ch));
                break;
            }
        }
        let (open_at, quote) = open?;

        // Matching close quote, scanning forward from the cursor.
        let mut close = None;
        for (i, &ch) in chars.iter().enumerate().skip(cursor.max(open_at + 1)) {
            if ch == quote && chars[i - 1] != '\\' {
                close = Some(i);
                break;
            }
        }
        let close_at = close?;

        let content: String = chars[open_at + 1..close_at].iter().collect();
        let base = self.get_context(line, open_at + 1)?;
        Some(FunctionCallContext {
            prefix: content,
            range: open_at + 1..close_at,
            ..base
        })
    }

    /// Line ending in `@word`: a template directive reference, not a
    /// function call. Checked by callers before `get_context`.
    pub fn directive_at_cursor(&self, line: &str, cursor: usize) -> Option<String> {
        let head = char_slice(line, cursor);
        self.directive_trigger
            .captures(head)
            .map(|caps| caps[1].to_string())
    }

    /// Line ending in `<x-word`: a Blade component tag. Checked by callers
    /// before `get_context`.
    pub fn component_tag_at_cursor(&self, line: &str, cursor: usize) -> Option<String> {
        let head = char_slice(line, cursor);
        self.component_trigger
            .captures(head)
            .map(|caps| caps[1].to_string())
    }

    /// Line ending in `<livewire:word`: a Livewire component tag.
    pub fn livewire_tag_at_cursor(&self, line: &str, cursor: usize) -> Option<String> {
        let head = char_slice(line, cursor);
        self.livewire_trigger
            .captures(head)
            .map(|caps| caps[1].to_string())
    }
}

fn make_context(
    head: &str,
    caps: &regex::Captures<'_>,
    function_name: &str,
    class_name: Option<&str>,
    prefix_group: usize,
) -> FunctionCallContext {
    let prefix = caps.get(prefix_group).map(|m| m.as_str()).unwrap_or("");
    let prefix_start = caps
        .get(prefix_group)
        .map(|m| head[..m.start()].chars().count())
        .unwrap_or(0);
    let prefix_len = prefix.chars().count();
    FunctionCallContext {
        function_name: function_name.to_string(),
        class_name: class_name.map(String::from),
        prefix: prefix.to_string(),
        full_match: caps.get(0).map(|m| m.as_str()).unwrap_or("").to_string(),
        range: prefix_start..prefix_start + prefix_len,
    }
}

/// Slice a line at a character offset without panicking on multi-byte text.
fn char_slice(line: &str, cursor: usize) -> &str {
    match line.char_indices().nth(cursor) {
        Some((byte, _)) => &line[..byte],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ContextParser {
        ContextParser::new()
    }

    fn at_end(line: &str) -> usize {
        line.chars().count()
    }

    #[test]
    fn test_static_method_call() {
        let line = "Route::has('users.";
        let ctx = parser().get_context(line, at_end(line)).unwrap();
        assert_eq!(ctx.class_name.as_deref(), Some("Route"));
        assert_eq!(ctx.function_name, "has");
        assert_eq!(ctx.prefix, "users.");
    }

    #[test]
    fn test_bare_function_call_with_empty_prefix() {
        let line = "__('";
        let ctx = parser().get_context(line, at_end(line)).unwrap();
        assert_eq!(ctx.function_name, "__");
        assert_eq!(ctx.class_name, None);
        assert_eq!(ctx.prefix, "");
    }

    #[test]
    fn test_function_call_mid_line() {
        let line = "    $title = view('admin.da";
        let ctx = parser().get_context(line, at_end(line)).unwrap();
        assert_eq!(ctx.function_name, "view");
        assert_eq!(ctx.prefix, "admin.da");
    }

    #[test]
    fn test_method_chain_call() {
        let line = "$query->where('na";
        let ctx = parser().get_context(line, at_end(line)).unwrap();
        assert_eq!(ctx.function_name, "where");
        assert_eq!(ctx.class_name, None);
        assert_eq!(ctx.prefix, "na");
    }

    #[test]
    fn test_directive_call() {
        let line = "@lang('auth.";
        let ctx = parser().get_context(line, at_end(line)).unwrap();
        assert_eq!(ctx.function_name, "lang");
        assert_eq!(ctx.prefix, "auth.");
    }

    #[test]
    fn test_static_wins_over_function() {
        // `has` must not be read as a bare function.
        let line = "if (Route::has('login";
        let ctx = parser().get_context(line, at_end(line)).unwrap();
        assert_eq!(ctx.class_name.as_deref(), Some("Route"));
        assert_eq!(ctx.function_name, "has");
    }

    #[test]
    fn test_no_context_outside_string_argument() {
        for line in ["$x = 1 + 2", "route(", "route('done')", "plain text"] {
            assert!(parser().get_context(line, at_end(line)).is_none(), "{line}");
        }
    }

    #[test]
    fn test_cursor_mid_line_ignores_tail() {
        let line = "view('users.index') + other()";
        // Cursor right after `users.` — the terminating quote is beyond it.
        let ctx = parser().get_context(line, 11).unwrap();
        assert_eq!(ctx.function_name, "view");
        assert_eq!(ctx.prefix, "users");
    }

    #[test]
    fn test_double_quoted_argument() {
        let line = r#"config("app."#;
        let ctx = parser().get_context(line, at_end(line)).unwrap();
        assert_eq!(ctx.function_name, "config");
        assert_eq!(ctx.prefix, "app.");
    }

    #[test]
    fn test_prefix_range_in_characters() {
        let line = "route('users.";
        let ctx = parser().get_context(line, at_end(line)).unwrap();
        assert_eq!(ctx.range, 7..13);
    }

    #[test]
    fn test_get_string_at_position_inside_complete_string() {
        let line = "return view('admin.users.index');";
        // Cursor inside the string content.
        let cursor = line.find("users").unwrap() + 2;
        let ctx = parser().get_string_at_position(line, cursor).unwrap();
        assert_eq!(ctx.function_name, "view");
        assert_eq!(ctx.prefix, "admin.users.index");
        assert_eq!(ctx.range, 13..30);
    }

    #[test]
    fn test_get_string_at_position_requires_call_context() {
        let line = "$name = 'loose string';";
        let cursor = line.find("loose").unwrap() + 1;
        assert!(parser().get_string_at_position(line, cursor).is_none());
    }

    #[test]
    fn test_get_string_at_position_static_call() {
        let line = "Gate::allows('update-post')";
        let cursor = line.find("update").unwrap() + 3;
        let ctx = parser().get_string_at_position(line, cursor).unwrap();
        assert_eq!(ctx.class_name.as_deref(), Some("Gate"));
        assert_eq!(ctx.prefix, "update-post");
    }

    #[test]
    fn test_component_tag_trigger() {
        let line = "    <x-forms.inp";
        let parser = parser();
        assert_eq!(
            parser.component_tag_at_cursor(line, at_end(line)).as_deref(),
            Some("forms.inp")
        );
        // The generic parser yields nothing for a tag position.
        assert!(parser.get_context(line, at_end(line)).is_none());
    }

    #[test]
    fn test_livewire_tag_trigger() {
        let line = "<livewire:admin.user-";
        assert_eq!(
            parser().livewire_tag_at_cursor(line, at_end(line)).as_deref(),
            Some("admin.user-")
        );
    }

    #[test]
    fn test_directive_trigger() {
        let line = "    @auth";
        assert_eq!(
            parser().directive_at_cursor(line, at_end(line)).as_deref(),
            Some("auth")
        );
        assert_eq!(parser().directive_at_cursor("user@example", 12), None);
    }

    #[test]
    fn test_multibyte_line_does_not_panic() {
        let line = "view('héllo.wörld";
        let ctx = parser().get_context(line, at_end(line)).unwrap();
        assert_eq!(ctx.prefix, "héllo.wörld");
    }
}

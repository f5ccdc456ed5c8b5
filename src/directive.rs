//! Document-level directives handled outside the block tree: comment
//! shields, `{{ $name = expr }}` declarations, include directives and
//! `{{!key}}` placeholders.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::context::{Bindings, Context};
use crate::error::{DiagnosticKind, Diagnostics, RenderError};
use crate::eval::evaluate;
use crate::value::Value;

static COMMENT_DIRECTIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!--\s*\{\{.+?\}\}\s*-->").unwrap());

static DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*\$(\w+)\s*=\s*(.*?)\s*\}\}").unwrap());

/// A declaration that is the only thing on its line, line ending included.
static DECLARATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\{\{\s*\$\w+\s*=(?:[^}\n]|\}[^}\n])*?\}\}[ \t]*(?:\r?\n|$)").unwrap());

static INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*!?include\s*\(((?:"[^"]*"|'[^']*'|[^)])*)\)\s*\}\}"#).unwrap()
});

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{!\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\}\}").unwrap());

static QUOTES: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^['"]|['"]$"#).unwrap());

/// Remove directives shielded by an HTML comment, e.g. `<!-- {{?draft}} -->`.
pub fn strip_comment_directives(text: &str) -> String {
    COMMENT_DIRECTIVE.replace_all(text, "").into_owned()
}

/// Collect `{{ $name = expr }}` declarations in source order.
///
/// Each value is evaluated once against an empty context. When that fails the
/// raw text is kept as a string with its surrounding quotes removed.
pub fn parse_declarations(text: &str) -> Bindings {
    let empty = Context::new();
    DECLARATION
        .captures_iter(text)
        .map(|caps| (caps[1].to_string(), literal_or_string(&caps[2], &empty)))
        .collect()
}

/// Delete declarations from the text. A declaration alone on its line takes
/// the line with it.
pub fn strip_declarations(text: &str) -> String {
    let without_lines = DECLARATION_LINE.replace_all(text, "");
    DECLARATION.replace_all(&without_lines, "").into_owned()
}

/// Evaluate `raw` as an expression, or fall back to it as a literal string.
pub fn literal_or_string(raw: &str, ctx: &Context) -> Value {
    let raw = raw.trim();
    match evaluate(raw, ctx) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(raw, error = %e, "treating value as literal text");
            Value::String(strip_quotes(raw))
        }
    }
}

pub fn strip_quotes(raw: &str) -> String {
    QUOTES.replace_all(raw, "").into_owned()
}

/// Split on commas that are not inside a `'…'` or `"…"` pair or inside
/// brackets, so list and mapping literals survive as one argument.
pub fn split_args(args: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in args.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' | '{' | '(' => depth += 1,
                ']' | '}' | ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    result.push(current.trim().to_string());
                    current.clear();
                    continue;
                }
                _ => {}
            },
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        result.push(current.trim().to_string());
    }
    result
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    pub path: String,
    pub args: Bindings,
}

/// An include directive found in text: its byte range and raw argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeMatch {
    pub range: Range<usize>,
    pub args: String,
}

pub fn find_includes(text: &str) -> Vec<IncludeMatch> {
    INCLUDE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(IncludeMatch {
                range: whole.range(),
                args: caps[1].to_string(),
            })
        })
        .collect()
}

/// Parse `"path", key=value, …`. Values are evaluated against `ctx` when
/// possible; tokens without `=` are skipped with a diagnostic.
pub fn parse_include(
    args: &str,
    ctx: &Context,
    diagnostics: &mut Diagnostics,
) -> Result<IncludeDirective, RenderError> {
    let tokens = split_args(args);
    let path = tokens
        .first()
        .map(|t| strip_quotes(t))
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| RenderError::InvalidInclude(args.to_string()))?;

    let mut bindings = Bindings::new();
    for token in tokens.iter().skip(1) {
        match token.split_once('=') {
            Some((key, raw)) if !key.trim().is_empty() => {
                bindings.push((key.trim().to_string(), literal_or_string(raw, ctx)));
            }
            _ => diagnostics.push(
                DiagnosticKind::Include,
                format!("include({args}): ignored argument {token:?}, expected key=value"),
            ),
        }
    }

    Ok(IncludeDirective {
        path: path.trim().to_string(),
        args: bindings,
    })
}

/// Replace `{{!key}}` placeholders bound in `ctx`; unknown keys stay as they are.
pub fn substitute_placeholders(text: &str, ctx: &Context) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| match ctx.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_shielded_directives_are_removed() {
        let text = "a<!-- {{?secret}} -->b<!-- plain -->c";
        assert_eq!(strip_comment_directives(text), "ab<!-- plain -->c");
    }

    #[test]
    fn declarations_in_source_order_with_overwrite() {
        let text = r#"{{ $title = "Home" }}{{$n = 1 + 2}}{{ $title = 'Again' }}{{$raw = not valid(}}"#;
        let decls = parse_declarations(text);
        assert_eq!(
            decls,
            vec![
                ("title".to_string(), Value::from("Home")),
                ("n".to_string(), Value::Number(3.0)),
                ("title".to_string(), Value::from("Again")),
                ("raw".to_string(), Value::from("not valid(")),
            ]
        );
        let ctx = Context::new().child(&decls);
        assert_eq!(ctx.get("title"), Some(&Value::from("Again")));
    }

    #[test]
    fn declaration_lines_are_deleted() {
        let text = "  {{ $a = 1 }}\n<p>x {{$b = 2}}y</p>\n{{$c=3}}";
        let stripped = strip_declarations(text);
        assert_eq!(stripped, "<p>x y</p>\n");
        assert_eq!(strip_declarations(&stripped), stripped);
    }

    #[test]
    fn split_args_respects_quotes() {
        assert_eq!(
            split_args(r#""a.html", title="x, y", tag='p,q', xs=[1, {a: 2, b: 3}], n=3"#),
            vec![
                r#""a.html""#,
                r#"title="x, y""#,
                "tag='p,q'",
                "xs=[1, {a: 2, b: 3}]",
                "n=3"
            ]
        );
    }

    #[test]
    fn include_args_evaluate_or_fall_back_to_text() {
        let mut diags = Diagnostics::new();
        let ctx = Context::new().with("user", "Ada");
        let directive = parse_include(
            r#"'card.html', items=[1,2], who=user, label=Hello there, bare"#,
            &ctx,
            &mut diags,
        )
        .unwrap();
        assert_eq!(directive.path, "card.html");
        assert_eq!(
            directive.args,
            vec![
                ("items".to_string(), Value::from(vec![1i64, 2])),
                ("who".to_string(), Value::from("Ada")),
                ("label".to_string(), Value::from("Hello there")),
            ]
        );
        assert_eq!(diags.count(DiagnosticKind::Include), 1);
    }

    #[test]
    fn include_without_path_is_invalid() {
        let mut diags = Diagnostics::new();
        assert!(matches!(
            parse_include(" ", &Context::new(), &mut diags),
            Err(RenderError::InvalidInclude(_))
        ));
    }

    #[test]
    fn finds_both_include_spellings() {
        let text = r#"a{{ include("x.html", t=")") }}b{{!include('y.html')}}"#;
        let found = find_includes(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].args, r#""x.html", t=")""#);
        assert_eq!(&text[found[1].range.clone()], "{{!include('y.html')}}");
    }

    #[test]
    fn placeholders_substitute_known_keys_only() {
        let ctx = Context::new().with("name", "B").with("n", 2i64);
        assert_eq!(
            substitute_placeholders("{{!name}}-{{! n }}-{{!other}}", &ctx),
            "B-2-{{!other}}"
        );
    }
}

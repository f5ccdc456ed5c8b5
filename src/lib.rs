//! inku: recursive template-directive engine for HTML partials.
//!
//! The engine expands a small directive language embedded in HTML-like text
//! against a layered context and produces one flattened document:
//!
//! - `{{ $name = expr }}` declares a document-local variable.
//! - `{{?expr}}` interpolates an expression.
//! - `{{for(item in expr)}} … {{endfor}}` repeats its body per element of a
//!   list, or `n` times for a non-negative integer.
//! - `{{if(expr)}} … {{endif}}` keeps its body when the condition is truthy.
//!   Blocks of both kinds nest freely.
//! - `{{include("path", key=value, …)}}` splices another document, rendered
//!   with the arguments bound. Inside a loop the arguments see the loop
//!   variable. `{{!include(…)}}` resolves against the document instead.
//! - `{{!key}}` inside a partial is replaced after splicing.
//! - `<!-- {{…}} -->` hides a directive entirely.
//!
//! Expressions run in a small sandboxed interpreter (literals, variables,
//! member and index access, arithmetic, comparison, logic, `? :`). Nothing
//! in a template can reach the host beyond the values it is given.
//!
//! Whitespace is output: text between directives is copied verbatim and the
//! engine never adds or trims newlines, except that a declaration standing
//! alone on its line removes that line.
//!
//! Broken expressions, malformed `for` headers, unmatched `endfor`/`endif`
//! and failed nested includes degrade the output and are reported as
//! diagnostics. Unclosed blocks and a
//! missing top-level document are errors.

pub mod ast;
pub mod config;
pub mod context;
pub mod directive;
pub mod engine;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod session;
pub mod source;
pub mod style;
pub mod value;

pub use config::EngineConfig;
pub use context::{Bindings, Context};
pub use engine::{Engine, PostProcessor, Rendered};
pub use error::{
    ConfigError, Diagnostic, DiagnosticKind, Diagnostics, EvalError, FetchError, ParseError, RenderError,
};
pub use eval::{evaluate, render_str};
pub use session::{route_from_hash, Presenter, RenderOutcome, Session};
pub use source::{ContentSource, FsSource, MemorySource};
pub use style::StyleRegistry;
pub use value::Value;

/// Render a single template string without fetching anything.
///
/// Comment-shielded directives and declarations are handled as for a
/// document; values in `ctx` win over declarations of the same name. Include
/// directives are left in the output untouched. Use [`Engine`] to resolve
/// them.
pub fn render_template(template: &str, ctx: &Context) -> Result<Rendered, ParseError> {
    let text = directive::strip_comment_directives(template);
    let declarations = directive::parse_declarations(&text);
    let text = directive::strip_declarations(&text);
    let frame = Context::new().child(&declarations).overlay(ctx);

    let mut diagnostics = Diagnostics::new();
    let output = render_str(&text, &frame, &mut diagnostics)?;
    Ok(Rendered {
        output,
        diagnostics: diagnostics.into_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Context {
        Context::new().with("messages", vec!["system", "user"])
    }

    #[test]
    fn simple_for_loop_over_list() {
        let template = "{{for(m in messages)}}{{?m}}: hi\n{{endfor}}";
        let rendered = render_template(template, &items()).unwrap();
        assert_eq!(rendered.output, "system: hi\nuser: hi\n");
    }

    #[test]
    fn for_loop_with_no_newlines_in_template() {
        // Template has no `\n` at all; engine must not invent any.
        let template = "{{for(m in messages)}}[{{?m}}]{{endfor}}";
        let rendered = render_template(template, &items()).unwrap();
        assert_eq!(rendered.output, "[system][user]");
    }

    #[test]
    fn multiple_sequential_loops_and_literals() {
        let template = "prefix-\n\
{{for(m in messages)}}A: {{?m}}\n{{endfor}}\
middle-\n\
{{for(m in messages)}}B: {{?m.length}}\n{{endfor}}suffix";

        let rendered = render_template(template, &items()).unwrap();
        let expected = concat!(
            "prefix-\n",
            "A: system\n",
            "A: user\n",
            "middle-\n",
            "B: 6\n",
            "B: 4\n",
            "suffix",
        );

        assert_eq!(rendered.output, expected);
    }

    #[test]
    fn malformed_for_missing_endfor_is_an_error() {
        let template = "before {{for(m in messages)}}broken";
        assert!(matches!(
            render_template(template, &items()),
            Err(ParseError::UnclosedBlock { .. })
        ));
    }

    #[test]
    fn declarations_yield_to_caller_context() {
        let template = "{{ $title = 'Default' }}\n{{ $lang = 'en' }}\n<title>{{?title}} ({{?lang}})</title>";
        let ctx = Context::new().with("title", "Given");
        let rendered = render_template(template, &ctx).unwrap();
        assert_eq!(rendered.output, "<title>Given (en)</title>");
    }

    #[test]
    fn include_directives_pass_through() {
        let template = r#"<main>{{include("nav.html", active="home")}}</main>"#;
        let rendered = render_template(template, &Context::new()).unwrap();
        assert_eq!(rendered.output, template);
    }
}

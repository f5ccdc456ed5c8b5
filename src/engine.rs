//! Include resolution: the full per-document pipeline.
//!
//! For every document the engine strips comment-shielded directives, reads
//! and removes declarations, renders the block tree against the document's
//! frame, then splices in each include directive of the rendered text in
//! source order. A partial is resolved completely, including its own
//! includes, before the next sibling starts.
//!
//! Frames compose as `inherited < declarations < caller arguments`. For the
//! top-level document the caller's base context plays the part of the
//! arguments.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::EngineConfig;
use crate::context::{Bindings, Context};
use crate::directive::{
    find_includes, parse_declarations, parse_include, strip_comment_directives, strip_declarations,
    substitute_placeholders,
};
use crate::error::{Diagnostic, DiagnosticKind, Diagnostics, RenderError};
use crate::eval::{Evaluator, Fragment};
use crate::lexer::tokenize;
use crate::parser::build;
use crate::source::{normalize_path, ContentSource};

/// Name used in errors for text rendered through [`Engine::render_text`].
pub const INLINE_DOCUMENT: &str = "<inline>";

/// Hook run over each fully resolved document before it is spliced into its
/// parent or returned.
pub trait PostProcessor: Send + Sync {
    fn process(&self, path: &str, html: String) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub output: String,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Engine<S> {
    source: S,
    config: EngineConfig,
    post_processors: Vec<Arc<dyn PostProcessor>>,
}

impl<S: ContentSource> Engine<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    pub fn with_config(source: S, config: EngineConfig) -> Self {
        Self {
            source,
            config,
            post_processors: Vec::new(),
        }
    }

    pub fn with_post_processor(mut self, processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch and fully resolve the document at `path`.
    ///
    /// Only failures of this document itself are returned as errors. A failed
    /// include anywhere below it is spliced as empty text and reported in
    /// [`Rendered::diagnostics`].
    pub async fn render(&self, path: &str, base: &Context) -> Result<Rendered, RenderError> {
        let mut diagnostics = Diagnostics::new();
        let mut chain = Vec::new();
        let args = bindings_of(base);
        let output = self
            .resolve_document(path, &Context::new(), &args, &mut chain, &mut diagnostics)
            .await?;
        Ok(Rendered {
            output,
            diagnostics: diagnostics.into_vec(),
        })
    }

    /// Resolve template text that did not come from the content source.
    /// Includes inside it are still fetched.
    pub async fn render_text(&self, text: &str, base: &Context) -> Result<Rendered, RenderError> {
        let mut diagnostics = Diagnostics::new();
        let mut chain = Vec::new();
        let args = bindings_of(base);
        let output = self
            .resolve_text(INLINE_DOCUMENT, text, &Context::new(), &args, &mut chain, &mut diagnostics)
            .await?;
        Ok(Rendered {
            output,
            diagnostics: diagnostics.into_vec(),
        })
    }

    fn resolve_document<'a>(
        &'a self,
        path: &'a str,
        inherited: &'a Context,
        args: &'a Bindings,
        chain: &'a mut Vec<String>,
        diagnostics: &'a mut Diagnostics,
    ) -> BoxFuture<'a, Result<String, RenderError>> {
        Box::pin(async move {
            let normalized = normalize_path(path);
            let path = normalized.as_str();
            if chain.iter().any(|p| p == path) {
                let mut cycle = chain.clone();
                cycle.push(path.to_string());
                return Err(RenderError::IncludeCycle { chain: cycle });
            }
            if chain.len() > self.config.max_include_depth {
                return Err(RenderError::DepthExceeded {
                    path: path.to_string(),
                    limit: self.config.max_include_depth,
                });
            }

            tracing::debug!(path, depth = chain.len(), "fetching document");
            let text = self
                .source
                .fetch(path)
                .await
                .map_err(|source| RenderError::Fetch {
                    path: path.to_string(),
                    source,
                })?;

            chain.push(path.to_string());
            let resolved = self
                .resolve_text(path, &text, inherited, args, chain, diagnostics)
                .await;
            chain.pop();

            let mut html = resolved?;
            for processor in &self.post_processors {
                html = processor.process(path, html);
            }
            Ok(html)
        })
    }

    async fn resolve_text(
        &self,
        path: &str,
        text: &str,
        inherited: &Context,
        args: &Bindings,
        chain: &mut Vec<String>,
        diagnostics: &mut Diagnostics,
    ) -> Result<String, RenderError> {
        let text = strip_comment_directives(text);
        let declarations = parse_declarations(&text);
        let text = strip_declarations(&text);
        let frame = inherited.child(&declarations).child(args);

        let structure = |source| RenderError::Structure {
            path: path.to_string(),
            source,
        };
        let template = build(tokenize(&text), diagnostics).map_err(structure)?;
        let fragments = Evaluator::new(diagnostics).render_fragments(&template, &frame);

        let mut out = String::with_capacity(text.len());
        for fragment in fragments {
            match fragment {
                Fragment::Text(text) => {
                    let resolved = self.resolve_includes(path, text, &frame, chain, diagnostics).await;
                    out.push_str(&resolved);
                }
                Fragment::Include(include) => {
                    let spliced = self
                        .splice(path, &include.args, &include.frame, chain, diagnostics)
                        .await;
                    out.push_str(&spliced);
                }
            }
        }
        Ok(out)
    }

    /// Resolve include directives still present in rendered text, such as
    /// `{{!include(...)}}`, against the document frame.
    async fn resolve_includes(
        &self,
        path: &str,
        text: String,
        frame: &Context,
        chain: &mut Vec<String>,
        diagnostics: &mut Diagnostics,
    ) -> String {
        let includes = find_includes(&text);
        if includes.is_empty() {
            return text;
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for include in includes {
            out.push_str(&text[last..include.range.start]);
            last = include.range.end;
            let spliced = self.splice(path, &include.args, frame, chain, diagnostics).await;
            out.push_str(&spliced);
        }
        out.push_str(&text[last..]);
        out
    }

    /// Resolve one include met in `frame`. Failures splice as empty text.
    async fn splice(
        &self,
        path: &str,
        args: &str,
        frame: &Context,
        chain: &mut Vec<String>,
        diagnostics: &mut Diagnostics,
    ) -> String {
        let directive = match parse_include(args, frame, diagnostics) {
            Ok(directive) => directive,
            Err(e) => {
                diagnostics.push(DiagnosticKind::Include, format!("{path}: {e}"));
                return String::new();
            }
        };

        tracing::debug!(parent = path, partial = %directive.path, "resolving include");
        match self
            .resolve_document(&directive.path, frame, &directive.args, chain, diagnostics)
            .await
        {
            Ok(partial) => {
                let scope = frame.child(&directive.args);
                substitute_placeholders(&partial, &scope)
            }
            Err(e) => {
                diagnostics.push(
                    DiagnosticKind::Include,
                    format!("{path}: include of {} skipped: {e}", directive.path),
                );
                String::new()
            }
        }
    }
}

fn bindings_of(ctx: &Context) -> Bindings {
    ctx.iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

//! A running document session: routes views, renders them through the
//! engine and hands finished output to a [`Presenter`].
//!
//! Each render takes a generation number. When a newer render has started by
//! the time an older one finishes, the older output is discarded rather than
//! presented, so the last navigation always wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::engine::Engine;
use crate::error::{Diagnostic, RenderError};
use crate::source::ContentSource;
use crate::style::StyleRegistry;

/// Receives the fully resolved output of a top-level render.
pub trait Presenter: Send + Sync {
    fn present(&self, view: &str, html: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Presented {
        view: String,
        generation: u64,
        diagnostics: Vec<Diagnostic>,
    },
    Superseded {
        view: String,
        generation: u64,
    },
}

/// View name for a location hash such as `#/about`.
pub fn route_from_hash(hash: &str, default_route: &str) -> String {
    let view = hash.trim().trim_start_matches('#').trim_start_matches('/');
    if view.is_empty() {
        default_route.to_string()
    } else {
        view.to_string()
    }
}

pub struct Session<S, P> {
    engine: Engine<S>,
    presenter: P,
    styles: Arc<StyleRegistry>,
    base: Context,
    generation: AtomicU64,
}

impl<S: ContentSource, P: Presenter> Session<S, P> {
    pub fn new(source: S, presenter: P, config: EngineConfig) -> Self {
        let styles = Arc::new(StyleRegistry::new());
        let extract_styles = config.extract_styles;
        let mut engine = Engine::with_config(source, config);
        if extract_styles {
            engine = engine.with_post_processor(styles.clone());
        }
        Self {
            engine,
            presenter,
            styles,
            base: Context::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_base_context(mut self, base: Context) -> Self {
        self.base = base;
        self
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    /// Generation of the most recently started render.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn navigate(&self, hash: &str) -> Result<RenderOutcome, RenderError> {
        let view = route_from_hash(hash, &self.engine.config().default_route);
        self.render_view(&view).await
    }

    pub async fn render_view(&self, view: &str) -> Result<RenderOutcome, RenderError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.engine.config().page_path(view);
        tracing::debug!(view, generation, %path, "rendering view");

        let rendered = self.engine.render(&path, &self.base).await?;

        let current = self.generation();
        if current != generation {
            tracing::debug!(view, generation, current, "discarding superseded render");
            return Ok(RenderOutcome::Superseded {
                view: view.to_string(),
                generation,
            });
        }

        self.presenter.present(view, &rendered.output);
        Ok(RenderOutcome::Presented {
            view: view.to_string(),
            generation,
            diagnostics: rendered.diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_from_hash() {
        assert_eq!(route_from_hash("#/about", "home"), "about");
        assert_eq!(route_from_hash("#/docs/intro", "home"), "docs/intro");
        assert_eq!(route_from_hash("", "home"), "home");
        assert_eq!(route_from_hash("#/", "home"), "home");
        assert_eq!(route_from_hash("contact", "home"), "contact");
    }
}

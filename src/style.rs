//! Stylesheet registry.
//!
//! Rendered documents may carry `<link rel="stylesheet">` tags. The registry
//! lifts them out of the text and remembers each href once, in the order it
//! was first seen, together with the document that brought it in. One
//! registry lives for one session; [`StyleRegistry::reset`] models a full
//! reload.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use crate::engine::PostProcessor;

static STYLE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<link\s+rel=["']stylesheet["']\s+href=["'](.+?)["'].*?>"#).unwrap()
});

static HTML_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleLink {
    pub href: String,
    /// Document that first referenced the stylesheet.
    pub owner: String,
}

#[derive(Debug, Default)]
pub struct StyleRegistry {
    links: Mutex<Vec<StyleLink>>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, href: &str) -> bool {
        self.links.lock().iter().any(|l| l.href == href)
    }

    /// Registered stylesheets in insertion order.
    pub fn links(&self) -> Vec<StyleLink> {
        self.links.lock().clone()
    }

    pub fn hrefs(&self) -> Vec<String> {
        self.links.lock().iter().map(|l| l.href.clone()).collect()
    }

    pub fn reset(&self) {
        self.links.lock().clear();
    }

    /// Register a stylesheet. Returns false when the href was already known.
    pub fn insert(&self, href: &str, owner: &str) -> bool {
        let mut links = self.links.lock();
        if links.iter().any(|l| l.href == href) {
            return false;
        }
        links.push(StyleLink {
            href: href.to_string(),
            owner: owner.to_string(),
        });
        true
    }

    /// Remove stylesheet links from `html`, registering each href. Links
    /// inside HTML comments are left alone.
    pub fn extract(&self, html: &str, owner: &str) -> String {
        let comments: Vec<_> = HTML_COMMENT.find_iter(html).map(|m| m.range()).collect();
        let mut out = String::with_capacity(html.len());
        let mut last = 0;

        for caps in STYLE_LINK.captures_iter(html) {
            let Some(whole) = caps.get(0) else { continue };
            if comments.iter().any(|c| c.contains(&whole.start())) {
                continue;
            }
            let href = &caps[1];
            if self.insert(href, owner) {
                tracing::debug!(href, owner, "registered stylesheet");
            }
            out.push_str(&html[last..whole.start()]);
            last = whole.end();
        }
        out.push_str(&html[last..]);
        out
    }
}

impl PostProcessor for StyleRegistry {
    fn process(&self, path: &str, html: String) -> String {
        self.extract(&html, path)
    }
}

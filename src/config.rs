use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Engine and session settings, usually read from `inku.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest include nesting allowed. The top-level document is depth 0, so
    /// a limit of 2 admits `page -> a -> b` and refuses anything `b` includes.
    pub max_include_depth: usize,
    pub pages_dir: String,
    pub page_file: String,
    pub default_route: String,
    /// Pull `<link rel="stylesheet">` tags out of rendered pages.
    pub extract_styles: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_include_depth: 32,
            pages_dir: "pages".to_string(),
            page_file: "index.html".to_string(),
            default_route: "home".to_string(),
            extract_styles: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Document path for a routed view.
    pub fn page_path(&self, view: &str) -> String {
        format!("{}/{}/{}", self.pages_dir, view, self.page_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("max_include_depth = 4\ndefault_route = \"index\"").unwrap();
        assert_eq!(config.max_include_depth, 4);
        assert_eq!(config.default_route, "index");
        assert_eq!(config.pages_dir, "pages");
        assert!(config.extract_styles);
    }

    #[test]
    fn page_path_layout() {
        assert_eq!(EngineConfig::default().page_path("about"), "pages/about/index.html");
    }

    #[test]
    fn invalid_toml_is_reported() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_include_depth = \"deep\""),
            Err(ConfigError::Toml(_))
        ));
    }
}

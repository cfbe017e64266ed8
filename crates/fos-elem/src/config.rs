//! Configuration
//!
//! Start-up options and the build manifest.

use serde::Deserialize;
use std::collections::HashMap;

use crate::path;

/// Loading strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Interactive: directories fetch their whole subtree up front and
    /// `window/` scripts run as soon as they arrive.
    #[default]
    Eager,
    /// Offline: nothing is fetched until first `require`, which completes
    /// in place through the transport's synchronous path.
    Lazy,
}

/// How stylesheets reach the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleMode {
    /// Link the stylesheet by URL; its content is never fetched.
    #[default]
    Linked,
    /// Fetch, rewrite relative references and inject inline.
    Inlined,
}

/// Build manifest (`index.json`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Every file of the build, in build order.
    pub files: Vec<String>,
    /// Module name to path remaps.
    pub modules: HashMap<String, String>,
    /// Path to container path, for files bundled into another file.
    pub packages: HashMap<String, String>,
}

impl Manifest {
    /// Decode a manifest from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Manifest listing `files` with no remaps.
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Add a module remap.
    pub fn module(mut self, name: &str, path: &str) -> Self {
        self.modules.insert(name.to_string(), path.to_string());
        self
    }

    /// Add a package redirect.
    pub fn package(mut self, path: &str, container: &str) -> Self {
        self.packages.insert(path.to_string(), container.to_string());
        self
    }
}

/// Start-up configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElemConfig {
    /// Origin files are served from, e.g. `https://cdn.example.com`.
    pub domain: String,
    /// Build identifier appended to every URL when set.
    pub build_id: Option<String>,
    /// Path of the build below `domain`.
    pub base_path: String,
    pub mode: Mode,
    pub styles: StyleMode,
    /// Inline manifest; `index.json` is fetched when absent.
    pub manifest: Option<Manifest>,
}

impl Default for ElemConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            build_id: None,
            base_path: "/".to_string(),
            mode: Mode::default(),
            styles: StyleMode::default(),
            manifest: None,
        }
    }
}

impl ElemConfig {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = domain.trim_end_matches('/').to_string();
        self
    }

    pub fn build_id(mut self, id: &str) -> Self {
        self.build_id = Some(id.to_string());
        self
    }

    pub fn base_path(mut self, base: &str) -> Self {
        self.base_path = path::rooted_dir(base);
        self
    }

    pub fn styles(mut self, styles: StyleMode) -> Self {
        self.styles = styles;
        self
    }

    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Decode configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_str(json)?;
        config.base_path = path::rooted_dir(&config.base_path);
        config.domain = config.domain.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Public path of a build file: base path plus the file path.
    pub fn public_path(&self, file: &str) -> String {
        format!("{}{}", self.base_path, file.trim_start_matches('/'))
    }

    /// Full URL of a build file.
    pub fn url_for(&self, file: &str) -> String {
        let mut url = format!("{}{}", self.domain, self.public_path(file));
        if let Some(id) = self.build_id.as_deref().filter(|id| !id.is_empty()) {
            url.push_str(if url.contains('?') { "&v=" } else { "?v=" });
            url.push_str(id);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_from_json() {
        let manifest = Manifest::from_json(
            r#"{"files": ["a/a.js"], "modules": {"jquery": "lib/jquery.js"}}"#,
        )
        .unwrap();

        assert_eq!(manifest.files, vec!["a/a.js"]);
        assert_eq!(manifest.modules.get("jquery").unwrap(), "lib/jquery.js");
        assert!(manifest.packages.is_empty());
    }

    #[test]
    fn test_config_from_json() {
        let config = ElemConfig::from_json(
            r#"{"domain": "https://cdn.test/", "basePath": "static", "mode": "lazy", "buildId": "42"}"#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Lazy);
        assert_eq!(config.base_path, "/static/");
        assert_eq!(config.url_for("/a/b.js"), "https://cdn.test/static/a/b.js?v=42");
    }

    #[test]
    fn test_url_without_build_id() {
        let config = ElemConfig::default().domain("http://localhost:8080");
        assert_eq!(config.url_for("index.json"), "http://localhost:8080/index.json");
        assert_eq!(config.public_path("/x/y.css"), "/x/y.css");
    }
}

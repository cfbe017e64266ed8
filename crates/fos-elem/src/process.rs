//! Content Processors
//!
//! Per-extension finalization applied once, when a resource finishes
//! loading and before its observers fire.

use regex::{Captures, Regex};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::config::{ElemConfig, StyleMode};
use crate::error::TransportError;
use crate::path;
use crate::tree::Resource;

static CSS_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(@import\s*['"])([^'"]+)"#).expect("valid @import pattern"));

static CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(url\(\s*['"]?)([^'")\s]+)"#).expect("valid url() pattern"));

/// Processed resource content
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Content {
    /// Not loaded, or the transport failed.
    #[default]
    Empty,
    Text(Rc<str>),
    Json(Rc<serde_json::Value>),
    /// JSON that failed to parse; carries the parser message.
    Malformed(Rc<str>),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Content::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }
}

/// Receives stylesheets on behalf of the document
pub trait StyleSink {
    /// Reference a stylesheet by URL.
    fn link(&self, href: &str);

    /// Insert a stylesheet inline.
    fn inject(&self, css: &str);
}

impl<T: StyleSink + ?Sized> StyleSink for Rc<T> {
    fn link(&self, href: &str) {
        (**self).link(href)
    }

    fn inject(&self, css: &str) {
        (**self).inject(css)
    }
}

/// Discards stylesheets (no document)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStyles;

impl StyleSink for NullStyles {
    fn link(&self, _href: &str) {}

    fn inject(&self, _css: &str) {}
}

/// A stylesheet handed to a [`StyleSheets`] sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleEntry {
    Linked(String),
    Inline(String),
}

/// Records stylesheets in arrival order
#[derive(Debug, Default)]
pub struct StyleSheets {
    entries: RefCell<Vec<StyleEntry>>,
}

impl StyleSheets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StyleEntry> {
        self.entries.borrow().clone()
    }
}

impl StyleSink for StyleSheets {
    fn link(&self, href: &str) {
        self.entries.borrow_mut().push(StyleEntry::Linked(href.to_string()));
    }

    fn inject(&self, css: &str) {
        self.entries.borrow_mut().push(StyleEntry::Inline(css.to_string()));
    }
}

/// Finalize raw data for `res`. `None` means the fetch failed.
pub(crate) fn finalize(
    res: &Resource,
    raw: Option<String>,
    config: &ElemConfig,
    styles: &dyn StyleSink,
) -> Content {
    let Some(data) = raw else {
        return Content::Empty;
    };

    match res.extension() {
        "html" => Content::Text(html(res, &data, config).into()),
        "css" => Content::Text(css(res, data, config, styles).into()),
        "json" => match serde_json::from_str(&data) {
            Ok(value) => Content::Json(Rc::new(value)),
            Err(err) => {
                tracing::warn!("Malformed JSON in {}: {}", res.path(), err);
                Content::Malformed(err.to_string().into())
            }
        },
        "js" => Content::Text(format!("\n// {}\n\n{}", res.path(), data).into()),
        _ => Content::Text(data.into()),
    }
}

/// Tag with the source path and point the first `./` at the directory.
fn html(res: &Resource, data: &str, config: &ElemConfig) -> String {
    let tagged = format!("<!-- {} -->\n{}", res.path(), data);

    match res.parent() {
        Some(dir) => tagged.replacen("./", &config.public_path(dir.path()), 1),
        None => tagged,
    }
}

fn css(res: &Resource, data: String, config: &ElemConfig, styles: &dyn StyleSink) -> String {
    let href = config.public_path(res.path());

    match config.styles {
        StyleMode::Linked => {
            styles.link(&href);
            data
        }
        StyleMode::Inlined => {
            let css = rewrite_css(&data, path::basedir(&href));
            styles.inject(&css);
            css
        }
    }
}

/// Prefix relative `@import` and `url(...)` references with `dir`.
pub fn rewrite_css(css: &str, dir: &str) -> String {
    let prefix = |caps: &Captures| {
        let target = &caps[2];
        if is_relative(target) {
            format!("{}{}{}", &caps[1], dir, target)
        } else {
            format!("{}{}", &caps[1], target)
        }
    };

    let css = CSS_IMPORT.replace_all(css, prefix);
    CSS_URL.replace_all(&css, prefix).into_owned()
}

fn is_relative(target: &str) -> bool {
    if target.starts_with('/') || target.starts_with('#') {
        return false;
    }

    // Any scheme: data:, http:, https:, ...
    match target.find(':') {
        Some(idx) => !target[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        None => true,
    }
}

/// Extract a packaged member from its container's JSON.
///
/// String members are taken verbatim; any other value is handed on as
/// JSON text for the member's own processor.
pub(crate) fn unpack(container: &Resource, member: &Resource) -> Result<String, TransportError> {
    let content = container.content();
    let Some(table) = content.as_json() else {
        return Err(TransportError::NotFound(member.path().to_string()));
    };

    let trimmed = member.path().trim_start_matches('/');
    let value = [member.manifest_path(), trimmed, member.path()]
        .iter()
        .find_map(|key| table.get(*key));

    match value {
        Some(serde_json::Value::String(text)) => Ok(text.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(TransportError::NotFound(member.path().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_relative_urls() {
        let css = r#"@import "theme.css"; .a { background: url('img/bg.png'); } .b { background: url(icon.svg) }"#;
        let out = rewrite_css(css, "/static/button/");

        assert!(out.contains(r#"@import "/static/button/theme.css""#));
        assert!(out.contains("url('/static/button/img/bg.png')"));
        assert!(out.contains("url(/static/button/icon.svg)"));
    }

    #[test]
    fn test_rewrite_leaves_absolute_urls() {
        let css = r#".a { background: url("/abs.png") } .b { background: url(data:image/png;base64,AAA) } .c { background: url(https://x.test/a.png) } .d { fill: url(#grad) }"#;
        assert_eq!(rewrite_css(css, "/dir/"), css);
    }

    #[test]
    fn test_rewrite_import_with_url() {
        let out = rewrite_css("@import url(base.css);", "/d/");
        assert_eq!(out, "@import url(/d/base.css);");
    }

    #[test]
    fn test_is_relative() {
        assert!(is_relative("a.png"));
        assert!(is_relative("../a.png"));
        assert!(is_relative("a/b:c.png"));
        assert!(!is_relative("//cdn.test/a.png"));
        assert!(!is_relative("mailto:x"));
    }

    #[test]
    fn test_style_sheets_records_in_order() {
        let sheets = Rc::new(StyleSheets::new());
        let sink: &dyn StyleSink = &sheets;
        sink.link("/a.css");
        sink.inject("b{}");

        assert_eq!(
            sheets.entries(),
            vec![StyleEntry::Linked("/a.css".into()), StyleEntry::Inline("b{}".into())]
        );
    }
}

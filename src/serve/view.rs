//! View rendering.
//!
//! Views live under `<views_dir>/<controller>/<action>.html` and layouts
//! under `<views_dir>/layouts/<layout>.html`. Templates only interpolate:
//! `{{ key }}` or `{{ key.nested }}` is replaced by the HTML-escaped
//! local, and a layout receives the rendered view unescaped at `{{ body }}`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::ControllerError;

pub trait ViewRenderer: Send + Sync {
    /// Render `view` (e.g. `users/index`) inside `layout`.
    fn render(&self, view: &str, layout: &str, locals: &Map<String, Value>) -> Result<String, ControllerError>;
}

/// Reads templates from disk on every render.
#[derive(Debug, Clone)]
pub struct FileViewRenderer {
    views_dir: PathBuf,
}

impl FileViewRenderer {
    pub fn new(views_dir: impl Into<PathBuf>) -> Self {
        Self {
            views_dir: views_dir.into(),
        }
    }

    pub fn views_dir(&self) -> &Path {
        &self.views_dir
    }

    fn read(&self, relative: &str) -> Option<String> {
        let path = self.views_dir.join(format!("{}.html", relative));
        std::fs::read_to_string(path).ok()
    }
}

impl ViewRenderer for FileViewRenderer {
    fn render(&self, view: &str, layout: &str, locals: &Map<String, Value>) -> Result<String, ControllerError> {
        let started = Instant::now();

        let view_source = self.read(view).ok_or_else(|| {
            error!("View not found: {}", self.views_dir.join(view).display());
            ControllerError::ViewNotFound(view.to_string())
        })?;
        let layout_source = self.read(&format!("layouts/{}", layout)).ok_or_else(|| {
            error!("Layout not found: layouts/{}", layout);
            ControllerError::LayoutNotFound(layout.to_string())
        })?;

        let body = interpolate(&view_source, locals, None);
        let html = interpolate(&layout_source, locals, Some(&body));
        debug!(
            "Rendered {}.html with layout layouts/{}.html in {}ms",
            view,
            layout,
            started.elapsed().as_millis()
        );
        Ok(html)
    }
}

/// Replace every `{{ path }}` in `template`. Unknown paths render empty;
/// `{{ body }}` takes `body` verbatim when one is given.
pub fn interpolate(template: &str, locals: &Map<String, Value>, body: Option<&str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = after[..end].trim();
        match (key, body) {
            ("body", Some(body)) => out.push_str(body),
            _ => out.push_str(&escape_html(&display(lookup(locals, key)))),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn lookup<'a>(locals: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = locals.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

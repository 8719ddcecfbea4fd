//! Page rendering seam.
//!
//! Handlers hand a template name and a JSON context to a [`ViewRenderer`]; the
//! HTML itself is produced elsewhere. [`SkeletonRenderer`] is the built-in
//! fallback: it embeds the context in a bare page so a front end can hydrate it.

use std::fmt::Debug;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::UserSummary;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to serialize view context for {template}: {source}")]
    Context {
        template: &'static str,
        source: serde_json::Error,
    },
}

/// Everything a page sees. `page` holds the template-specific values.
#[derive(Debug, Clone, Serialize)]
pub struct ViewContext {
    pub logged_in: bool,
    pub current_user: Option<UserSummary>,
    #[serde(flatten)]
    pub page: serde_json::Map<String, Value>,
}

impl ViewContext {
    pub fn new(current_user: Option<UserSummary>) -> Self {
        Self {
            logged_in: current_user.is_some(),
            current_user,
            page: serde_json::Map::new(),
        }
    }

    pub fn insert(
        mut self,
        template: &'static str,
        key: &str,
        value: impl Serialize,
    ) -> Result<Self, RenderError> {
        let value = serde_json::to_value(value)
            .map_err(|source| RenderError::Context { template, source })?;
        self.page.insert(String::from(key), value);
        Ok(self)
    }
}

pub trait ViewRenderer: Debug + Send + Sync {
    fn render(&self, template: &'static str, context: &ViewContext) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SkeletonRenderer;

impl ViewRenderer for SkeletonRenderer {
    fn render(&self, template: &'static str, context: &ViewContext) -> Result<String, RenderError> {
        let json = serde_json::to_string(context)
            .map_err(|source| RenderError::Context { template, source })?;
        Ok(format!(
            "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>{template}</title></head>\n<body data-template=\"{template}\">\n<script type=\"application/json\" id=\"view-context\">{}</script>\n</body>\n</html>\n",
            escape_script(&json)
        ))
    }
}

/// Keep JSON inside a `<script>` element from closing it early.
fn escape_script(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

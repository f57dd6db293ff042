//! Job description templates.
//!
//! A template is the JSON text of a workflow graph with `{{ .name }}`
//! placeholders in it. [`JobTemplate::render`] substitutes a value map
//! into the text and parses the result as the job description that is
//! submitted to the server.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Regex pattern matching `{{ .name }}` placeholders. The leading dot and
/// the inner whitespace are optional.
pub const PLACEHOLDER_PATTERN: &str = r"\{\{\s*\.?([A-Za-z_][A-Za-z0-9_]*)\s*\}\}";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).expect("valid regex"));

/// A job description template loaded from disk or memory.
#[derive(Debug, Clone)]
pub struct JobTemplate {
    text: String,
}

impl JobTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Read a template file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::TemplateRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(text))
    }

    /// Names of every placeholder in the template, sorted and de-duplicated.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = PLACEHOLDER_RE
            .captures_iter(&self.text)
            .map(|caps| caps[1].to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Substitute `values` into the template text without parsing it.
    ///
    /// Strings are inserted JSON-escaped but unquoted, so templates put
    /// their own quotes around string placeholders. Every other value is
    /// inserted as its JSON text.
    pub fn render_text(&self, values: &Map<String, Value>) -> Result<String, CoreError> {
        let mut missing: Option<String> = None;
        let rendered = PLACEHOLDER_RE.replace_all(&self.text, |caps: &Captures| {
            let name = &caps[1];
            match values.get(name) {
                Some(value) => substitution(value),
                None => {
                    if missing.is_none() {
                        missing = Some(name.to_string());
                    }
                    String::new()
                }
            }
        });

        if let Some(name) = missing {
            return Err(CoreError::MissingValue(name));
        }
        Ok(rendered.into_owned())
    }

    /// Render the template into a job description object.
    pub fn render(&self, values: &Map<String, Value>) -> Result<Value, CoreError> {
        let text = self.render_text(values)?;
        let job: Value = serde_json::from_str(&text)?;
        if !job.is_object() {
            return Err(CoreError::NotAnObject);
        }
        Ok(job)
    }
}

fn substitution(value: &Value) -> String {
    match value {
        Value::String(s) => {
            let quoted = Value::String(s.clone()).to_string();
            // Strip the surrounding quotes, keep the escaping.
            quoted[1..quoted.len() - 1].to_string()
        }
        other => other.to_string(),
    }
}

//! Response body serialization, selected per request from the `Accept` header.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::store::Secret;

pub const JSON: &str = "application/json";
pub const XML: &str = "application/xml";
pub const ANY: &str = "*/*";

/// Error body shared by every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub description: String,
}

impl ErrorBody {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// Explicit, ordered field list for XML output.
pub trait XmlFields {
    const ELEMENT: &'static str;

    fn xml_fields(&self) -> Vec<(&'static str, String)>;
}

impl XmlFields for Secret {
    const ELEMENT: &'static str = "Secret";

    fn xml_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("secretText", self.secret_text.clone()),
            ("hash", self.hash.clone()),
            ("remainingViews", self.remaining_views.to_string()),
            ("createdAt", self.created_at.to_string()),
            (
                "expiresAt",
                self.expires_at.map(|t| t.to_string()).unwrap_or_default(),
            ),
        ]
    }
}

impl XmlFields for ErrorBody {
    const ELEMENT: &'static str = "Error";

    fn xml_fields(&self) -> Vec<(&'static str, String)> {
        vec![("description", self.description.clone())]
    }
}

/// What a handler hands to the formatter.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Secret(&'a Secret),
    Error(&'a ErrorBody),
}

pub trait Formatter: Send + Sync {
    /// Value for the response `Content-Type` header.
    fn content_type(&self) -> &'static str;

    fn format(&self, payload: Payload<'_>) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn content_type(&self) -> &'static str {
        JSON
    }

    fn format(&self, payload: Payload<'_>) -> Result<String> {
        let body = match payload {
            Payload::Secret(secret) => serde_json::to_string(secret),
            Payload::Error(error) => serde_json::to_string(error),
        };
        body.context("serialize json body")
    }
}

/// Field values are written without escaping, so a value containing markup
/// can inject elements into the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFormatter;

impl XmlFormatter {
    const PROLOGUE: &'static str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

    fn element<T: XmlFields>(value: &T) -> String {
        let mut xml = String::from(Self::PROLOGUE);
        xml.push_str(&format!("<{}>", T::ELEMENT));
        for (name, text) in value.xml_fields() {
            xml.push_str(&format!("<{name}>{text}</{name}>"));
        }
        xml.push_str(&format!("</{}>", T::ELEMENT));
        xml
    }
}

impl Formatter for XmlFormatter {
    fn content_type(&self) -> &'static str {
        XML
    }

    fn format(&self, payload: Payload<'_>) -> Result<String> {
        Ok(match payload {
            Payload::Secret(secret) => Self::element(secret),
            Payload::Error(error) => Self::element(error),
        })
    }
}

/// Ordered MIME token → formatter table with an explicit fallback.
pub struct FormatRegistry {
    formats: Vec<(String, Arc<dyn Formatter>)>,
    default: Arc<dyn Formatter>,
}

impl FormatRegistry {
    pub fn new(default: Arc<dyn Formatter>) -> Self {
        Self {
            formats: Vec::new(),
            default,
        }
    }

    /// Register `formatter` for `mime`, replacing any earlier entry for it.
    pub fn register(&mut self, mime: &str, formatter: Arc<dyn Formatter>) {
        let mime = normalize(mime);
        match self.formats.iter_mut().find(|(m, _)| *m == mime) {
            Some(entry) => entry.1 = formatter,
            None => self.formats.push((mime, formatter)),
        }
    }

    /// Pick the formatter for an `Accept` value, which is assumed to name one type.
    pub fn negotiate(&self, accept: Option<&str>) -> &dyn Formatter {
        let Some(accept) = accept else {
            return self.default.as_ref();
        };
        let wanted = normalize(accept);
        self.formats
            .iter()
            .find(|(mime, _)| *mime == wanted)
            .map(|(_, f)| f.as_ref())
            .unwrap_or(self.default.as_ref())
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let json: Arc<dyn Formatter> = Arc::new(JsonFormatter);
        let mut registry = Self::new(json.clone());
        registry.register(JSON, json.clone());
        registry.register(ANY, json);
        registry.register(XML, Arc::new(XmlFormatter));
        registry
    }
}

/// `Application/XML; charset=utf-8` → `application/xml`
fn normalize(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

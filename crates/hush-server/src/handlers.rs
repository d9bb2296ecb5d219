use axum::http::StatusCode;
use serde::Deserialize;

use crate::{
    export::{ErrorBody, Formatter, Payload},
    routes::{Reply, Request},
    secrets::{NewSecret, SecretError},
    store::Secret,
    App,
};

pub const INVALID_INPUT: &str = "Invalid input";
pub const SECRET_NOT_FOUND: &str = "Secret not found";
pub const INTERNAL_ERROR: &str = "Internal server error";

// ── Form parsing ─────────────────────────────────────────────────────────────

/// Raw `application/x-www-form-urlencoded` body of `POST /v1/secret`.
#[derive(Debug, Deserialize)]
struct CreateForm {
    secret: Option<String>,
    #[serde(rename = "expireAfterViews")]
    expire_after_views: Option<String>,
    #[serde(rename = "expireAfter")]
    expire_after: Option<String>,
}

fn required_int(value: Option<&str>, name: &'static str) -> Result<i64, SecretError> {
    value
        .and_then(|v| v.trim().parse().ok())
        .ok_or(SecretError::Invalid(name))
}

/// Replace `& < > " '` with their HTML entities, matching `htmlspecialchars`
/// with `ENT_QUOTES`. Secret text is stored in this escaped form.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

impl NewSecret {
    /// Decode a form body. Every field is required; integers must parse exactly.
    /// Fields are HTML-escaped before use.
    pub fn from_form(body: &[u8]) -> Result<Self, SecretError> {
        let body = std::str::from_utf8(body)
            .map_err(|_| SecretError::Invalid("form body is not valid UTF-8"))?;
        let form: CreateForm = serde_urlencoded::from_str(body)
            .map_err(|_| SecretError::Invalid("malformed form body"))?;
        let escaped = |v: Option<String>| v.map(|v| escape_html(&v));
        let expire_after_views = escaped(form.expire_after_views);
        let expire_after = escaped(form.expire_after);
        Ok(Self {
            secret_text: escaped(form.secret).ok_or(SecretError::Invalid("missing secret"))?,
            expire_after_views: required_int(
                expire_after_views.as_deref(),
                "expireAfterViews must be an integer",
            )?,
            expire_after: required_int(expire_after.as_deref(), "expireAfter must be an integer")?,
        })
    }
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// `POST /v1/secret`
pub fn add_secret(app: &App, request: &Request) -> Reply {
    let result = NewSecret::from_form(&request.body).and_then(|new| app.secrets.create_secret(new));
    respond(app, request, result)
}

/// `GET /v1/secret/{hash}`
pub fn get_secret(app: &App, request: &Request) -> Reply {
    // The route pattern guarantees a non-empty final segment.
    let hash = request.path().rsplit('/').next().unwrap_or_default();
    respond(app, request, app.secrets.read_secret(hash))
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn respond(app: &App, request: &Request, result: Result<Secret, SecretError>) -> Reply {
    let formatter = app.formats.negotiate(request.accept());
    match result {
        Ok(secret) => export(formatter, StatusCode::OK, Payload::Secret(&secret)),
        Err(SecretError::Invalid(reason)) => {
            tracing::debug!(reason, "rejected secret request");
            error_reply(formatter, StatusCode::METHOD_NOT_ALLOWED, INVALID_INPUT)
        }
        Err(SecretError::NotFound) => {
            error_reply(formatter, StatusCode::NOT_FOUND, SECRET_NOT_FOUND)
        }
        Err(SecretError::Store(e)) => {
            tracing::error!(error = %e, "internal error");
            error_reply(formatter, StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

fn error_reply(formatter: &dyn Formatter, status: StatusCode, description: &str) -> Reply {
    export(formatter, status, Payload::Error(&ErrorBody::new(description)))
}

fn export(formatter: &dyn Formatter, status: StatusCode, payload: Payload<'_>) -> Reply {
    match formatter.format(payload) {
        Ok(body) => Reply::new(status, formatter.content_type(), body),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response");
            Reply {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                content_type: None,
                body: String::new(),
            }
        }
    }
}

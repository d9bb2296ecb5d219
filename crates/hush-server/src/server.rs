use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Router,
};
use directories::ProjectDirs;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    export::FormatRegistry,
    routes::Request,
    secrets::SecretManager,
    store::{MemoryStore, RedbStore, SecretStore},
    App, AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// Keep secrets in process memory instead of `hush.db` ($HUSH_IN_MEMORY).
    pub in_memory: bool,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HUSH_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("HUSH_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("HUSH_DATA_DIR").ok().map(PathBuf::from),
            in_memory: std::env::var("HUSH_IN_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            cors_origins: std::env::var("HUSH_CORS_ORIGINS").ok(),
        }
    }
}

/// Resolve the directory holding `hush.db`, creating it if needed.
/// Falls back to the platform data dir (`~/.local/share/hush/`, etc.).
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let path = match data_dir {
        Some(d) => d.clone(),
        None => ProjectDirs::from("", "", "hush")
            .context("could not determine platform data directory")?
            .data_dir()
            .to_owned(),
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("create data dir {}", path.display()))?;
    Ok(path)
}

fn open_store(cfg: &ServerConfig) -> Result<Arc<dyn SecretStore>> {
    if cfg.in_memory {
        info!("using in-memory store; secrets will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");
    let store = RedbStore::open(&data_dir.join("hush.db")).context("open store")?;
    Ok(Arc::new(store))
}

/// Every request goes through the application's own route table; axum only
/// supplies the transport.
pub fn router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let uri = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned());
    let request = Request {
        method,
        uri,
        headers,
        body,
    };
    state.app.handle(&request).into_response()
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let store = open_store(&cfg)?;
    let app = App::new(SecretManager::new(store), FormatRegistry::default())?;
    let state = AppState { app: Arc::new(app) };

    let cors = build_cors(cfg.cors_origins.as_deref());
    let service = router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "hush server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, service).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Body;
    use axum::http::{header, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::ids::HandleGenerator;

    struct CountingIds(AtomicUsize);

    impl HandleGenerator for CountingIds {
        fn generate(&self) -> String {
            format!("abc-{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn test_app() -> (Router, MemoryStore, Arc<ManualClock>) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::at("2026-10-14T12:00:00Z"));
        let secrets = SecretManager::with_parts(
            Arc::new(store.clone()),
            clock.clone(),
            Arc::new(CountingIds(AtomicUsize::new(0))),
        );
        let app = App::new(secrets, FormatRegistry::default()).unwrap();
        (router(AppState { app: Arc::new(app) }), store, clock)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        accept: Option<&str>,
        form: Option<&str>,
    ) -> (StatusCode, Option<String>, String) {
        send_bytes(app, method, uri, accept, form.map(str::as_bytes)).await
    }

    async fn send_bytes(
        app: &Router,
        method: &str,
        uri: &str,
        accept: Option<&str>,
        form: Option<&[u8]>,
    ) -> (StatusCode, Option<String>, String) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        let body = match form {
            Some(f) => {
                builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(f.to_vec())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_owned());
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn create_then_read_json() {
        let (app, _store, _clock) = test_app();
        let (status, ct, body) = send(
            &app,
            "POST",
            "/v1/secret",
            None,
            Some("secret=hi&expireAfterViews=2&expireAfter=5"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ct.as_deref(), Some("application/json"));
        let created: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(created["hash"], "abc-0");
        assert_eq!(created["secretText"], "hi");
        assert_eq!(created["remainingViews"], 2);
        assert_eq!(created["createdAt"], "2026-10-14 12:00:00");
        assert_eq!(created["expiresAt"], "2026-10-14 12:05:00");

        let (status, _, body) = send(&app, "GET", "/v1/secret/abc-0", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let read: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(read["secretText"], "hi");
        assert_eq!(read["remainingViews"], 1);
    }

    #[tokio::test]
    async fn invalid_create_is_405_and_stores_nothing() {
        let (app, store, _clock) = test_app();
        for form in [
            "secret=hi&expireAfterViews=0&expireAfter=5",
            "secret=hi&expireAfterViews=1&expireAfter=-1",
            "secret=&expireAfterViews=1&expireAfter=5",
            "secret=hi",
        ] {
            let (status, ct, body) = send(&app, "POST", "/v1/secret", None, Some(form)).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "form {form:?}");
            assert_eq!(ct.as_deref(), Some("application/json"));
            assert_eq!(body, r#"{"description":"Invalid input"}"#);
        }
        assert_eq!(store.find_by_hash("abc-0").unwrap(), None);
    }

    #[tokio::test]
    async fn exhausted_secret_is_404() {
        let (app, store, _clock) = test_app();
        send(
            &app,
            "POST",
            "/v1/secret",
            None,
            Some("secret=once&expireAfterViews=1&expireAfter=0"),
        )
        .await;
        let (status, _, _) = send(&app, "GET", "/v1/secret/abc-0", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = send(&app, "GET", "/v1/secret/abc-0", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, r#"{"description":"Secret not found"}"#);
        assert_eq!(store.find_by_hash("abc-0").unwrap(), None);
    }

    #[tokio::test]
    async fn time_expired_secret_is_404() {
        let (app, _store, clock) = test_app();
        send(
            &app,
            "POST",
            "/v1/secret",
            None,
            Some("secret=brief&expireAfterViews=5&expireAfter=1"),
        )
        .await;
        clock.advance_minutes(2);
        let (status, _, _) = send(&app, "GET", "/v1/secret/abc-0", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn xml_negotiation() {
        let (app, _store, _clock) = test_app();
        let (status, ct, body) = send(
            &app,
            "POST",
            "/v1/secret",
            Some("application/xml"),
            Some("secret=hi&expireAfterViews=1&expireAfter=0"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ct.as_deref(), Some("application/xml"));
        assert!(body.contains("<Secret><secretText>hi</secretText><hash>abc-0</hash>"));
        assert!(body.ends_with("<expiresAt></expiresAt></Secret>"));

        let (status, _, body) =
            send(&app, "GET", "/v1/secret/missing", Some("application/xml"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.ends_with("<Error><description>Secret not found</description></Error>"));
    }

    #[tokio::test]
    async fn unknown_accept_falls_back_to_json() {
        let (app, _store, _clock) = test_app();
        let (_, ct, body) = send(&app, "GET", "/v1/secret/missing", Some("text/html"), None).await;
        assert_eq!(ct.as_deref(), Some("application/json"));
        assert!(serde_json::from_str::<serde_json::Value>(&body).is_ok());
    }

    #[tokio::test]
    async fn unrouted_requests_are_bare_404() {
        let (app, _store, _clock) = test_app();
        for (method, uri) in [
            ("GET", "/v1/secret/HasUpperCase"),
            ("GET", "/v1/secrets"),
            ("DELETE", "/v1/secret/abc-0"),
            ("GET", "/"),
        ] {
            let (status, ct, body) = send(&app, method, uri, None, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(ct, None);
            assert!(body.is_empty());
        }
    }

    #[tokio::test]
    async fn query_string_does_not_affect_routing() {
        let (app, _store, _clock) = test_app();
        send(
            &app,
            "POST",
            "/v1/secret?source=cli",
            None,
            Some("secret=q&expireAfterViews=1&expireAfter=0"),
        )
        .await;
        let (status, _, _) = send(&app, "GET", "/v1/secret/abc-0?x=1", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn non_utf8_form_is_405() {
        let (app, store, _clock) = test_app();
        let (status, ct, body) =
            send_bytes(&app, "POST", "/v1/secret", None, Some(&b"secret=\xff&"[..])).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ct.as_deref(), Some("application/json"));
        assert_eq!(body, r#"{"description":"Invalid input"}"#);
        assert_eq!(store.find_by_hash("abc-0").unwrap(), None);
    }

    #[tokio::test]
    async fn non_utf8_body_on_unrouted_path_is_bare_404() {
        let (app, _store, _clock) = test_app();
        let (status, ct, body) = send_bytes(&app, "GET", "/nowhere", None, Some(&b"\xff"[..])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(ct, None);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn markup_in_secret_text_is_escaped_on_intake() {
        let (app, store, _clock) = test_app();
        let (status, _, body) = send(
            &app,
            "POST",
            "/v1/secret",
            Some("application/xml"),
            Some("secret=a<b&expireAfterViews=1&expireAfter=0"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<secretText>a&lt;b</secretText>"));
        assert_eq!(store.find_by_hash("abc-0").unwrap().unwrap().secret_text, "a&lt;b");
    }
}

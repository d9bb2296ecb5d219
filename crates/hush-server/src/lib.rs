pub mod clock;
pub mod export;
pub mod handlers;
pub mod ids;
pub mod routes;
pub mod secrets;
pub mod server;
pub mod store;

use std::sync::Arc;

use anyhow::Result;
use axum::http::Method;

use crate::export::FormatRegistry;
use crate::routes::{Reply, Request, Router};
use crate::secrets::SecretManager;

pub const SECRET_COLLECTION_ROUTE: &str = r"^/v1/secret$";
pub const SECRET_ITEM_ROUTE: &str = r"^/v1/secret/[a-z0-9-]+$";

/// Request-independent application context: lifecycle rules, output
/// formats and the route table that ties them together.
pub struct App {
    pub secrets: SecretManager,
    pub formats: FormatRegistry,
    router: Router<App>,
}

impl App {
    pub fn new(secrets: SecretManager, formats: FormatRegistry) -> Result<Self> {
        let mut router = Router::new();
        router.add_route(SECRET_COLLECTION_ROUTE, Method::POST, handlers::add_secret)?;
        router.add_route(SECRET_ITEM_ROUTE, Method::GET, handlers::get_secret)?;
        Ok(Self {
            secrets,
            formats,
            router,
        })
    }

    pub fn handle(&self, request: &Request) -> Reply {
        self.router.process(self, request)
    }
}

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<App>,
}

pub use server::{resolve_data_dir, router, run, ServerConfig};

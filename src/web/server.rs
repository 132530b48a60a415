use super::handlers::{handle_check, handle_index, handle_nodes, handle_ws};
use crate::config::settings::Settings;
use crate::error::Error;
use crate::registry::service::Registry;

use axum::extract::Extension;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

/// Default dashboard port when the web URL does not name one.
pub const DEFAULT_WEB_PORT: u16 = 30826;

/// Resolves the configured web URL to a bindable `host:port`.
///
/// Only plain http is served; anything else is a configuration failure so
/// the binary can exit with the matching status code.
pub fn bind_addr(web: &str) -> Result<String, Error> {
    let parsed =
        url::Url::parse(web).map_err(|e| Error::configuration(web, e.to_string()))?;

    match parsed.scheme() {
        "http" => {
            let host = parsed
                .host_str()
                .ok_or_else(|| Error::configuration(web, "host required"))?;
            let port = parsed.port().unwrap_or(DEFAULT_WEB_PORT);
            Ok(format!("{}:{}", host, port))
        }
        "https" => Err(Error::configuration(web, "https is not supported")),
        other => Err(Error::configuration(
            web,
            format!("unsupported web scheme `{}`", other),
        )),
    }
}

pub fn router(settings: Arc<Settings>, registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/check", get(handle_check))
        .route("/nodes.json", get(handle_nodes))
        .route("/ws", get(handle_ws))
        .layer(Extension(settings))
        .layer(Extension(registry))
}

/// Binds the dashboard and serves until the process exits.
pub async fn serve(settings: Arc<Settings>, registry: Arc<Registry>) -> anyhow::Result<()> {
    let web = settings
        .web
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no web interface configured"))?;

    let addr = bind_addr(&web)?;
    let app = router(settings, registry);

    tracing::info!("Web interface listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;

use crate::discovery::DiscoveryEngine;
use crate::model::Labels;
use crate::scraper::Scraper;
use crate::upstream::MetricsApi;

static INDEX: &str = r#"<html>
<head><title>DDF Exporter</title></head>
<body>
<h1>DDF Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>"#;

struct AppState<D, A> {
    scraper: Scraper<D, A>,
    labels: Labels,
}

pub fn router<D, A>(scraper: Scraper<D, A>, labels: Labels) -> Router
where
    D: DiscoveryEngine + 'static,
    A: MetricsApi + 'static,
{
    let state = Arc::new(AppState { scraper, labels });

    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics::<D, A>))
        .with_state(state)
}

pub async fn serve(app: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("serving metrics on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX)
}

async fn metrics<D, A>(State(state): State<Arc<AppState<D, A>>>) -> Response
where
    D: DiscoveryEngine + 'static,
    A: MetricsApi + 'static,
{
    let families = match state.scraper.collect(&state.labels).await {
        Ok(families) => families,
        Err(e) => {
            tracing::error!("collection failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    match render(&families) {
        Ok(body) => ([(CONTENT_TYPE, TextEncoder::new().format_type().to_owned())], body).into_response(),
        Err(e) => {
            tracing::error!("encoding failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Renders families in the text exposition format. Families without samples
/// have no textual form and are left out.
pub fn render(families: &[MetricFamily]) -> Result<String, prometheus::Error> {
    let observable: Vec<MetricFamily> = families
        .iter()
        .filter(|family| !family.get_metric().is_empty())
        .cloned()
        .collect();

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&observable, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("could not listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}

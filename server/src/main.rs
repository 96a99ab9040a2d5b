mod fetcher;
mod upstream;

use crate::fetcher::{CachedVersionFetcher, VersionFetcher};
use crate::upstream::{ReleaseRecord, UpstreamClient};
use anyhow::Context;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{body::Body, Json, Router};
use dotenvy::Error as DotenvError;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower::service_fn;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const DEFAULT_UPSTREAM_ROOT: &str = "discordapp.com";
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(20);

/// Channels the board tracks, in the order the aggregate endpoint reports.
const CHANNELS: [ChannelTarget; 3] = [
    ChannelTarget {
        id: "stable",
        subdomain: None,
    },
    ChannelTarget {
        id: "ptb",
        subdomain: Some("ptb"),
    },
    ChannelTarget {
        id: "canary",
        subdomain: Some("canary"),
    },
];

struct ChannelTarget {
    id: &'static str,
    subdomain: Option<&'static str>,
}

impl ChannelTarget {
    fn page_url(&self, root: &str) -> String {
        match self.subdomain {
            Some(sub) => format!("https://{sub}.{root}/login"),
            None => format!("https://{root}/login"),
        }
    }
}

struct AppState {
    boards: Vec<ChannelBoard>,
}

struct ChannelBoard {
    id: &'static str,
    fetcher: CachedVersionFetcher<UpstreamClient>,
}

impl AppState {
    fn board(&self, id: &str) -> Option<&ChannelBoard> {
        self.boards.iter().find(|board| board.id == id)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    release_channel: String,
    error: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env_files();
    configure_tracing();

    let upstream_root =
        std::env::var("UPSTREAM_ROOT").unwrap_or_else(|_| DEFAULT_UPSTREAM_ROOT.to_string());
    let static_dir =
        PathBuf::from(std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()));

    let http = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()
        .context("Failed to build upstream HTTP client")?;

    let boards = CHANNELS
        .iter()
        .map(|target| ChannelBoard {
            id: target.id,
            fetcher: CachedVersionFetcher::new(UpstreamClient::new(
                http.clone(),
                target.id,
                target.page_url(&upstream_root),
            )),
        })
        .collect();
    let state = Arc::new(AppState { boards });
    info!(upstream = %upstream_root, msg = "channel boards configured");

    let static_root = Arc::new(static_dir);
    let static_service = service_fn(move |req: Request<Body>| {
        let dir =
            ServeDir::new(static_root.as_ref().clone()).append_index_html_on_directories(true);
        async move {
            match dir.oneshot(req).await {
                Ok(response) => Ok::<Response, Infallible>(response.into_response()),
                Err(err) => Ok((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Static file error: {err}"),
                )
                    .into_response()),
            }
        }
    });

    let router = Router::new()
        .route("/api/stable.json", get(handle_stable))
        .route("/api/ptb.json", get(handle_ptb))
        .route("/api/canary.json", get(handle_canary))
        .route("/api/all.json", get(handle_all))
        .with_state(state)
        .fallback_service(static_service)
        .layer(TraceLayer::new_for_http());

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5000);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("Invalid HOST/PORT combination")?;

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind TCP listener")?;
    let bound = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!(listening = %bound, msg = "server ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("msg" = "shutdown signal received");
}

fn configure_tracing() {
    let default_filter = "info";
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

fn load_env_files() {
    fn load(file: &str) {
        match dotenvy::from_filename(file) {
            Ok(_) => {}
            Err(DotenvError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => eprintln!("Warning: unable to load {file}: {err}"),
        }
    }

    load(".env.local");
    load(".env");
}

async fn handle_stable(State(state): State<Arc<AppState>>) -> Response {
    channel_response(&state, "stable").await
}

async fn handle_ptb(State(state): State<Arc<AppState>>) -> Response {
    channel_response(&state, "ptb").await
}

async fn handle_canary(State(state): State<Arc<AppState>>) -> Response {
    channel_response(&state, "canary").await
}

async fn channel_response(state: &AppState, id: &str) -> Response {
    let Some(board) = state.board(id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match board.fetcher.get().await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => {
            error!(channel = id, error = %err, "channel record unavailable");
            let body = ErrorBody {
                release_channel: id.to_string(),
                error: err.to_string(),
            };
            (StatusCode::BAD_GATEWAY, Json(body)).into_response()
        }
    }
}

/// One record per channel, in channel order. A channel whose record cannot
/// be produced is omitted rather than failing the whole response.
async fn handle_all(State(state): State<Arc<AppState>>) -> Json<Vec<ReleaseRecord>> {
    let mut records = Vec::with_capacity(state.boards.len());
    for board in &state.boards {
        match board.fetcher.get().await {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(channel = board.id, error = %err, "omitting channel from aggregate");
            }
        }
    }
    Json(records)
}

//! filedrop server binary.
//!
//! Serves a directory tree over HTTP GET and accepts token-authenticated
//! multipart uploads that land below each user's own directory.

mod auth;
mod browse;
mod config;
mod error;
mod form;
mod http;
mod logging;
mod sanitize;
mod storage;
mod tls;
mod upload;
mod writer;

#[cfg(test)]
mod test_util;

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::routing::{MethodRouter, get};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, info_span, warn};

use crate::auth::CredentialStore;
use crate::config::{Args, Config, SHUTDOWN_GRACE_SECS};
use crate::error::ApiError;
use crate::http::resolve_client_ip;
use crate::sanitize::PathPolicy;
use crate::storage::Storage;

shadow!(build);

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let args = Args::parse();
    logging::init_logging(args.access_log);

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(config = %args.config, error = %err, "failed to load configuration");
            return Err(err.into());
        }
    };

    let storage = Arc::new(Storage::new(
        PathBuf::from(&config.filedir),
        args.path_policy,
    ));
    let credentials = Arc::new(CredentialStore::from_users(&config.users));
    storage.ensure_root().await?;
    info!(
        filedir = %config.filedir,
        users = config.users.len(),
        policy = ?args.path_policy,
        "configuration loaded"
    );
    if args.path_policy == PathPolicy::Legacy {
        warn!("legacy path policy: upload names containing '..' are not rejected");
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let tls_config = tls::rustls_config_from_args(&args).await?;
    let app = build_router(storage, credentials, args.access_log)
        .into_make_service_with_connect_info::<SocketAddr>();

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    match tls_config {
        Some(tls_config) => {
            info!("🔒 Listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await
        }
        None => {
            info!("🚀 Listening on http://{}", addr);
            axum_server::bind(addr).handle(handle).serve(app).await
        }
    }
}

/// Routes every path: GET/HEAD serve files, POST uploads, anything else is 405.
pub(crate) fn build_router(
    storage: Arc<Storage>,
    credentials: Arc<CredentialStore>,
    access_log: bool,
) -> Router {
    let access_level = if access_log { Level::INFO } else { Level::DEBUG };
    let files: MethodRouter = get(browse::serve_files)
        .post(upload::handle_upload)
        .fallback(method_not_allowed)
        .layer(DefaultBodyLimit::disable());

    Router::new()
        .route("/", files.clone())
        .route("/{*path}", files)
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client_ip = resolve_client_ip(request)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(access_level))
                .on_response(DefaultOnResponse::new().level(access_level)),
        )
        .layer(Extension(storage))
        .layer(Extension(credentials))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}

//! Optional TLS from PEM files.

use axum_server::tls_rustls::RustlsConfig;
use std::io;
use tokio::fs;
use tracing::info;

use crate::config::Args;

/// Builds a rustls config when both `--tls-cert` and `--tls-key` are set.
/// Returns `None` for plain HTTP.
pub async fn rustls_config_from_args(args: &Args) -> io::Result<Option<RustlsConfig>> {
    match (&args.tls_cert, &args.tls_key) {
        (Some(cert_path), Some(key_path)) => {
            let cert = fs::read(cert_path).await?;
            let key = fs::read(key_path).await?;
            info!(cert = cert_path, "loaded TLS certificate");
            RustlsConfig::from_pem(cert, key).await.map(Some)
        }
        (None, None) => Ok(None),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "--tls-cert and --tls-key must be given together",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn plain_http_without_tls_flags() {
        let args = Args::parse_from(["filedrop", "--cfg", "config.yaml"]);
        let result = rustls_config_from_args(&args).await.expect("no tls");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cert_without_key_is_rejected() {
        let args = Args::parse_from(["filedrop", "--cfg", "config.yaml", "--tls-cert", "cert.pem"]);
        let err = rustls_config_from_args(&args)
            .await
            .expect_err("half-configured tls");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

//! gRPC server setup.
//!
//! # Responsibilities
//! - Bind the TCP listener for the configured address
//! - Mount the external processor service
//! - Serve until the shutdown future resolves

use std::future::Future;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::config::ListenerConfig;
use crate::ext_proc::proto::external_processor_server::ExternalProcessorServer;
use crate::ext_proc::ExtProcService;

/// Error type for server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Bind the listener described by `config`.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ServerError> {
    let bind_error = |source| ServerError::Bind {
        address: config.bind_address.clone(),
        source,
    };

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|e| bind_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

    let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    tracing::info!(
        address = %local_addr,
        max_concurrent_streams = ?config.max_concurrent_streams,
        "Listener bound"
    );

    Ok(listener)
}

/// Serve the external processor on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    service: ExtProcService,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "auth-extproc serving");
    }

    Server::builder()
        .add_service(ExternalProcessorServer::new(service))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    tracing::info!("gRPC server stopped");
    Ok(())
}

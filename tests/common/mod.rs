//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::path::PathBuf;

use auth_extproc::config::FilterConfig;
use auth_extproc::ext_proc::proto::external_processor_client::ExternalProcessorClient;
use auth_extproc::ext_proc::proto::{ProcessingRequest, ProcessingResponse};
use auth_extproc::lifecycle::{startup, Shutdown};
use auth_extproc::net::{self, ServerError};
use tokio::task::JoinHandle;
use tonic::transport::Channel;

/// A filter instance serving on an ephemeral local port.
pub struct TestFilter {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    handle: Option<JoinHandle<Result<(), ServerError>>>,
    key_file: PathBuf,
}

impl TestFilter {
    pub async fn client(&self) -> ExternalProcessorClient<Channel> {
        ExternalProcessorClient::connect(format!("http://{}", self.addr))
            .await
            .unwrap()
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        self.handle.take().unwrap().await.unwrap()
    }
}

impl Drop for TestFilter {
    fn drop(&mut self) {
        self.shutdown.trigger();
        std::fs::remove_file(&self.key_file).unwrap_or_default();
    }
}

/// Write `content` to a fresh key file under the temp dir.
pub fn write_key_file(content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("auth-extproc-test-{}.csv", uuid::Uuid::new_v4()));
    std::fs::write(&path, content).unwrap();
    path
}

/// Start a filter with the given key file content.
pub async fn start_filter<F>(keys: &str, configure: F) -> TestFilter
where
    F: FnOnce(&mut FilterConfig),
{
    let key_file = write_key_file(keys);

    let mut config = FilterConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.keys.path = Some(key_file.clone());
    config.observability.metrics_enabled = false;
    configure(&mut config);

    let store = startup::load_keys(&config).unwrap();
    let service = startup::build_service(&config, store);
    let listener = net::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signalled = shutdown.signalled();
    let handle = tokio::spawn(async move { net::serve(listener, service, signalled).await });

    TestFilter {
        addr,
        shutdown,
        handle: Some(handle),
        key_file,
    }
}

/// Open one stream, send a single event, and return the first verdict.
pub async fn send_one(
    client: &mut ExternalProcessorClient<Channel>,
    event: ProcessingRequest,
) -> Option<ProcessingResponse> {
    let mut responses = client
        .process(tokio_stream::iter(vec![event]))
        .await
        .unwrap()
        .into_inner();
    responses.message().await.unwrap()
}

/// A request-headers event carrying `api_key`.
pub fn with_key(api_key: &str) -> ProcessingRequest {
    ProcessingRequest::request_headers([(":method", "GET"), (":path", "/"), ("x-api-key", api_key)])
}

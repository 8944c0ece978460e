//! gRPC service implementation of the external processor.
//!
//! # Responsibilities
//! - Accept one bidirectional stream per proxied HTTP request
//! - Spawn a worker task per stream running the [`StreamProcessor`]
//! - Optionally bound the number of concurrent streams

use std::sync::Arc;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;
use uuid::Uuid;

use crate::ext_proc::processor::{StreamError, StreamProcessor};
use crate::ext_proc::proto::external_processor_server::ExternalProcessor;
use crate::ext_proc::proto::{ProcessingRequest, ProcessingResponse};
use crate::observability::metrics;

/// Verdicts buffered per stream before the worker waits on the transport.
const RESPONSE_BUFFER: usize = 4;

/// The `envoy.service.ext_proc.v3.ExternalProcessor` service.
#[derive(Debug, Clone)]
pub struct ExtProcService {
    processor: Arc<StreamProcessor>,
    admission: Option<Arc<Semaphore>>,
}

impl ExtProcService {
    /// `max_concurrent_streams = None` leaves streams unbounded.
    pub fn new(processor: StreamProcessor, max_concurrent_streams: Option<usize>) -> Self {
        Self {
            processor: Arc::new(processor),
            admission: max_concurrent_streams.map(|limit| Arc::new(Semaphore::new(limit))),
        }
    }

    /// Reserve a stream slot, or refuse the stream when all are taken.
    fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, Status> {
        let Some(admission) = &self.admission else {
            return Ok(None);
        };

        match admission.clone().try_acquire_owned() {
            Ok(permit) => Ok(Some(permit)),
            Err(_) => {
                tracing::warn!("Rejecting stream: concurrent stream limit reached");
                metrics::record_stream_rejected();
                Err(Status::resource_exhausted("too many concurrent processing streams"))
            }
        }
    }
}

#[tonic::async_trait]
impl ExternalProcessor for ExtProcService {
    type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

    async fn process(
        &self,
        request: Request<Streaming<ProcessingRequest>>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let permit = self.admit()?;
        let stream_id = Uuid::new_v4();
        let peer = request.remote_addr();
        let inbound = request.into_inner();

        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        let processor = self.processor.clone();
        let span = tracing::info_span!("stream", %stream_id, peer = ?peer);

        tokio::spawn(
            async move {
                // Held until the worker exits.
                let _permit = permit;
                metrics::stream_opened();

                match processor.run(inbound, &tx).await {
                    Ok(outcome) => tracing::debug!(?outcome, "Stream finished"),
                    // Already logged by the processor.
                    Err(StreamError::Receive(status)) => {
                        tracing::debug!(code = ?status.code(), "Stream ended with receive error")
                    }
                    Err(e) => tracing::error!(error = %e, "Stream handler failed"),
                }

                metrics::stream_closed();
            }
            .instrument(span),
        );

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

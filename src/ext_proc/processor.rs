//! Per-stream event processing.
//!
//! # State Machine
//! ```text
//! AwaitingEvents --(request headers, allowed)--> AwaitingEvents
//! AwaitingEvents --(any other event)-----------> AwaitingEvents
//! AwaitingEvents --(deny sent)-----------------> Terminated(Denied)
//! AwaitingEvents --(end of input)--------------> Terminated(Completed)
//! AwaitingEvents --(cancelled)-----------------> Terminated(Cancelled)
//! AwaitingEvents --(receive/send error)--------> handler error
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tonic::{Code, Status};

use crate::auth::{KeyStore, API_KEY_HEADER};
use crate::ext_proc::proto::{processing_request::Request, HttpHeaders, ProcessingRequest, ProcessingResponse};
use crate::ext_proc::response::{continue_response, Denial, Phase};
use crate::observability::metrics;
use crate::quota::QuotaTracker;

/// Channel feeding verdicts back to the transport.
pub type ResponseSender = mpsc::Sender<Result<ProcessingResponse, Status>>;

/// Failures that end a stream handler abnormally.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream receive failed: {0}")]
    Receive(Status),

    #[error("response stream closed before the verdict was sent")]
    Send,
}

/// An inbound event, reduced to what the filter cares about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event<'a> {
    /// Request headers: authenticate and meter.
    RequestHeaders(&'a HttpHeaders),
    /// Anything else: answer continue for its phase.
    PassThrough(Phase),
}

impl<'a> Event<'a> {
    pub fn classify(request: &'a ProcessingRequest) -> Self {
        match &request.request {
            Some(Request::RequestHeaders(headers)) => Event::RequestHeaders(headers),
            Some(Request::ResponseHeaders(_)) => Event::PassThrough(Phase::ResponseHeaders),
            Some(Request::RequestBody(_)) => Event::PassThrough(Phase::RequestBody),
            Some(Request::ResponseBody(_)) => Event::PassThrough(Phase::ResponseBody),
            Some(Request::RequestTrailers(_)) => Event::PassThrough(Phase::RequestTrailers),
            Some(Request::ResponseTrailers(_)) => Event::PassThrough(Phase::ResponseTrailers),
            None => Event::PassThrough(Phase::RequestHeaders),
        }
    }
}

/// Verdict for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue(Phase),
    Deny(Denial),
}

impl Decision {
    pub fn response(&self) -> ProcessingResponse {
        match self {
            Decision::Continue(phase) => continue_response(*phase),
            Decision::Deny(denial) => denial.response(),
        }
    }
}

/// Why a stream handler finished cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The caller closed its side of the stream.
    Completed,
    /// The transport cancelled the stream.
    Cancelled,
    /// A deny verdict was sent; nothing further was read.
    Denied(Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    AwaitingEvents,
    Terminated(StreamOutcome),
}

/// Decides the verdict for every event of a processing stream.
#[derive(Debug, Clone)]
pub struct StreamProcessor {
    keys: Arc<KeyStore>,
    quota: Arc<QuotaTracker>,
    max_requests_per_user: u64,
}

impl StreamProcessor {
    pub fn new(keys: Arc<KeyStore>, quota: Arc<QuotaTracker>, max_requests_per_user: u64) -> Self {
        Self {
            keys,
            quota,
            max_requests_per_user,
        }
    }

    /// Decide the verdict for one inbound event.
    ///
    /// Only request headers touch the key store and the quota tracker.
    pub fn evaluate(&self, request: &ProcessingRequest) -> Decision {
        let (decision, label) = match Event::classify(request) {
            Event::RequestHeaders(headers) => {
                let decision = self.authorize(headers);
                let label = match decision {
                    Decision::Deny(denial) => denial.label(),
                    Decision::Continue(_) => "allow",
                };
                (decision, label)
            }
            Event::PassThrough(phase) => (Decision::Continue(phase), "passthrough"),
        };
        metrics::record_decision(label);

        decision
    }

    fn authorize(&self, headers: &HttpHeaders) -> Decision {
        let api_key = header_value(headers, API_KEY_HEADER).unwrap_or_default();

        let Some(username) = self.keys.resolve(api_key) else {
            tracing::warn!("DENY: request with missing or invalid API key");
            return Decision::Deny(Denial::Unauthorized);
        };

        let quota = self
            .quota
            .check_and_increment(username, self.max_requests_per_user);
        if !quota.allowed {
            tracing::warn!(
                user = %username,
                count = quota.count,
                limit = self.max_requests_per_user,
                "DENY: quota exceeded"
            );
            return Decision::Deny(Denial::QuotaExceeded);
        }

        tracing::info!(
            user = %username,
            count = quota.count,
            limit = self.max_requests_per_user,
            "ALLOW"
        );
        Decision::Continue(Phase::RequestHeaders)
    }

    /// Process one stream until it ends, is cancelled, or a deny is sent.
    ///
    /// A receive error other than cancellation is forwarded to `outbound` as
    /// the terminating status and returned.
    pub async fn run<S>(
        &self,
        mut inbound: S,
        outbound: &ResponseSender,
    ) -> Result<StreamOutcome, StreamError>
    where
        S: Stream<Item = Result<ProcessingRequest, Status>> + Unpin,
    {
        let mut state = StreamState::AwaitingEvents;

        loop {
            if let StreamState::Terminated(outcome) = state {
                return Ok(outcome);
            }

            let request = match inbound.next().await {
                Some(Ok(request)) => request,
                None => {
                    state = StreamState::Terminated(StreamOutcome::Completed);
                    continue;
                }
                Some(Err(status)) if status.code() == Code::Cancelled => {
                    state = StreamState::Terminated(StreamOutcome::Cancelled);
                    continue;
                }
                Some(Err(status)) => {
                    tracing::error!(error = %status, "stream recv error");
                    // The transport may already be gone; the error is returned either way.
                    let _ = outbound.send(Err(status.clone())).await;
                    return Err(StreamError::Receive(status));
                }
            };

            let decision = self.evaluate(&request);
            outbound
                .send(Ok(decision.response()))
                .await
                .map_err(|_| StreamError::Send)?;

            if let Decision::Deny(denial) = decision {
                state = StreamState::Terminated(StreamOutcome::Denied(denial));
            }
        }
    }
}

/// Value of the first header named exactly `name`.
///
/// Envoy carries header values in `raw_value`; the legacy string `value` is
/// not consulted. Non-UTF-8 bytes are treated as absent.
fn header_value<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    let header = headers
        .headers
        .as_ref()?
        .headers
        .iter()
        .find(|h| h.key == name)?;

    std::str::from_utf8(&header.raw_value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext_proc::proto::{HttpTrailers, StatusCode};
    use crate::ext_proc::response::as_immediate;

    fn processor() -> (StreamProcessor, Arc<QuotaTracker>) {
        let keys: KeyStore = [("abc123", "alice"), ("xyz789", "bob")].into_iter().collect();
        let quota = Arc::new(QuotaTracker::new());
        (StreamProcessor::new(Arc::new(keys), quota.clone(), 5), quota)
    }

    fn headers(pairs: &[(&str, &str)]) -> ProcessingRequest {
        ProcessingRequest::request_headers(pairs.iter().copied())
    }

    fn request_body() -> ProcessingRequest {
        ProcessingRequest::request_body(b"{}".to_vec(), true)
    }

    async fn drive(
        processor: &StreamProcessor,
        events: Vec<Result<ProcessingRequest, Status>>,
    ) -> (Result<StreamOutcome, StreamError>, Vec<Result<ProcessingResponse, Status>>) {
        let (tx, mut rx) = mpsc::channel(events.len() + 1);
        let outcome = processor.run(tokio_stream::iter(events), &tx).await;
        drop(tx);

        let mut sent = Vec::new();
        while let Some(item) = rx.recv().await {
            sent.push(item);
        }
        (outcome, sent)
    }

    #[test]
    fn test_missing_key_is_unauthorized() {
        let (processor, quota) = processor();
        let decision = processor.evaluate(&headers(&[(":path", "/v1/items")]));

        assert_eq!(decision, Decision::Deny(Denial::Unauthorized));
        assert_eq!(quota.tracked_users(), 0);
    }

    #[test]
    fn test_unknown_key_is_unauthorized_even_with_quota_left() {
        let (processor, quota) = processor();
        let decision = processor.evaluate(&headers(&[("x-api-key", "nope")]));

        assert_eq!(decision, Decision::Deny(Denial::Unauthorized));
        assert_eq!(quota.tracked_users(), 0);
    }

    #[test]
    fn test_header_name_is_case_sensitive() {
        let (processor, _) = processor();
        let decision = processor.evaluate(&headers(&[("X-Api-Key", "abc123")]));
        assert_eq!(decision, Decision::Deny(Denial::Unauthorized));
    }

    #[test]
    fn test_first_matching_header_wins() {
        let (processor, quota) = processor();

        let decision = processor.evaluate(&headers(&[("x-api-key", "bad"), ("x-api-key", "abc123")]));
        assert_eq!(decision, Decision::Deny(Denial::Unauthorized));

        let decision = processor.evaluate(&headers(&[("x-api-key", "xyz789"), ("x-api-key", "abc123")]));
        assert_eq!(decision, Decision::Continue(Phase::RequestHeaders));
        assert_eq!(quota.count("bob"), 1);
        assert_eq!(quota.count("alice"), 0);
    }

    #[test]
    fn test_legacy_string_value_is_ignored() {
        let (processor, quota) = processor();
        let mut request = headers(&[("x-api-key", "")]);
        if let Some(Request::RequestHeaders(h)) = request.request.as_mut() {
            h.headers.as_mut().unwrap().headers[0].value = "abc123".into();
        }

        assert_eq!(processor.evaluate(&request), Decision::Deny(Denial::Unauthorized));
        assert_eq!(quota.count("alice"), 0);
    }

    #[test]
    fn test_non_utf8_key_is_unauthorized() {
        let (processor, _) = processor();
        let mut request = headers(&[("x-api-key", "")]);
        if let Some(Request::RequestHeaders(h)) = request.request.as_mut() {
            h.headers.as_mut().unwrap().headers[0].raw_value = vec![0xff, 0xfe];
        }
        assert_eq!(processor.evaluate(&request), Decision::Deny(Denial::Unauthorized));
    }

    #[test]
    fn test_other_events_pass_through_without_consulting_stores() {
        let (processor, quota) = processor();
        let events = [
            (request_body(), Phase::RequestBody),
            (
                ProcessingRequest {
                    request: Some(Request::ResponseHeaders(HttpHeaders::default())),
                },
                Phase::ResponseHeaders,
            ),
            (
                ProcessingRequest {
                    request: Some(Request::ResponseTrailers(HttpTrailers::default())),
                },
                Phase::ResponseTrailers,
            ),
        ];

        for (event, phase) in events {
            assert_eq!(processor.evaluate(&event), Decision::Continue(phase));
        }
        assert_eq!(quota.tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_quota_sequence_for_one_user() {
        let (processor, quota) = processor();
        let mut verdicts = Vec::new();

        for _ in 0..6 {
            let (outcome, sent) = drive(&processor, vec![Ok(headers(&[("x-api-key", "abc123")]))]).await;
            let response = sent.into_iter().next().unwrap().unwrap();
            verdicts.push((outcome.unwrap(), as_immediate(&response).cloned()));
        }

        for (outcome, immediate) in &verdicts[..5] {
            assert_eq!(*outcome, StreamOutcome::Completed);
            assert!(immediate.is_none());
        }

        let (outcome, immediate) = &verdicts[5];
        assert_eq!(*outcome, StreamOutcome::Denied(Denial::QuotaExceeded));
        let immediate = immediate.as_ref().unwrap();
        assert_eq!(immediate.status.as_ref().unwrap().code(), StatusCode::TooManyRequests);
        assert_eq!(immediate.body, Denial::QuotaExceeded.body().as_bytes());
        assert_eq!(quota.count("alice"), 5);
    }

    #[tokio::test]
    async fn test_deny_stops_reading_the_stream() {
        let (processor, _) = processor();
        let events = vec![
            Ok(headers(&[])),
            Ok(request_body()),
            Ok(request_body()),
        ];

        let (outcome, sent) = drive(&processor, events).await;

        assert_eq!(outcome.unwrap(), StreamOutcome::Denied(Denial::Unauthorized));
        assert_eq!(sent.len(), 1);
        let immediate = as_immediate(sent[0].as_ref().unwrap()).unwrap().clone();
        assert_eq!(immediate.body, b"Invalid or missing API Key.");
    }

    #[tokio::test]
    async fn test_allowed_stream_keeps_reading() {
        let (processor, _) = processor();
        let events = vec![
            Ok(headers(&[("x-api-key", "xyz789")])),
            Ok(request_body()),
            Ok(ProcessingRequest {
                request: Some(Request::ResponseHeaders(HttpHeaders::default())),
            }),
        ];

        let (outcome, sent) = drive(&processor, events).await;

        assert_eq!(outcome.unwrap(), StreamOutcome::Completed);
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|r| as_immediate(r.as_ref().unwrap()).is_none()));
    }

    #[tokio::test]
    async fn test_cancellation_is_a_clean_exit() {
        let (processor, _) = processor();
        let (outcome, sent) = drive(&processor, vec![Err(Status::cancelled("client went away"))]).await;

        assert_eq!(outcome.unwrap(), StreamOutcome::Cancelled);
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_receive_error_is_returned_and_forwarded() {
        let (processor, _) = processor();
        let events = vec![Ok(request_body()), Err(Status::internal("h2 reset"))];

        let (outcome, sent) = drive(&processor, events).await;

        assert!(matches!(outcome, Err(StreamError::Receive(ref s)) if s.code() == Code::Internal));
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].as_ref().unwrap_err().code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_send_failure_aborts() {
        let (processor, _) = processor();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let outcome = processor
            .run(tokio_stream::iter(vec![Ok(request_body())]), &tx)
            .await;
        assert!(matches!(outcome, Err(StreamError::Send)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_streams_respect_remaining_quota() {
        let (processor, quota) = processor();
        let processor = Arc::new(processor);
        // Three requests already spent; two remain.
        for _ in 0..3 {
            quota.check_and_increment("alice", 5);
        }

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let processor = processor.clone();
                tokio::spawn(async move {
                    let (tx, mut rx) = mpsc::channel(1);
                    let events = vec![Ok(headers(&[("x-api-key", "abc123")]))];
                    processor.run(tokio_stream::iter(events), &tx).await.unwrap();
                    rx.recv().await.unwrap().unwrap()
                })
            })
            .collect();

        let mut allowed = 0;
        for task in tasks {
            if as_immediate(&task.await.unwrap()).is_none() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 2);
        assert_eq!(quota.count("alice"), 5);
    }
}

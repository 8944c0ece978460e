//! Verdict construction.
//!
//! Two shapes only: an empty "continue" answer for the phase being processed,
//! and an immediate response carrying a status and body back to the client.

use crate::ext_proc::proto::{
    processing_response::Response, BodyResponse, HeadersResponse, HttpStatus, ImmediateResponse,
    ProcessingResponse, StatusCode, TrailersResponse,
};

/// Protocol phase an inbound event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RequestHeaders,
    ResponseHeaders,
    RequestBody,
    ResponseBody,
    RequestTrailers,
    ResponseTrailers,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::RequestHeaders => "request_headers",
            Phase::ResponseHeaders => "response_headers",
            Phase::RequestBody => "request_body",
            Phase::ResponseBody => "response_body",
            Phase::RequestTrailers => "request_trailers",
            Phase::ResponseTrailers => "response_trailers",
        }
    }
}

/// Reasons a request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Missing or unknown API key.
    Unauthorized,
    /// The user has used up their quota.
    QuotaExceeded,
}

impl Denial {
    pub fn status(&self) -> StatusCode {
        match self {
            Denial::Unauthorized => StatusCode::Unauthorized,
            Denial::QuotaExceeded => StatusCode::TooManyRequests,
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            Denial::Unauthorized => "Invalid or missing API Key.",
            Denial::QuotaExceeded => "Daily quota has been reached and will reset at 4:00AM EST.",
        }
    }

    /// Metric label for this denial.
    pub fn label(&self) -> &'static str {
        match self {
            Denial::Unauthorized => "deny_unauthorized",
            Denial::QuotaExceeded => "deny_quota",
        }
    }

    pub fn response(&self) -> ProcessingResponse {
        immediate_response(self.status(), self.body())
    }
}

/// Let the request proceed unmodified.
pub fn continue_response(phase: Phase) -> ProcessingResponse {
    let response = match phase {
        Phase::RequestHeaders => Response::RequestHeaders(HeadersResponse::default()),
        Phase::ResponseHeaders => Response::ResponseHeaders(HeadersResponse::default()),
        Phase::RequestBody => Response::RequestBody(BodyResponse::default()),
        Phase::ResponseBody => Response::ResponseBody(BodyResponse::default()),
        Phase::RequestTrailers => Response::RequestTrailers(TrailersResponse::default()),
        Phase::ResponseTrailers => Response::ResponseTrailers(TrailersResponse::default()),
    };
    ProcessingResponse {
        response: Some(response),
    }
}

/// Stop processing and answer the client with `status` and `body`.
pub fn immediate_response(status: StatusCode, body: &str) -> ProcessingResponse {
    ProcessingResponse {
        response: Some(Response::ImmediateResponse(ImmediateResponse {
            status: Some(HttpStatus {
                code: status as i32,
            }),
            body: body.as_bytes().to_vec(),
            details: String::new(),
        })),
    }
}

/// The immediate response carried by `response`, if it is a deny.
pub fn as_immediate(response: &ProcessingResponse) -> Option<&ImmediateResponse> {
    match &response.response {
        Some(Response::ImmediateResponse(immediate)) => Some(immediate),
        _ => None,
    }
}

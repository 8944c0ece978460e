//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and gauges via `metrics`)
//!
//! Consumers:
//!     → stdout (text or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Every stream runs inside a span carrying its stream ID
//! - Metric updates are no-ops until a recorder is installed, so tests
//!   and library users pay nothing

pub mod logging;
pub mod metrics;

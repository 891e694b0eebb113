//! Wire protocol for the HealthNet facility metrics stream.
//!
//! Every frame, in both directions, is a single JSON object of the form
//! `{"type": "<tag>", "payload": <any>}`.

pub mod constants;
pub mod envelope;
pub mod error;
pub mod messages;
pub mod telemetry;

pub use envelope::Envelope;
pub use error::FrameError;
pub use messages::{ConnectionStatus, ErrorEvent, LinkStatus, MetricKind, StreamRequest};
pub use telemetry::{Alert, MetricsSnapshot, Severity};

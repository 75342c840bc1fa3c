//! Error taxonomy for the detection pipeline.
//!
//! Distinguishes errors that are recoverable on the per-event path (fail
//! open, log and continue) from errors that are fatal to a stream or to
//! the process, matching the taxonomy in spec §7.
//!
//! Stream I/O errors (the one stream-fatal case in §7) are not wrapped in
//! a local enum: the gRPC contract already requires `tonic::Status` as the
//! outbound stream's error type, so `stream_handler.rs` propagates it
//! directly with `?` rather than through an intermediate type that would
//! just wrap and unwrap the same value.

use thiserror::Error;

/// Errors surfaced by the shared-counter store adapter.
///
/// Every variant here is non-fatal to an in-flight event: the rate limiter
/// treats all of them the same way (fail open, §4.3) but keeps them
/// distinguishable so callers can log the right thing.
#[derive(Debug, Error)]
pub enum ScsError {
    #[error("SCS connection unavailable: {0}")]
    Unavailable(String),
    #[error("SCS script execution failed: {0}")]
    Script(String),
    #[error("SCS returned a malformed reply: {0}")]
    MalformedReply(String),
}

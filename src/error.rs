//! Error taxonomy for the RAS core.
//!
//! Only [`CoreError::TracingUnavailable`] and [`CoreError::NoEventsAvailable`]
//! are fatal at startup; everything else is recorded and the offending event
//! or record is skipped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Neither debugfs nor tracefs is mounted, or the per-tool trace
    /// instance could not be created. Fatal at startup.
    #[error("tracing facility unavailable: {0}")]
    TracingUnavailable(String),

    /// A compiled-in event has no kernel `format` descriptor. Non-fatal;
    /// the event is skipped with a warning.
    #[error("event format missing for {group}:{name}")]
    EventFormatMissing { group: String, name: String },

    /// The event was disabled via configuration and was not subscribed.
    #[error("event {group}:{name} is disabled")]
    EventDisabled { group: String, name: String },

    /// Zero events were subscribed successfully. Fatal at startup.
    #[error("no trace events could be enabled")]
    NoEventsAvailable,

    /// A decoder detected invalid field widths or inconsistent lengths.
    #[error("decode error in {0}: {1}")]
    DecodeError(&'static str, String),

    /// A single-row insert failed. Logged, never propagated further.
    #[error("persistence failed for {table}: {source}")]
    PersistFailed {
        table: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The kernel refused a page/row offline request.
    #[error("offline request for {0:#x} failed")]
    OfflineFailed(u64),

    /// CPU vendor/family/model is unknown; the MCE decoder falls back to
    /// architectural-only decoding. Never fatal.
    #[error("unsupported CPU: vendor={vendor} family={family} model={model}")]
    UnsupportedCpu {
        vendor: String,
        family: u32,
        model: u32,
    },

    /// A bitfield helper was called with an invalid bit range.
    #[error("invalid bit range [{lo}, {hi}]")]
    InvalidArgument { lo: u32, hi: u32 },
}

pub type Result<T> = std::result::Result<T, CoreError>;

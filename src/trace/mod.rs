//! Ftrace/tracefs plumbing: locating the tracing
//! filesystem, registering and formatting tracepoints, draining the
//! per-CPU ring buffers, and the termination-signal source that ends the
//! ingestion loop.

pub mod discovery;
pub mod format;
pub mod ingestion;
pub mod registration;
pub mod signals;

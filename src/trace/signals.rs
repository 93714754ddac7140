//! Signal & lifecycle: a dedicated termination-signal readiness
//! source installed before the ingestion loop starts, so both the preferred
//! multiplexer and the fallback per-CPU tasks observe the same cancellation
//! event.

use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::error::{CoreError, Result};

/// Which of the four terminating signals fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    Int,
    Term,
    Hup,
    Quit,
}

/// Wraps one [`tokio::signal::unix::Signal`] stream per terminating signal
/// (INT, TERM, HUP, QUIT). `tokio::select!` over the four streams is this
/// crate's readiness-multiplexer analogue of the original's single
/// `signalfd`.
pub struct TerminationSignals {
    int: Signal,
    term: Signal,
    hup: Signal,
    quit: Signal,
}

impl TerminationSignals {
    pub fn install() -> Result<Self> {
        let mk = |kind: SignalKind| {
            signal(kind).map_err(|e| CoreError::TracingUnavailable(format!("cannot install signal handler: {e}")))
        };
        Ok(TerminationSignals {
            int: mk(SignalKind::interrupt())?,
            term: mk(SignalKind::terminate())?,
            hup: mk(SignalKind::hangup())?,
            quit: mk(SignalKind::quit())?,
        })
    }

    /// Blocks until any of {INT, TERM, HUP, QUIT} arrives.
    pub async fn recv(&mut self) -> TermSignal {
        tokio::select! {
            _ = self.int.recv() => TermSignal::Int,
            _ = self.term.recv() => TermSignal::Term,
            _ = self.hup.recv() => TermSignal::Hup,
            _ = self.quit.recv() => TermSignal::Quit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_succeeds_and_recv_reacts_to_sigterm() {
        let mut signals = TerminationSignals::install().unwrap();
        unsafe {
            libc::raise(libc::SIGTERM);
        }
        let got = signals.recv().await;
        assert_eq!(got, TermSignal::Term);
    }
}

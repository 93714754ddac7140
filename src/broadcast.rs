//! Broadcast server: an optional abstract-namespace local
//! socket that multicasts a textual rendering of each decoded event to up
//! to [`MAX_CLIENTS`] concurrently connected local clients. Disabled
//! unless [`crate::config::Config::broadcast_socket`] is set.
//!
//! One `tokio::sync::broadcast::Sender` feeds every connected client's own
//! writer task, each rendering its own copy of an event as a single
//! comma-separated `key=value` line. The wire format isn't persisted, so
//! there's no schema-stability constraint on it the way there is for the
//! SQLite tables.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::records::Record;

/// Matches the original's fixed client-slot table.
pub const MAX_CLIENTS: usize = 16;

/// Renders one [`Record`] as a single comma-separated `key=value` line.
/// Built generically off `Record`'s internally-tagged
/// `Serialize` impl rather than one hand-written serializer per event kind
/// — the per-kind fields already come from the persistence façade's same
/// struct, so duplicating a field list here would just be another place
/// for the two to drift.
pub fn render(record: &Record) -> String {
    let value = serde_json::to_value(record).unwrap_or(serde_json::Value::Null);
    let serde_json::Value::Object(map) = value else {
        return String::new();
    };
    map.iter()
        .map(|(k, v)| {
            let rendered = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{k}={rendered}")
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Binds `name` as a Linux abstract-namespace socket (leading NUL byte).
/// Falls back to a `$TMPDIR`-rooted path socket on non-Linux targets so the
/// server remains constructible in cross-platform test runs; production
/// deployment is Linux-only, matching the rest of this daemon's kernel
/// surface.
fn bind_listener(name: &str) -> std::io::Result<UnixListener> {
    #[cfg(target_os = "linux")]
    {
        use std::os::linux::net::SocketAddrExt;
        use std::os::unix::net::{SocketAddr, UnixListener as StdUnixListener};
        let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
        let std_listener = StdUnixListener::bind_addr(&addr)?;
        std_listener.set_nonblocking(true)?;
        UnixListener::from_std(std_listener)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let path = std::env::temp_dir().join(name);
        let _ = std::fs::remove_file(&path);
        let std_listener = std::os::unix::net::UnixListener::bind(&path)?;
        std_listener.set_nonblocking(true)?;
        UnixListener::from_std(std_listener)
    }
}

/// Broadcasts decoded records to connected clients; `tx` is shared with
/// [`crate::core::Core`], which calls [`BroadcastServer::publish`] (really
/// just `tx.send`) after every successfully decoded event.
pub struct BroadcastServer {
    socket_name: String,
    tx: broadcast::Sender<Arc<Record>>,
}

impl BroadcastServer {
    pub fn new(socket_name: String) -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        BroadcastServer { socket_name, tx }
    }

    pub fn publish(&self, record: Record) {
        // No receivers yet (no clients connected) is not an error.
        let _ = self.tx.send(Arc::new(record));
    }

    /// A cloned handle to the publish side, so [`crate::core::Core`] can
    /// keep publishing after handing the server itself off to its own
    /// accept-loop task.
    pub fn sender(&self) -> broadcast::Sender<Arc<Record>> {
        self.tx.clone()
    }

    /// Runs the accept loop until `cancel` fires. Each accepted client gets
    /// its own writer task fed from a fresh `broadcast::Receiver`; write
    /// failure or EOF marks the client dead without blocking the pipeline.
    pub async fn run(self, cancel: CancellationToken) -> std::io::Result<()> {
        let listener = bind_listener(&self.socket_name)?;
        info!("broadcast server listening on abstract socket {}", self.socket_name);

        let active = Arc::new(Mutex::new(0usize));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("broadcast server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, _addr) = match accepted {
                        Ok(v) => v,
                        Err(e) => { warn!("broadcast accept failed: {e}"); continue; }
                    };

                    let mut count = active.lock().await;
                    if *count >= MAX_CLIENTS {
                        warn!("broadcast server at capacity ({MAX_CLIENTS}), rejecting client");
                        drop(stream);
                        continue;
                    }
                    *count += 1;
                    drop(count);

                    let rx = self.tx.subscribe();
                    let active = Arc::clone(&active);
                    let client_cancel = cancel.clone();
                    tokio::spawn(async move {
                        serve_client(stream, rx, client_cancel).await;
                        *active.lock().await -= 1;
                    });
                }
            }
        }
    }
}

async fn serve_client(
    mut stream: tokio::net::UnixStream,
    mut rx: broadcast::Receiver<Arc<Record>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            msg = rx.recv() => {
                let record = match msg {
                    Ok(r) => r,
                    Err(broadcast::error::RecvError::Closed) => return,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("broadcast client lagged, dropped {n} events");
                        continue;
                    }
                };
                let line = format!("{}\n", render(&record));
                if stream.write_all(line.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{DiskError, Record};

    fn sample() -> Record {
        Record::DiskError(DiskError {
            timestamp: "now".to_string(),
            dev: "8:16".to_string(),
            sector: 100,
            nr_sector: 8,
            error: "critical space allocation error".to_string(),
            rwbs: "W".to_string(),
            command: "fio".to_string(),
        })
    }

    #[test]
    fn render_produces_comma_separated_key_value_pairs() {
        let line = render(&sample());
        assert!(line.contains("dev=8:16"));
        assert!(line.contains("sector=100"));
        assert!(line.contains("kind=disk_error"));
        assert!(line.contains(','));
    }

    #[test]
    fn publish_without_subscribers_does_not_error() {
        let server = BroadcastServer::new("rasd-test".to_string());
        server.publish(sample());
    }
}

//! Readiness notification for external process supervisors.

use std::sync::Arc;

/// Receives the single "pool spawned" notification.
pub trait ReadinessSink: Send + Sync {
    fn notify_ready(&self, pool_size: usize);
}

impl<F> ReadinessSink for F
where
    F: Fn(usize) + Send + Sync,
{
    fn notify_ready(&self, pool_size: usize) {
        self(pool_size)
    }
}

/// Shared handle to a sink.
pub type SharedReadiness = Arc<dyn ReadinessSink>;

/// Default sink: logs readiness and speaks the `NOTIFY_SOCKET` datagram
/// protocol when a supervisor provides one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisorNotify;

impl ReadinessSink for SupervisorNotify {
    fn notify_ready(&self, pool_size: usize) {
        tracing::info!(workers = pool_size, "Worker pool ready");

        #[cfg(unix)]
        if let Ok(path) = std::env::var("NOTIFY_SOCKET") {
            if let Err(e) = send_notify(&path, pool_size) {
                tracing::warn!(socket = %path, error = %e, "Failed to notify supervisor");
            }
        }
    }
}

#[cfg(unix)]
fn send_notify(path: &str, pool_size: usize) -> std::io::Result<()> {
    use std::os::unix::net::UnixDatagram;

    if path.starts_with('@') {
        tracing::debug!(socket = %path, "Abstract notify sockets are not supported");
        return Ok(());
    }

    let socket = UnixDatagram::unbound()?;
    let status = format!("READY=1\nSTATUS=serving with {pool_size} workers\n");
    socket.send_to(status.as_bytes(), path)?;
    Ok(())
}

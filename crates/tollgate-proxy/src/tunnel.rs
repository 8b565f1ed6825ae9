//! Opaque byte relay for CONNECT sessions.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Copies bytes from `src` to `dst` until `src` reaches EOF or either side
/// errors, then shuts down `dst`. Returns the number of bytes copied.
pub async fn pipe<R, W>(mut src: R, mut dst: W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(&mut src, &mut dst).await;
    let _ = dst.shutdown().await;
    copied
}

/// Relays bytes in both directions between `client` and `origin`.
///
/// Each direction runs on its own task. When either direction finishes the
/// other is aborted, so both connections are closed together.
pub async fn splice<C, O>(client: C, origin: O)
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    O: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (origin_read, origin_write) = tokio::io::split(origin);

    let mut upstream = tokio::spawn(pipe(client_read, origin_write));
    let mut downstream = tokio::spawn(pipe(origin_read, client_write));

    tokio::select! {
        result = &mut upstream => {
            downstream.abort();
            log_direction("client->origin", result);
        }
        result = &mut downstream => {
            upstream.abort();
            log_direction("origin->client", result);
        }
    }
}

fn log_direction(
    direction: &str,
    result: Result<std::io::Result<u64>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(bytes)) => tracing::trace!(direction, bytes, "Tunnel direction closed"),
        Ok(Err(e)) => tracing::trace!(direction, error = %e, "Tunnel direction failed"),
        Err(e) => tracing::trace!(direction, error = %e, "Tunnel task ended"),
    }
}

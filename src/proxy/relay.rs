//! Bidirectional byte relay for established tunnels.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Copy bytes both ways between `client` and `upstream`.
///
/// Returns when either direction reaches EOF or fails. Both streams are
/// dropped on return, which closes them; the still-running direction is
/// cancelled. I/O errors only end the session.
pub async fn relay<C, U>(client: C, upstream: U)
where
    C: AsyncRead + AsyncWrite,
    U: AsyncRead + AsyncWrite,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let client_to_upstream = tokio::io::copy(&mut client_read, &mut upstream_write);
    let upstream_to_client = tokio::io::copy(&mut upstream_read, &mut client_write);

    tokio::select! {
        result = client_to_upstream => match result {
            Ok(n) => debug!("Client closed tunnel after {} bytes upstream", n),
            Err(e) => debug!("Client->upstream copy ended: {}", e),
        },
        result = upstream_to_client => match result {
            Ok(n) => debug!("Upstream closed tunnel after {} bytes downstream", n),
            Err(e) => debug!("Upstream->client copy ended: {}", e),
        },
    }
}

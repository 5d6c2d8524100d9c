//! SOCKS5 method negotiation
//!
//! Only NO AUTHENTICATION is offered. Clients that do not list it are
//! answered with "no acceptable methods" and dropped.

use crate::socks::consts::*;
use crate::socks::context::AuthContext;
use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Perform method negotiation
///
/// # Protocol
///
/// Client sends:
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// Server responds with `VER | METHOD`.
pub async fn authenticate<S>(stream: &mut S) -> Result<AuthContext>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1];

    if version != SOCKS5_VERSION {
        bail!("Unsupported SOCKS version: {}", version);
    }

    if num_methods == 0 {
        bail!("No authentication methods provided");
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    let selected = if methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        SOCKS5_AUTH_METHOD_NONE
    } else {
        SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE
    };

    stream.write_all(&[SOCKS5_VERSION, selected]).await?;
    stream.flush().await?;

    if selected == SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE {
        bail!("No acceptable authentication method");
    }

    Ok(AuthContext::new(selected))
}

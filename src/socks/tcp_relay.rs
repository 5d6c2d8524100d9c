//! TCP relay for SOCKS5 CONNECT command
//!
//! Handles CONNECT requests by dialing the destination and relaying data
//! in both directions.

use crate::error::{ReplyCode, Socks5Error};
use crate::pool::BufferPool;
use crate::socks::closer::{closed_error, Closer};
use crate::socks::command::{send_reply, Request};
use crate::socks::context::Context;
use crate::socks::server::RelayEnv;
use crate::socks::types::AddrSpec;
use crate::transport::{BoxWriter, Connection, Network};
use futures::FutureExt;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Handle TCP CONNECT command
///
/// This function:
/// 1. Dials the destination through the configured dialer
/// 2. Sends a success reply carrying the connection's local address
/// 3. Relays both directions as separate tasks until the first one ends
///
/// Dial failures are answered with ConnectionRefused, NetworkUnreachable
/// or HostUnreachable before the error is returned.
pub async fn handle_connect(
    env: &RelayEnv,
    ctx: Context,
    mut writer: BoxWriter,
    request: Request,
) -> Result<(), Socks5Error> {
    let target = match dial_destination(env, &ctx, &mut writer, &request, Network::Tcp).await? {
        Connection::Stream(stream) => stream,
        Connection::Datagram(_) => {
            send_reply(&mut writer, &request.header, ReplyCode::ServerFailure, None).await?;
            return Err(Socks5Error::ServerFault("dial tcp invalid".to_string()));
        }
    };

    let bind_addr = target
        .local_addr()
        .map(AddrSpec::from)
        .unwrap_or_else(|_| AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));

    send_reply(&mut writer, &request.header, ReplyCode::Success, Some(&bind_addr)).await?;

    info!("SOCKS5 CONNECT established to {}", request.dest_addr);

    // Whichever direction finishes first ends the session; the guard tears
    // down the other one.
    let closer = Closer::new();
    let _guard = closer.guard();

    let (target_read, target_write) = tokio::io::split(target);
    let (up_tx, up_rx) = oneshot::channel();
    let (down_tx, down_rx) = oneshot::channel();

    env.executor.submit(
        relay_direction(
            env.buffer_pool.clone(),
            closer.clone(),
            target_write,
            request.reader,
            up_tx,
        )
        .boxed(),
    );
    env.executor.submit(
        relay_direction(
            env.buffer_pool.clone(),
            closer.clone(),
            writer,
            target_read,
            down_tx,
        )
        .boxed(),
    );

    let result = tokio::select! {
        result = up_rx => result,
        result = down_rx => result,
    };

    match result {
        Ok(Ok(bytes)) => {
            debug!("Relay to {} finished after {} bytes", request.dest_addr, bytes);
            Ok(())
        }
        Ok(Err(e)) => {
            debug!("Relay to {} ended: {}", request.dest_addr, e);
            Err(Socks5Error::RelayIo(e))
        }
        Err(_) => Err(Socks5Error::RelayIo(io::Error::new(
            io::ErrorKind::Other,
            "relay task dropped before completion",
        ))),
    }
}

/// Dial the request's destination, answering the client on failure
pub(crate) async fn dial_destination(
    env: &RelayEnv,
    ctx: &Context,
    writer: &mut BoxWriter,
    request: &Request,
    network: Network,
) -> Result<Connection, Socks5Error> {
    let addr = request.dest_addr.to_string();
    debug!("Dialing {} {}", network, addr);

    match env.dialer.dial(ctx, network, &addr).await {
        Ok(conn) => Ok(conn),
        Err(e) => {
            let reply = ReplyCode::from_dial_error(&e);
            warn!("Failed to dial {} {}: {} ({:?})", network, addr, e, reply);
            send_reply(writer, &request.header, reply, None).await?;
            Err(Socks5Error::DialFailure {
                reply,
                addr: request.raw_dest_addr.to_string(),
                source: e,
            })
        }
    }
}

/// One relay direction, ended early when the session closes
async fn relay_direction<R, W>(
    pool: Arc<BufferPool>,
    closer: Closer,
    dst: W,
    src: R,
    done: oneshot::Sender<io::Result<u64>>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = tokio::select! {
        result = proxy(&pool, dst, src) => result,
        _ = closer.closed() => Err(closed_error()),
    };
    let _ = done.send(result);
}

/// Copy `src` into `dst` until EOF or error, then half-close `dst`.
///
/// The shutdown only closes the write side of a full-duplex destination,
/// so the opposite direction keeps flowing.
pub async fn proxy<R, W>(pool: &Arc<BufferPool>, mut dst: W, mut src: R) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = pool.get();
    let result = copy_buffer(&mut src, &mut dst, &mut buf[..]).await;

    if let Err(e) = dst.shutdown().await {
        debug!("Half-close after relay failed: {}", e);
    }

    result
}

async fn copy_buffer<R, W>(src: &mut R, dst: &mut W, buf: &mut [u8]) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    loop {
        let n = src.read(buf).await?;
        if n == 0 {
            return Ok(total);
        }
        dst.write_all(&buf[..n]).await?;
        dst.flush().await?;
        total += n as u64;
    }
}

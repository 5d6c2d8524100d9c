//! UDP ASSOCIATE handler
//!
//! Implements the UDP ASSOCIATE command for SOCKS5.

use crate::error::{ReplyCode, Socks5Error};
use crate::socks::command::{send_reply, Request};
use crate::socks::context::Context;
use crate::socks::server::RelayEnv;
use crate::socks::tcp_relay::dial_destination;
use crate::socks::types::AddrSpec;
use crate::socks::udp::packet::{parse_udp_frame, write_udp_header};
use crate::socks::udp::session::SessionTable;
use crate::socks::udp::socket::RelaySocket;
use crate::transport::{BoxWriter, Connection, Network};
use futures::FutureExt;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Handle UDP ASSOCIATE command
///
/// # Protocol Flow
///
/// 1. Dial the destination over UDP
/// 2. Bind an ephemeral wildcard UDP socket for the client
/// 3. Reply with the bound address as BND.ADDR:BND.PORT
/// 4. Forward client frames to the destination in a background task, and
///    start one return path per distinct client source address
/// 5. The association lives as long as the TCP control connection
pub async fn handle_associate(
    env: &RelayEnv,
    ctx: Context,
    mut writer: BoxWriter,
    mut request: Request,
) -> Result<(), Socks5Error> {
    let target = match dial_destination(env, &ctx, &mut writer, &request, Network::Udp).await? {
        Connection::Datagram(socket) => Arc::new(RelaySocket::new(socket)),
        Connection::Stream(_) => {
            send_reply(&mut writer, &request.header, ReplyCode::ServerFailure, None).await?;
            return Err(Socks5Error::ServerFault("dial udp invalid".to_string()));
        }
    };
    let _target_guard = target.close_guard();

    let bind = match bind_relay_socket(request.local_addr) {
        Ok(socket) => Arc::new(RelaySocket::new(socket)),
        Err(e) => {
            warn!("Failed to bind UDP relay socket: {}", e);
            send_reply(&mut writer, &request.header, ReplyCode::ServerFailure, None).await?;
            return Err(Socks5Error::ServerFault(format!("listen udp failed, {}", e)));
        }
    };
    let _bind_guard = bind.close_guard();

    let bind_addr = match bind.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            send_reply(&mut writer, &request.header, ReplyCode::ServerFailure, None).await?;
            return Err(Socks5Error::ServerFault(format!("listen udp failed, {}", e)));
        }
    };

    send_reply(
        &mut writer,
        &request.header,
        ReplyCode::Success,
        Some(&AddrSpec::from(bind_addr)),
    )
    .await?;

    let remote = target
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| request.dest_addr.to_string());
    info!(
        "UDP ASSOCIATE established: target {}, listening on {}",
        remote, bind_addr
    );

    env.executor
        .submit(forward_datagrams(env.clone(), target.clone(), bind.clone()).boxed());

    // The association is maintained as long as the TCP control connection
    // is open; anything the client sends on it is discarded.
    let mut buf = env.buffer_pool.get();
    loop {
        match request.reader.read(&mut buf[..]).await {
            Ok(0) => {
                debug!("Control stream closed, terminating UDP association");
                return Ok(());
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("Control stream error: {}", e);
                return Err(Socks5Error::RelayIo(e));
            }
        }
    }
}

/// Bind the client-facing relay socket on an ephemeral wildcard port
///
/// An IPv6 control connection gets a dual-stack `[::]` socket so both
/// IPv6 and IPv4 clients can reach it. Otherwise the socket is IPv4.
fn bind_relay_socket(local_addr: Option<SocketAddr>) -> io::Result<UdpSocket> {
    let (domain, addr) = match local_addr {
        Some(SocketAddr::V6(_)) => {
            (Domain::IPV6, SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)))
        }
        _ => (Domain::IPV4, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))),
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if domain == Domain::IPV6 {
        socket.set_only_v6(false)?;
    }
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}

/// Client to destination loop
///
/// Reads frames from the bind socket and writes their payload to the
/// destination socket. Malformed and fragmented frames are dropped.
async fn forward_datagrams(env: RelayEnv, target: Arc<RelaySocket>, bind: Arc<RelaySocket>) {
    let _target_guard = target.close_guard();
    let _bind_guard = bind.close_guard();
    let sessions = SessionTable::new();

    loop {
        let mut buf = env.buffer_pool.get();
        let (n, source) = match bind.recv_from(&mut buf[..]).await {
            Ok(received) => received,
            Err(e) => {
                if bind.is_closed() {
                    debug!("UDP relay socket closed, stopping forward loop");
                    return;
                }
                debug!("UDP relay receive error: {}", e);
                continue;
            }
        };

        let frame = match parse_udp_frame(&buf[..n]) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Dropping malformed UDP frame from {}: {}", source, e);
                continue;
            }
        };

        if frame.is_fragmented() {
            debug!("Dropping fragmented UDP frame from {}", source);
            continue;
        }

        if sessions.insert_if_absent(&source) {
            debug!(
                "New UDP client source {} ({} active)",
                source,
                sessions.len()
            );
            env.executor.submit(
                return_datagrams(env.clone(), target.clone(), bind.clone(), source).boxed(),
            );
        }

        if let Err(e) = target.send(frame.data).await {
            warn!("Write data to remote failed: {}", e);
            return;
        }
    }
}

/// Destination to client loop for one client source address
///
/// Runs until reading the destination fails, then closes both sockets.
async fn return_datagrams(
    env: RelayEnv,
    target: Arc<RelaySocket>,
    bind: Arc<RelaySocket>,
    client: SocketAddr,
) {
    let _target_guard = target.close_guard();
    let _bind_guard = bind.close_guard();

    loop {
        let mut buf = env.buffer_pool.get();
        let (n, remote) = match target.recv_from(&mut buf[..]).await {
            Ok(received) => received,
            Err(e) => {
                debug!("Read data from remote failed: {}", e);
                return;
            }
        };

        let mut frame = env.buffer_pool.get();
        frame.clear();
        write_udp_header(&mut frame, &AddrSpec::from(remote));
        frame.extend_from_slice(&buf[..n]);

        if let Err(e) = bind.send_to(&frame, client).await {
            debug!("Write data to client {} failed: {}", client, e);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relay_socket_follows_control_family() {
        let v4 = bind_relay_socket(Some("127.0.0.1:1080".parse().unwrap())).unwrap();
        assert!(v4.local_addr().unwrap().is_ipv4());

        let unknown = bind_relay_socket(None).unwrap();
        assert!(unknown.local_addr().unwrap().is_ipv4());
    }

    #[tokio::test]
    async fn test_relay_socket_ipv6_accepts_ipv4_clients() {
        let relay = bind_relay_socket(Some("[::1]:1080".parse().unwrap())).unwrap();
        let port = relay.local_addr().unwrap().port();
        assert!(relay.local_addr().unwrap().is_ipv6());

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"mapped", (Ipv4Addr::LOCALHOST, port)).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = relay.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"mapped");
        assert_eq!(from.port(), client.local_addr().unwrap().port());
    }
}

//! UDP relay for SOCKS5
//!
//! Handles UDP ASSOCIATE: relay frame codec, per-source session tracking
//! and the closable sockets shared by the relay tasks.

mod associate;
mod packet;
mod session;
mod socket;

pub use associate::handle_associate;
pub use packet::{parse_udp_frame, write_udp_header, UdpFrame};
pub use session::SessionTable;
pub use socket::RelaySocket;

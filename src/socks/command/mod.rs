//! SOCKS5 command parsing module
//!
//! Handles parsing SOCKS5 requests and building replies.

mod parser;
mod reply;

pub use parser::Request;
pub use reply::{encode_reply, send_reply};

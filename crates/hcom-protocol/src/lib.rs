//! Meadow HCOM Protocol
//!
//! This crate provides types and utilities for the HCOM protocol spoken
//! between a host and a Meadow board over a serial port or TCP socket.
//!
//! # Protocol Overview
//!
//! Every message is a packet made of a fixed 12-byte header and a payload.
//! Packets are COBS-stuffed and terminated by a `0x00` delimiter on the wire.
//!
//! - **Requests** (host → device): built from [`Request`] with a sender-owned
//!   sequence number
//! - **Responses** (device → host): solicited replies and unsolicited output,
//!   mapped to [`Response`] by the response type in the header
//!
//! # Example
//!
//! ```rust,ignore
//! use hcom_protocol::{encode_frame, FrameCodec, FrameEvent, Request, ResponseParser};
//!
//! // Build a request
//! let packet = Request::GetDeviceInfo.encode(1)?;
//! port.write_all(&encode_frame(packet.as_bytes()))?;
//!
//! // Parse what comes back
//! codec.push(&received);
//! while let Some(FrameEvent::Packet(bytes)) = codec.next_frame() {
//!     let message = parser.parse(&bytes)?;
//! }
//! ```

mod constants;
mod error;
mod frame;
mod requests;
mod responses;
mod types;

pub use constants::*;
pub use error::*;
pub use frame::*;
pub use requests::*;
pub use responses::*;
pub use types::*;

//! Meadow HCOM Connection
//!
//! This crate drives a Meadow board over the HCOM protocol: it owns the
//! transport, runs the listener thread that parses device responses, and
//! exposes blocking device operations on top.
//!
//! # Architecture
//!
//! - [`Link`]: a reopenable transport (serial port, TCP socket or in-memory
//!   pair for simulators)
//! - [`Connection`]: one device; a dedicated listener thread applies every
//!   response to shared state, and operations wait for the state they need
//! - [`ConnectionManager`]: the application's registry of the current
//!   connection, keyed by [`Route`]
//! - [`DebuggingServer`]: a TCP proxy between an IDE debugger and the device
//!
//! # Example
//!
//! ```rust,ignore
//! use meadow_hcom::{ConnectionConfig, ConnectionManager, OperationOptions, Route};
//!
//! let manager = ConnectionManager::new(ConnectionConfig::default());
//! let connection = manager.connect(&Route::parse("/dev/ttyACM0"))?;
//! connection.attach(&OperationOptions::default())?;
//!
//! let info = connection.get_device_info(&OperationOptions::default())?;
//! println!("{}", info);
//! ```

mod cancel;
mod config;
mod connection;
pub mod debugging;
mod error;
mod events;
mod listener;
mod manager;
mod route;
mod text_list;
mod transport;

pub use cancel::CancellationToken;
pub use config::{ConnectionConfig, DEFAULT_BAUD_RATE};
pub use connection::{Connection, OperationOptions, DEFAULT_OPERATION_TIMEOUT};
pub use debugging::DebuggingServer;
pub use error::{HcomError, HcomResult};
pub use events::{ConnectionEvent, ConnectionState, MessageSource};
pub use manager::ConnectionManager;
pub use route::{Route, DEFAULT_TCP_PORT};
pub use text_list::TextListAccumulator;
pub use transport::{
    DeviceEnd, Link, LinkHalves, LinkReader, LinkWriter, MemoryLink, SerialLink, TcpLink,
};

pub use hcom_protocol::{DeviceInfo, FileListEntry};

//! Route strings naming where a device lives.
//!
//! A route is one of:
//! - `local`: the host itself, which has no HCOM transport
//! - `host:port`: a TCP endpoint
//! - a bare IPv4 address: a TCP endpoint on [`DEFAULT_TCP_PORT`]
//! - anything else: a serial port name such as `/dev/ttyACM0` or `COM3`

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::config::ConnectionConfig;
use crate::error::{HcomError, HcomResult};
use crate::transport::{Link, SerialLink, TcpLink};

/// TCP port used when a route names only an address.
pub const DEFAULT_TCP_PORT: u16 = 5000;

/// Where a device is reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// The host itself. It has no HCOM transport, so [`Route::link`] refuses
    /// it with [`HcomError::UnsupportedRoute`].
    Local,
    /// A serial port.
    Serial(String),
    /// A TCP endpoint.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl Route {
    /// Parse a route string. Never fails: unrecognised strings are serial
    /// port names.
    pub fn parse(route: &str) -> Self {
        let route = route.trim();

        if route.eq_ignore_ascii_case("local") {
            return Route::Local;
        }

        if route.parse::<Ipv4Addr>().is_ok() {
            return Route::Tcp {
                host: route.to_string(),
                port: DEFAULT_TCP_PORT,
            };
        }

        if let Some((host, port)) = route.rsplit_once(':') {
            if !host.is_empty() && !host.contains(['/', '\\']) {
                if let Ok(port) = port.parse::<u16>() {
                    return Route::Tcp {
                        host: host.to_string(),
                        port,
                    };
                }
            }
        }

        Route::Serial(route.to_string())
    }

    /// Build the transport for this route.
    pub fn link(&self, config: &ConnectionConfig) -> HcomResult<Box<dyn Link>> {
        match self {
            Route::Local => Err(HcomError::UnsupportedRoute(self.to_string())),
            Route::Serial(port) => Ok(Box::new(SerialLink::new(
                port.clone(),
                config.baud_rate,
                config.read_timeout(),
            ))),
            Route::Tcp { host, port } => Ok(Box::new(TcpLink::new(
                host.clone(),
                *port,
                config.read_timeout(),
            ))),
        }
    }
}

impl FromStr for Route {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Route::parse(s))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Local => write!(f, "local"),
            Route::Serial(port) => write!(f, "{}", port),
            Route::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

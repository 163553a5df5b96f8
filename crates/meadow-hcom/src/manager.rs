//! Registry holding the application's current device connection.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::HcomResult;
use crate::route::Route;

/// Owns at most one live connection and swaps it when the route changes.
///
/// Create one per application and pass it to whatever needs a device.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    current: Mutex<Option<(Route, Arc<Connection>)>>,
}

impl ConnectionManager {
    /// Create an empty registry.
    pub fn new(config: ConnectionConfig) -> Self {
        ConnectionManager {
            config,
            current: Mutex::new(None),
        }
    }

    /// Return the connection for `route`, closing any connection to a
    /// different route first.
    ///
    /// The new connection is not opened; call [`Connection::attach`].
    pub fn connect(&self, route: &Route) -> HcomResult<Arc<Connection>> {
        let mut current = self.current.lock();

        if let Some((existing, connection)) = current.as_ref() {
            if existing == route {
                return Ok(connection.clone());
            }
        }

        let link = route.link(&self.config)?;
        if let Some((previous, connection)) = current.take() {
            info!(route = %previous, "closing previous connection");
            connection.close();
        }

        let connection = Arc::new(Connection::new(link, self.config.clone()));
        *current = Some((route.clone(), connection.clone()));
        Ok(connection)
    }

    /// The current connection, if any.
    pub fn current(&self) -> Option<Arc<Connection>> {
        self.current
            .lock()
            .as_ref()
            .map(|(_, connection)| connection.clone())
    }

    /// Route of the current connection, if any.
    pub fn current_route(&self) -> Option<Route> {
        self.current.lock().as_ref().map(|(route, _)| route.clone())
    }

    /// Close and forget the current connection.
    pub fn disconnect(&self) {
        if let Some((route, connection)) = self.current.lock().take() {
            info!(%route, "disconnecting");
            connection.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HcomError;
    use crate::events::ConnectionState;

    fn tcp(port: u16) -> Route {
        Route::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    #[test]
    fn test_same_route_reuses_connection() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        let first = manager.connect(&tcp(5000)).unwrap();
        let second = manager.connect(&tcp(5000)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_new_route_replaces_connection() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        let first = manager.connect(&tcp(5000)).unwrap();
        let second = manager.connect(&Route::Serial("COM9".to_string())).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), ConnectionState::Disconnected);
        assert_eq!(
            manager.current_route(),
            Some(Route::Serial("COM9".to_string()))
        );
    }

    #[test]
    fn test_local_route_refused_and_current_kept() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        let first = manager.connect(&tcp(5000)).unwrap();

        let err = manager.connect(&Route::Local).unwrap_err();
        assert!(matches!(err, HcomError::UnsupportedRoute(_)));
        assert!(Arc::ptr_eq(&manager.current().unwrap(), &first));
    }

    #[test]
    fn test_disconnect_clears_current() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        manager.connect(&tcp(5000)).unwrap();
        manager.disconnect();
        assert!(manager.current().is_none());
        assert!(manager.current_route().is_none());
    }
}

//! Connection events published to subscribers.

use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport closed.
    Disconnected,
    /// Transport open, no device traffic yet.
    Connected,
    /// A device response has been seen on the open transport.
    MeadowAttached,
}

/// Where a device message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// Application stdout.
    Stdout,
    /// Application stderr.
    Stderr,
    /// Informational text from the OS.
    Info,
    /// Protocol-level text: rejections, errors and traces.
    Hcom,
}

impl MessageSource {
    /// Short label used when printing messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::Stdout => "stdout",
            MessageSource::Stderr => "stderr",
            MessageSource::Info => "info",
            MessageSource::Hcom => "hcom",
        }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Text output from the device.
    DeviceMessage {
        /// Message text.
        message: String,
        /// Where it came from.
        source: MessageSource,
    },
    /// A file write advanced.
    FileWriteProgress {
        /// Destination file name.
        file_name: String,
        /// Bytes sent so far.
        completed: u64,
        /// Total bytes to send.
        total: u64,
    },
    /// A file read advanced.
    FileReadProgress {
        /// Source file name.
        file_name: String,
        /// Bytes received so far.
        received: u64,
    },
    /// A file read finished and the local file is closed.
    FileReadCompleted {
        /// Source file name.
        file_name: String,
    },
    /// The listener hit a fault it could not hand to a caller.
    ConnectionError(String),
    /// The connection state changed.
    StateChanged(ConnectionState),
}

/// Fan-out of events to any number of subscribers.
///
/// Subscribers whose receiver has been dropped are pruned on the next publish.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<Sender<ConnectionEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> Receiver<ConnectionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn publish(&self, event: ConnectionEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(ConnectionEvent::StateChanged(ConnectionState::Connected));

        for rx in [a, b] {
            assert_eq!(
                rx.try_recv().unwrap(),
                ConnectionEvent::StateChanged(ConnectionState::Connected)
            );
        }
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::default();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(ConnectionEvent::ConnectionError("boom".to_string()));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn test_message_source_labels() {
        assert_eq!(MessageSource::Stdout.to_string(), "stdout");
        assert_eq!(MessageSource::Hcom.as_str(), "hcom");
    }
}

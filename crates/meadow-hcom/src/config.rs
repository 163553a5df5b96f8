//! Connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Tuning for a device connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// How long a single transport read blocks before the listener re-checks
    /// for shutdown.
    pub read_timeout_ms: u64,
    /// Pause between a planned reconnect request and reopening the transport.
    pub reconnect_delay_ms: u64,
    /// Reopen attempts per batch after the transport drops.
    pub reopen_attempts: u32,
    /// Pause between reopen attempts.
    pub reopen_interval_ms: u64,
    /// Device-to-debugger buffers held before the listener blocks.
    pub debugger_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            reconnect_delay_ms: 2_000,
            reopen_attempts: 20,
            reopen_interval_ms: 500,
            debugger_queue_capacity: 256,
        }
    }
}

impl ConnectionConfig {
    /// Set the serial baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the transport read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the planned reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the reopen policy.
    pub fn with_reopen_policy(mut self, attempts: u32, interval: Duration) -> Self {
        self.reopen_attempts = attempts.max(1);
        self.reopen_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the debugger queue capacity.
    pub fn with_debugger_queue_capacity(mut self, capacity: usize) -> Self {
        self.debugger_queue_capacity = capacity.max(1);
        self
    }

    /// Transport read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    /// Planned reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Pause between reopen attempts.
    pub fn reopen_interval(&self) -> Duration {
        Duration::from_millis(self.reopen_interval_ms)
    }

    /// Reopen attempts per batch, at least one.
    pub fn reopen_attempts(&self) -> u32 {
        self.reopen_attempts.max(1)
    }

    /// Debugger queue capacity, at least one buffer.
    pub fn debugger_queue_capacity(&self) -> usize {
        self.debugger_queue_capacity.max(1)
    }
}

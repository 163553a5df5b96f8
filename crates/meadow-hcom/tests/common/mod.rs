//! Shared helpers for driving a connection against a simulated device.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use hcom_protocol::{Packet, REQ_GET_DEVICE_INFORMATION, RESP_TEXT_CONCLUDED, RESP_TEXT_DEVICE_INFO};
use meadow_hcom::{
    Connection, ConnectionConfig, ConnectionEvent, DeviceEnd, MemoryLink, OperationOptions,
};

/// How long tests wait for anything before failing.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A connection wired to a simulated device.
pub struct Harness {
    pub connection: Arc<Connection>,
    pub device: DeviceEnd,
    pub link: MemoryLink,
}

/// Configuration with short delays so reconnect paths finish quickly.
pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig::default()
        .with_read_timeout(Duration::from_millis(10))
        .with_reconnect_delay(Duration::from_millis(50))
        .with_reopen_policy(5, Duration::from_millis(20))
}

pub fn opts() -> OperationOptions {
    OperationOptions::with_timeout(TIMEOUT)
}

/// A connection that has not been opened.
pub fn harness() -> Harness {
    harness_with(fast_config())
}

/// A connection using `config` that has not been opened.
pub fn harness_with(config: ConnectionConfig) -> Harness {
    let (link, device) = MemoryLink::pair(Duration::from_millis(10));
    let connection = Arc::new(Connection::new(Box::new(link.clone()), config));
    Harness {
        connection,
        device,
        link,
    }
}

/// A connection that has attached to the simulated device.
pub fn attached() -> Harness {
    attached_with(fast_config())
}

/// A connection using `config` that has attached to the simulated device.
pub fn attached_with(config: ConnectionConfig) -> Harness {
    let mut h = harness_with(config);
    let connection = h.connection.clone();
    let attach = thread::spawn(move || connection.attach(&opts()));

    expect_request(&mut h.device, REQ_GET_DEVICE_INFORMATION);
    h.device
        .respond(RESP_TEXT_DEVICE_INFO, 0, b"DeviceName|Simulated~");
    attach.join().unwrap().expect("attach failed");
    h
}

/// Receive the next request and check its type.
pub fn expect_request(device: &mut DeviceEnd, request_type: u16) -> Packet {
    let packet = device
        .recv_request(TIMEOUT)
        .unwrap_or_else(|| panic!("no request 0x{:04X} arrived", request_type));
    assert_eq!(
        packet.message_type(),
        request_type,
        "expected request 0x{:04X}, got 0x{:04X}",
        request_type,
        packet.message_type()
    );
    packet
}

/// Conclude `request_type` from the device side.
pub fn conclude(device: &DeviceEnd, request_type: u16) {
    device.respond(RESP_TEXT_CONCLUDED, u32::from(request_type), b"");
}

/// Wait for the first event matching `pred`.
pub fn wait_for_event(
    events: &Receiver<ConnectionEvent>,
    mut pred: impl FnMut(&ConnectionEvent) -> bool,
) -> ConnectionEvent {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => continue,
            Err(_) => panic!("expected event never arrived"),
        }
    }
}

/// Poll `check` until it holds.
pub fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !check() {
        assert!(Instant::now() < deadline, "condition never held");
        thread::sleep(Duration::from_millis(10));
    }
}

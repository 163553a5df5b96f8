//! The per-connection listener thread.
//!
//! Reads the transport, splits frames, parses responses and applies them to
//! the shared state in arrival order. Transport faults and planned
//! reconnects reopen the link; nothing but shutdown ends the loop.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use hcom_protocol::{FrameCodec, FrameEvent, Message, Request, Response, ResponseParser};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use crate::connection::{Shared, State};
use crate::error::{HcomError, HcomResult};
use crate::events::{ConnectionEvent, ConnectionState, MessageSource};
use crate::transport::{is_read_timeout, LinkReader};

const READ_BUFFER_SIZE: usize = 4096;

/// How often a full debugger queue is retried.
const DEBUGGER_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// What the loop does after a response.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Reconnect,
}

/// Follow-up work done once the state lock is released.
enum Action {
    None,
    Send(Request),
    Debugger(Bytes),
    Reconnect,
}

pub(crate) fn spawn(shared: Arc<Shared>, reader: LinkReader) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("hcom-listener-{}", shared.name))
        .spawn(move || run(shared, reader))
}

fn run(shared: Arc<Shared>, mut reader: LinkReader) {
    let mut codec = FrameCodec::new();
    let mut parser = ResponseParser::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    debug!(link = %shared.name, "listener started");

    while !shared.is_shutdown() {
        let n = match reader.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if is_read_timeout(&e) => continue,
            Err(e) => {
                warn!(link = %shared.name, error = %e, "transport read failed");
                shared
                    .events
                    .publish(ConnectionEvent::ConnectionError(format!(
                        "transport read failed: {}",
                        e
                    )));
                codec.clear();
                match reopen(&shared, Duration::ZERO) {
                    Some(next) => reader = next,
                    None => break,
                }
                continue;
            }
        };

        codec.push(&buf[..n]);
        let mut flow = Flow::Continue;
        while let Some(event) = codec.next_frame() {
            let bytes = match event {
                FrameEvent::Packet(bytes) => bytes,
                FrameEvent::KeepAlive => {
                    trace!("keep-alive");
                    continue;
                }
                FrameEvent::Corrupt(e) => {
                    debug!(error = %e, "skipping corrupt frame");
                    continue;
                }
            };

            let message = match parser.parse(&bytes) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    debug!(error = %e, "skipping malformed packet");
                    continue;
                }
            };

            match dispatch(&shared, message) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Reconnect) => {
                    flow = Flow::Reconnect;
                    break;
                }
                Err(e) => {
                    error!(link = %shared.name, error = %e, "response handling failed");
                    shared
                        .events
                        .publish(ConnectionEvent::ConnectionError(e.to_string()));
                }
            }
        }

        if flow == Flow::Reconnect {
            codec.clear();
            match reopen(&shared, shared.config.reconnect_delay()) {
                Some(next) => reader = next,
                None => break,
            }
        }
    }

    debug!(link = %shared.name, "listener stopped");
}

/// Close the transport, wait `delay`, then reopen it. Retries in batches
/// until it succeeds; returns `None` only on shutdown.
fn reopen(shared: &Shared, delay: Duration) -> Option<LinkReader> {
    shared.install_writer(None);
    {
        let mut state = shared.state.lock();
        shared.transition(&mut state, ConnectionState::Disconnected);
    }
    if !shared.sleep_unless_shutdown(delay) {
        return None;
    }

    loop {
        for attempt in 1..=shared.config.reopen_attempts() {
            if shared.is_shutdown() {
                return None;
            }
            match shared.link.open() {
                Ok(halves) => {
                    shared.install_writer(Some(halves.writer));
                    {
                        let mut state = shared.state.lock();
                        state.reconnects += 1;
                        shared.transition(&mut state, ConnectionState::Connected);
                    }
                    info!(link = %shared.name, attempt, "transport reopened");
                    if let Err(e) = shared.send(&Request::GetDeviceInfo) {
                        debug!(error = %e, "attach request after reopen failed");
                    }
                    return Some(halves.reader);
                }
                Err(e) => debug!(link = %shared.name, attempt, error = %e, "reopen failed"),
            }
            if !shared.sleep_unless_shutdown(shared.config.reopen_interval()) {
                return None;
            }
        }

        error!(
            link = %shared.name,
            attempts = shared.config.reopen_attempts(),
            "unable to reopen transport"
        );
        shared.events.publish(ConnectionEvent::ConnectionError(format!(
            "unable to reopen {} after {} attempts",
            shared.name, shared.config.reopen_attempts()
        )));
        if !shared.sleep_unless_shutdown(shared.config.reconnect_delay()) {
            return None;
        }
    }
}

/// Apply one parsed response to the shared state.
pub(crate) fn dispatch(shared: &Shared, message: Message) -> HcomResult<Flow> {
    shared.messages_received.fetch_add(1, Ordering::Relaxed);
    trace!(
        seq = message.packet().sequence_number(),
        response_type = message.response().response_type(),
        "response received"
    );

    let response = message.into_response();
    let action = {
        let mut state = shared.state.lock();
        if !matches!(response, Response::ReconnectRequired(_)) {
            shared.transition(&mut state, ConnectionState::MeadowAttached);
        }
        let action = apply(shared, &mut state, response);
        shared.changed.notify_all();
        action?
    };

    match action {
        Action::None => {}
        Action::Send(request) => {
            shared.send(&request)?;
        }
        Action::Debugger(data) => forward_debugger_data(shared, data),
        Action::Reconnect => return Ok(Flow::Reconnect),
    }
    Ok(Flow::Continue)
}

fn apply(shared: &Shared, state: &mut State, response: Response) -> HcomResult<Action> {
    state.text_list.apply(&response);

    match response {
        Response::DeviceInfo(info) => {
            debug!(fields = info.len(), "device information received");
            state.device_info = Some(info);
        }

        Response::TextListHeader(_) | Response::TextListMember(_) | Response::TextCrcMember(_) => {}

        Response::TextConcluded { request_type } => {
            trace!(request_type, "request concluded");
            state.record_conclusion(request_type);
        }

        Response::TextStdout(text) => publish_message(shared, text, MessageSource::Stdout),
        Response::TextStderr(text) => publish_message(shared, text, MessageSource::Stderr),
        Response::TextInformation(text) => {
            state.record_information(text.clone());
            publish_message(shared, text, MessageSource::Info);
        }
        Response::TextError(text) | Response::TextTrace(text) => {
            publish_message(shared, text, MessageSource::Hcom)
        }
        Response::TextRejected(text) => {
            state.rejection = Some(text.clone());
            publish_message(shared, text, MessageSource::Hcom);
        }
        Response::TextAccepted(text) => debug!(%text, "request accepted"),

        Response::ReconnectRequired(reason) => {
            info!(link = %shared.name, %reason, "device requested reconnect");
            shared.transition(state, ConnectionState::Disconnected);
            return Ok(Action::Reconnect);
        }

        Response::FileWriteInitOk => state.write_init = Some(Ok(())),
        Response::FileWriteInitFailed { last_error } => {
            state.write_init = Some(Err(
                last_error.unwrap_or_else(|| "device refused the file write".to_string())
            ));
        }

        Response::FileReadInitOk => {
            let read = state.read.as_mut().ok_or(HcomError::UnknownFile {
                what: "Read acknowledgement",
            })?;
            match File::create(&read.local_path) {
                Ok(file) => {
                    debug!(file = %read.file_name, path = %read.local_path.display(), "receiving file");
                    read.file = Some(BufWriter::new(file));
                    read.created = true;
                    return Ok(Action::Send(Request::StartFileData));
                }
                Err(e) => {
                    read.outcome = Some(Err(HcomError::local_file(&read.local_path, e)));
                }
            }
        }

        Response::FileReadInitFailed { last_error } => {
            let read = state.read.as_mut().ok_or(HcomError::UnknownFile {
                what: "Read failure",
            })?;
            let text = last_error
                .unwrap_or_else(|| format!("device refused to read {}", read.file_name));
            read.outcome = Some(Err(HcomError::FileTransfer(text)));
        }

        Response::UploadDataPacket(data) => {
            let Some(read) = state.read.as_mut() else {
                return Err(HcomError::UnknownFile { what: "Data" });
            };
            let Some(file) = read.file.as_mut() else {
                return Err(HcomError::UnknownFile { what: "Data" });
            };
            if let Err(e) = file.write_all(&data) {
                read.file = None;
                read.outcome = Some(Err(HcomError::local_file(&read.local_path, e)));
                return Ok(Action::None);
            }
            read.received += data.len() as u64;
            shared.events.publish(ConnectionEvent::FileReadProgress {
                file_name: read.file_name.clone(),
                received: read.received,
            });
        }

        Response::UploadCompleted => {
            let Some(read) = state.read.as_mut() else {
                return Err(HcomError::UnknownFile {
                    what: "File Complete",
                });
            };
            let Some(mut file) = read.file.take() else {
                return Err(HcomError::UnknownFile {
                    what: "File Complete",
                });
            };
            let received = read.received;
            read.outcome = Some(
                file.flush()
                    .map(|()| received)
                    .map_err(|e| HcomError::local_file(&read.local_path, e)),
            );
            drop(file);
            info!(file = %read.file_name, bytes = received, "file read completed");
            shared.events.publish(ConnectionEvent::FileReadCompleted {
                file_name: read.file_name.clone(),
            });
        }

        Response::DebuggingData(data) => return Ok(Action::Debugger(data)),

        Response::Unknown {
            response_type,
            payload,
        } => debug!(response_type, len = payload.len(), "ignoring unrecognised response"),
    }

    Ok(Action::None)
}

fn publish_message(shared: &Shared, message: String, source: MessageSource) {
    trace!(%source, %message, "device message");
    shared
        .events
        .publish(ConnectionEvent::DeviceMessage { message, source });
}

/// Hand device debugger bytes to the attached debugger queue, waiting for
/// room when it is full. The wait ends on shutdown or when the queue is
/// detached or replaced.
fn forward_debugger_data(shared: &Shared, mut data: Bytes) {
    let Some(tx) = shared.debugger.lock().clone() else {
        trace!(len = data.len(), "no debugger attached, dropping data");
        return;
    };
    loop {
        match tx.try_send(data) {
            Ok(()) => return,
            Err(TrySendError::Full(back)) => data = back,
            Err(TrySendError::Closed(_)) => {
                debug!("debugger queue closed");
                let mut current = shared.debugger.lock();
                if current.as_ref().is_some_and(|cur| cur.same_channel(&tx)) {
                    *current = None;
                }
                return;
            }
        }

        if !shared.sleep_unless_shutdown(DEBUGGER_RETRY_INTERVAL) {
            return;
        }
        let attached = shared
            .debugger
            .lock()
            .as_ref()
            .is_some_and(|cur| cur.same_channel(&tx));
        if !attached {
            trace!(len = data.len(), "debugger detached while queue was full");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::connection::FileRead;
    use crate::transport::{DeviceEnd, Link, MemoryLink};
    use hcom_protocol::*;
    use tempfile::TempDir;

    fn shared() -> (Shared, MemoryLink, DeviceEnd) {
        let (link, device) = MemoryLink::pair(Duration::from_millis(10));
        let shared = Shared::new(Box::new(link.clone()), ConnectionConfig::default());
        (shared, link, device)
    }

    fn message(response_type: u16, user_data: u32, payload: &[u8]) -> Message {
        ResponseParser::new().parse_packet(Packet::build(1, response_type, 0, user_data, payload))
    }

    // ========================================================================
    // State Tracking
    // ========================================================================

    #[test]
    fn test_any_response_marks_attached() {
        let (shared, _link, _device) = shared();
        let events = shared.events.subscribe();

        dispatch(&shared, message(RESP_TEXT_STDOUT, 0, b"hello")).unwrap();

        assert_eq!(
            shared.state.lock().connection_state,
            ConnectionState::MeadowAttached
        );
        assert_eq!(shared.messages_received.load(Ordering::Relaxed), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            ConnectionEvent::StateChanged(ConnectionState::MeadowAttached)
        );
        assert_eq!(
            events.try_recv().unwrap(),
            ConnectionEvent::DeviceMessage {
                message: "hello".to_string(),
                source: MessageSource::Stdout
            }
        );
    }

    #[test]
    fn test_device_info_cached() {
        let (shared, _link, _device) = shared();
        dispatch(
            &shared,
            message(RESP_TEXT_DEVICE_INFO, 0, b"name|MeadowF7~version|1.8.0.0~"),
        )
        .unwrap();

        let state = shared.state.lock();
        let info = state.device_info.as_ref().unwrap();
        assert_eq!(info.get("Name"), Some("MeadowF7"));
    }

    #[test]
    fn test_unknown_response_is_ignored() {
        let (shared, _link, _device) = shared();
        let flow = dispatch(&shared, message(0x7F7F, 0, b"future")).unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn test_rejection_recorded() {
        let (shared, _link, _device) = shared();
        dispatch(&shared, message(RESP_TEXT_REJECTED, 0, b"busy")).unwrap();
        assert_eq!(shared.state.lock().rejection.as_deref(), Some("busy"));
    }

    // ========================================================================
    // Reconnect
    // ========================================================================

    #[test]
    fn test_reconnect_required_requests_reopen() {
        let (shared, _link, _device) = shared();
        dispatch(&shared, message(RESP_TEXT_STDOUT, 0, b"up")).unwrap();

        let flow = dispatch(&shared, message(RESP_TEXT_RECONNECT, 0, b"resetting")).unwrap();

        assert_eq!(flow, Flow::Reconnect);
        let state = shared.state.lock();
        assert_eq!(state.connection_state, ConnectionState::Disconnected);
        assert_eq!(state.reconnects, 0);
    }

    #[test]
    fn test_reopen_installs_new_halves_and_requests_info() {
        let (shared, link, mut device) = shared();
        let reader = reopen(&shared, Duration::ZERO);

        assert!(reader.is_some());
        assert_eq!(link.open_count(), 1);
        assert!(shared.has_writer());
        {
            let state = shared.state.lock();
            assert_eq!(state.connection_state, ConnectionState::Connected);
            assert_eq!(state.reconnects, 1);
        }
        let request = device.recv_request(Duration::from_secs(1)).unwrap();
        assert_eq!(request.message_type(), REQ_GET_DEVICE_INFORMATION);
    }

    // ========================================================================
    // File Reads
    // ========================================================================

    #[test]
    fn test_data_without_read_is_unknown_file() {
        let (shared, _link, _device) = shared();
        let err = dispatch(&shared, message(RESP_UPLOAD_DATA_PACKET, 0, b"abc")).unwrap_err();
        assert_eq!(err.to_string(), "Data received for unknown file");
    }

    #[test]
    fn test_completion_without_read_is_unknown_file() {
        let (shared, _link, _device) = shared();
        let err = dispatch(&shared, message(RESP_UPLOAD_COMPLETED, 0, b"")).unwrap_err();
        assert_eq!(err.to_string(), "File Complete received for unknown file");
    }

    #[test]
    fn test_read_ack_opens_file_then_sends_start() {
        let (shared, link, mut device) = shared();
        shared.install_writer(Some(link.open().unwrap().writer));
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.txt");
        shared.state.lock().read = Some(FileRead::new("app.txt", &path));

        dispatch(&shared, message(RESP_FILE_READ_INIT_OK, 0, b"")).unwrap();

        assert!(path.exists());
        let start = device.recv_request(Duration::from_secs(1)).unwrap();
        assert_eq!(start.message_type(), REQ_START_FILE_DATA);
        assert!(device.recv_request(Duration::from_millis(50)).is_none());

        dispatch(&shared, message(RESP_UPLOAD_DATA_PACKET, 0, b"hello ")).unwrap();
        dispatch(&shared, message(RESP_UPLOAD_DATA_PACKET, 0, b"world")).unwrap();
        dispatch(&shared, message(RESP_UPLOAD_COMPLETED, 0, b"")).unwrap();

        let mut state = shared.state.lock();
        let read = state.read.as_mut().unwrap();
        assert!(matches!(read.outcome.take(), Some(Ok(11))));
        drop(state);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello world");
    }

    #[test]
    fn test_read_failure_borrows_last_error() {
        let (shared, _link, _device) = shared();
        let dir = TempDir::new().unwrap();
        shared.state.lock().read = Some(FileRead::new("missing.txt", &dir.path().join("m")));

        let mut parser = ResponseParser::new();
        for (response_type, payload) in [
            (RESP_TEXT_ERROR, &b"file not found"[..]),
            (RESP_FILE_READ_INIT_FAILED, &b""[..]),
        ] {
            let message = parser.parse_packet(Packet::build(1, response_type, 0, 0, payload));
            dispatch(&shared, message).unwrap();
        }

        let mut state = shared.state.lock();
        match state.read.as_mut().unwrap().outcome.take() {
            Some(Err(HcomError::FileTransfer(text))) => assert_eq!(text, "file not found"),
            other => panic!("expected transfer failure, got {:?}", other),
        }
    }

    // ========================================================================
    // Debugger Data
    // ========================================================================

    #[test]
    fn test_debugger_data_forwarded_to_queue() {
        let (shared, _link, _device) = shared();
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        *shared.debugger.lock() = Some(tx);

        dispatch(&shared, message(RESP_DEBUGGING_DATA, 0, &[1, 2, 3])).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(&[1, 2, 3]));
    }

    #[test]
    fn test_full_debugger_queue_gives_up_when_detached() {
        let (shared, _link, _device) = shared();
        let shared = Arc::new(shared);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        *shared.debugger.lock() = Some(tx);
        dispatch(&shared, message(RESP_DEBUGGING_DATA, 0, &[1])).unwrap();

        let blocked = {
            let shared = shared.clone();
            thread::spawn(move || dispatch(&shared, message(RESP_DEBUGGING_DATA, 0, &[2])))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!blocked.is_finished());

        shared.debugger.lock().take();
        blocked.join().unwrap().unwrap();
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(&[1]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_debugger_queue_is_detached() {
        let (shared, _link, _device) = shared();
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        *shared.debugger.lock() = Some(tx);
        drop(rx);

        dispatch(&shared, message(RESP_DEBUGGING_DATA, 0, &[9])).unwrap();

        assert!(shared.debugger.lock().is_none());
    }
}

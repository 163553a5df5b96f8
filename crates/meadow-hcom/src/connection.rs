//! A connection to one device.
//!
//! The listener thread is the only reader of the transport. Callers write
//! requests directly, then wait on a condition variable for the listener to
//! record the response they need. Responses carry no request correlation, so
//! only one multi-frame operation runs at a time; the operation lock
//! enforces that.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::Receiver;
use hcom_protocol::{
    encode_frame, DeviceInfo, FileListEntry, Request, DEFAULT_PARTITION, MAX_CHUNK_SIZE,
    REQ_BULK_FLASH_ERASE, REQ_DELETE_FILE_BY_NAME, REQ_END_FILE_TRANSFER,
    REQ_VERIFY_ERASED_FLASH,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::cancel::CancellationToken;
use crate::config::ConnectionConfig;
use crate::error::{HcomError, HcomResult};
use crate::events::{ConnectionEvent, ConnectionState, EventBus};
use crate::listener;
use crate::text_list::TextListAccumulator;
use crate::transport::{Link, LinkWriter};

/// How often waiters re-check cancellation and shutdown.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default time an operation waits for the device.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_BACKLOG: usize = 32;

// ============================================================================
// Operation Options
// ============================================================================

/// Per-call options for device operations.
#[derive(Debug, Clone)]
pub struct OperationOptions {
    /// How long to wait for the device.
    pub timeout: Duration,
    /// Token checked while waiting.
    pub cancel: CancellationToken,
    /// Partition used by file operations.
    pub partition: u16,
}

impl Default for OperationOptions {
    fn default() -> Self {
        OperationOptions {
            timeout: DEFAULT_OPERATION_TIMEOUT,
            cancel: CancellationToken::new(),
            partition: DEFAULT_PARTITION,
        }
    }
}

impl OperationOptions {
    /// Options with the given timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        OperationOptions {
            timeout,
            ..Default::default()
        }
    }

    /// Use `token` for cancellation.
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Target a partition other than the default.
    pub fn on_partition(mut self, partition: u16) -> Self {
        self.partition = partition;
        self
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// A file read in progress.
#[derive(Debug)]
pub(crate) struct FileRead {
    pub(crate) file_name: String,
    pub(crate) local_path: PathBuf,
    pub(crate) file: Option<BufWriter<File>>,
    pub(crate) created: bool,
    pub(crate) received: u64,
    pub(crate) outcome: Option<HcomResult<u64>>,
}

impl FileRead {
    pub(crate) fn new(file_name: &str, local_path: &Path) -> Self {
        FileRead {
            file_name: file_name.to_string(),
            local_path: local_path.to_path_buf(),
            file: None,
            created: false,
            received: 0,
            outcome: None,
        }
    }
}

/// State written by the listener and read by waiting callers.
#[derive(Debug)]
pub(crate) struct State {
    pub(crate) connection_state: ConnectionState,
    pub(crate) device_info: Option<DeviceInfo>,
    pub(crate) text_list: TextListAccumulator,
    pub(crate) read: Option<FileRead>,
    pub(crate) write_init: Option<Result<(), String>>,
    pub(crate) concluded: VecDeque<u16>,
    pub(crate) rejection: Option<String>,
    pub(crate) information: VecDeque<String>,
    /// Successful transport reopens, planned or not.
    pub(crate) reconnects: u64,
}

impl State {
    fn new() -> Self {
        State {
            connection_state: ConnectionState::Disconnected,
            device_info: None,
            text_list: TextListAccumulator::new(),
            read: None,
            write_init: None,
            concluded: VecDeque::new(),
            rejection: None,
            information: VecDeque::new(),
            reconnects: 0,
        }
    }

    pub(crate) fn record_conclusion(&mut self, request_type: u16) {
        if self.concluded.len() == MAX_BACKLOG {
            self.concluded.pop_front();
        }
        self.concluded.push_back(request_type);
    }

    pub(crate) fn record_information(&mut self, text: String) {
        if self.information.len() == MAX_BACKLOG {
            self.information.pop_front();
        }
        self.information.push_back(text);
    }

    fn prepare_conclusion(&mut self, request_type: u16) {
        self.concluded.retain(|&t| t != request_type);
        self.rejection = None;
    }

    fn take_conclusion(&mut self, request_type: u16) -> Option<HcomResult<()>> {
        if let Some(pos) = self.concluded.iter().position(|&t| t == request_type) {
            self.concluded.remove(pos);
            return Some(Ok(()));
        }
        self.rejection.take().map(|text| Err(HcomError::Rejected(text)))
    }
}

/// Everything the listener thread and callers share.
pub(crate) struct Shared {
    pub(crate) link: Box<dyn Link>,
    pub(crate) config: ConnectionConfig,
    pub(crate) name: String,
    writer: Mutex<Option<LinkWriter>>,
    sequence: AtomicU16,
    pub(crate) state: Mutex<State>,
    pub(crate) changed: Condvar,
    pub(crate) events: EventBus,
    pub(crate) debugger: Mutex<Option<mpsc::Sender<Bytes>>>,
    shutdown: AtomicBool,
    pub(crate) messages_received: AtomicU64,
}

impl Shared {
    pub(crate) fn new(link: Box<dyn Link>, config: ConnectionConfig) -> Self {
        let name = link.name();
        Shared {
            link,
            config,
            name,
            writer: Mutex::new(None),
            sequence: AtomicU16::new(1),
            state: Mutex::new(State::new()),
            changed: Condvar::new(),
            events: EventBus::default(),
            debugger: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            messages_received: AtomicU64::new(0),
        }
    }

    /// Frame and write a request. Returns the sequence number used.
    pub(crate) fn send(&self, request: &Request) -> HcomResult<u16> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let packet = request.encode(seq)?;
        let frame = encode_frame(packet.as_bytes());

        let mut writer = self.writer.lock();
        let writer = writer.as_mut().ok_or(HcomError::NotAttached)?;
        writer.write_all(&frame)?;
        writer.flush()?;

        trace!(
            seq,
            request_type = request.request_type(),
            len = frame.len(),
            "request sent"
        );
        Ok(seq)
    }

    pub(crate) fn install_writer(&self, writer: Option<LinkWriter>) {
        *self.writer.lock() = writer;
    }

    pub(crate) fn has_writer(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Move to `next`, publishing the change. The caller holds the state lock.
    pub(crate) fn transition(&self, state: &mut State, next: ConnectionState) {
        if state.connection_state != next {
            debug!(link = %self.name, from = ?state.connection_state, to = ?next, "state changed");
            state.connection_state = next;
            self.events.publish(ConnectionEvent::StateChanged(next));
            self.changed.notify_all();
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` in short slices. Returns false if shutdown was
    /// requested meanwhile.
    pub(crate) fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_shutdown() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A connection to one device over one [`Link`].
///
/// Dropping the connection stops the listener and closes the transport.
pub struct Connection {
    shared: Arc<Shared>,
    listener: Mutex<Option<JoinHandle<()>>>,
    operation: Mutex<()>,
}

impl Connection {
    /// Create a connection. The transport is not opened until [`Connection::open`]
    /// or [`Connection::attach`].
    pub fn new(link: Box<dyn Link>, config: ConnectionConfig) -> Self {
        Connection {
            shared: Arc::new(Shared::new(link, config)),
            listener: Mutex::new(None),
            operation: Mutex::new(()),
        }
    }

    /// Name of the underlying link.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.lock().connection_state
    }

    /// Device information from the last device-info response.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.shared.state.lock().device_info.clone()
    }

    /// Responses parsed since the connection was created.
    pub fn messages_received(&self) -> u64 {
        self.shared.messages_received.load(Ordering::Relaxed)
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Open the transport and start the listener. Does nothing if the listener
    /// is already running.
    pub fn open(&self) -> HcomResult<()> {
        let mut listener = self.listener.lock();
        if listener.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        self.shared.shutdown.store(false, Ordering::SeqCst);
        let halves = self.shared.link.open()?;
        self.shared.install_writer(Some(halves.writer));
        {
            let mut state = self.shared.state.lock();
            self.shared.transition(&mut state, ConnectionState::Connected);
        }

        *listener = Some(listener::spawn(self.shared.clone(), halves.reader)?);
        info!(link = %self.shared.name, "connection opened");
        Ok(())
    }

    /// Open the transport and wait until the device answers.
    pub fn attach(&self, opts: &OperationOptions) -> HcomResult<()> {
        self.open()?;
        match self.shared.send(&Request::GetDeviceInfo) {
            Ok(_) => {}
            Err(HcomError::NotAttached) => debug!("transport reopening, waiting for device"),
            Err(e) => return Err(e),
        }
        self.wait_for_attach(opts)
    }

    /// Wait until a device response has been seen on the open transport.
    pub fn wait_for_attach(&self, opts: &OperationOptions) -> HcomResult<()> {
        self.wait_until(opts, "device to attach", |state| {
            (state.connection_state == ConnectionState::MeadowAttached).then_some(())
        })
    }

    /// Write a request without waiting for a response. Returns the sequence
    /// number used.
    pub fn enqueue_request(&self, request: &Request) -> HcomResult<u16> {
        self.shared.send(request)
    }

    /// Request and return the device information.
    pub fn get_device_info(&self, opts: &OperationOptions) -> HcomResult<DeviceInfo> {
        let _op = self.begin(opts)?;
        self.shared.state.lock().device_info = None;
        self.shared.send(&Request::GetDeviceInfo)?;
        self.wait_until(opts, "device information", |state| {
            state.device_info.clone()
        })
    }

    /// List the files on `opts.partition`.
    pub fn get_file_list(
        &self,
        include_crcs: bool,
        opts: &OperationOptions,
    ) -> HcomResult<Vec<FileListEntry>> {
        let _op = self.begin(opts)?;
        let request = Request::ListFiles {
            partition: opts.partition,
            include_crcs,
        };
        {
            let mut state = self.shared.state.lock();
            state.text_list.expect(request.request_type());
            state.rejection = None;
        }

        let result = self.shared.send(&request).and_then(|_| {
            self.wait_until(opts, "file list", |state| {
                if state.text_list.is_complete() {
                    return Some(Ok(state.text_list.take_entries()));
                }
                state
                    .rejection
                    .take()
                    .map(|text| Err(HcomError::Rejected(text)))
            })?
        });

        match result {
            Ok(entries) => Ok(entries.iter().map(|e| FileListEntry::parse(e)).collect()),
            Err(e) => {
                self.shared.state.lock().text_list.reset();
                Err(e)
            }
        }
    }

    /// Write a local file to the device. The device file name defaults to the
    /// local file name.
    pub fn write_file(
        &self,
        local_path: &Path,
        file_name: Option<&str>,
        opts: &OperationOptions,
    ) -> HcomResult<()> {
        let data = fs::read(local_path).map_err(|e| HcomError::local_file(local_path, e))?;
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    HcomError::local_file(
                        local_path,
                        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
                    )
                })?,
        };
        self.write_file_bytes(&file_name, Bytes::from(data), opts)
    }

    /// Write `data` to the device as `file_name`.
    pub fn write_file_bytes(
        &self,
        file_name: &str,
        data: Bytes,
        opts: &OperationOptions,
    ) -> HcomResult<()> {
        let file_size = u32::try_from(data.len()).map_err(|_| {
            HcomError::FileTransfer(format!("{} is too large to transfer", file_name))
        })?;
        let crc = crc32fast::hash(&data);

        let _op = self.begin(opts)?;
        {
            let mut state = self.shared.state.lock();
            state.write_init = None;
            state.prepare_conclusion(REQ_END_FILE_TRANSFER);
        }

        self.shared.send(&Request::InitFileWrite {
            partition: opts.partition,
            file_name: file_name.to_string(),
            file_size,
            crc,
            flash_address: 0,
        })?;
        debug!(file = file_name, size = file_size, crc, "file write requested");

        let result = self.send_file_body(file_name, &data, opts);
        if let Err(e) = &result {
            if matches!(e, HcomError::Cancelled | HcomError::Timeout { .. }) {
                if let Err(end) = self.shared.send(&Request::EndFileTransfer) {
                    debug!(error = %end, "could not end abandoned file write");
                }
            }
        }
        result
    }

    fn send_file_body(&self, file_name: &str, data: &Bytes, opts: &OperationOptions) -> HcomResult<()> {
        self.wait_until(opts, "file write to start", |state| state.write_init.take())?
            .map_err(HcomError::FileTransfer)?;

        let total = data.len() as u64;
        let mut offset = 0;
        while offset < data.len() {
            if opts.cancel.is_cancelled() {
                return Err(HcomError::Cancelled);
            }
            let end = (offset + MAX_CHUNK_SIZE).min(data.len());
            self.shared.send(&Request::FileData {
                data: data.slice(offset..end),
            })?;
            offset = end;

            self.shared.events.publish(ConnectionEvent::FileWriteProgress {
                file_name: file_name.to_string(),
                completed: offset as u64,
                total,
            });
        }

        self.shared.send(&Request::EndFileTransfer)?;
        self.wait_for_conclusion(REQ_END_FILE_TRANSFER, "file write to finish", opts)?;
        info!(file = file_name, bytes = total, "file written");
        Ok(())
    }

    /// Read `file_name` from the device into `local_path`. Returns the number
    /// of bytes received.
    pub fn read_file(
        &self,
        file_name: &str,
        local_path: &Path,
        opts: &OperationOptions,
    ) -> HcomResult<u64> {
        let _op = self.begin(opts)?;
        self.shared.state.lock().read = Some(FileRead::new(file_name, local_path));

        let result = self
            .shared
            .send(&Request::InitFileRead {
                partition: opts.partition,
                file_name: file_name.to_string(),
            })
            .and_then(|_| {
                self.wait_until(opts, "file read", |state| {
                    state.read.as_mut().and_then(|read| read.outcome.take())
                })
            });

        let finished = self.shared.state.lock().read.take();
        let outcome = result.and_then(|outcome| outcome);
        if outcome.is_err() {
            if let Some(read) = finished.filter(|read| read.created) {
                debug!(file = %read.file_name, "removing partial local file");
                drop(read.file);
                if let Err(e) = fs::remove_file(&read.local_path) {
                    debug!(error = %e, "could not remove partial local file");
                }
            }
        }
        outcome
    }

    /// Delete a file from `opts.partition`.
    pub fn delete_file(&self, file_name: &str, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.request_and_conclude(
            Request::DeleteFile {
                partition: opts.partition,
                file_name: file_name.to_string(),
            },
            REQ_DELETE_FILE_BY_NAME,
            "file deletion",
            opts,
        )
    }

    /// Erase the whole external flash.
    pub fn erase_flash(&self, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.request_and_conclude(Request::BulkFlashErase, REQ_BULK_FLASH_ERASE, "flash erase", opts)
    }

    /// Ask the device to verify that the flash is erased.
    pub fn verify_erased_flash(&self, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.request_and_conclude(
            Request::VerifyErasedFlash,
            REQ_VERIFY_ERASED_FLASH,
            "flash verification",
            opts,
        )
    }

    /// Enable the managed runtime and wait for the device to come back.
    pub fn runtime_enable(&self, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.request_and_reattach(Request::RuntimeEnable, opts)
    }

    /// Disable the managed runtime and wait for the device to come back.
    pub fn runtime_disable(&self, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.request_and_reattach(Request::RuntimeDisable, opts)
    }

    /// Whether the managed runtime is enabled.
    pub fn runtime_state(&self, opts: &OperationOptions) -> HcomResult<bool> {
        let _op = self.begin(opts)?;
        self.shared.state.lock().information.clear();
        self.shared.send(&Request::RuntimeState)?;
        self.wait_until(opts, "runtime state", |state| {
            state
                .information
                .iter()
                .find_map(|line| parse_runtime_state(line))
        })
    }

    /// Restart the device and wait for it to come back.
    pub fn reset_device(&self, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.request_and_reattach(Request::ResetDevice, opts)
    }

    /// Reboot into the DFU bootloader. The device stops speaking HCOM.
    pub fn enter_dfu_mode(&self, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.shared.send(&Request::EnterDfuMode)?;
        Ok(())
    }

    /// Change the OS trace level.
    pub fn set_trace_level(&self, level: u32, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.shared.send(&Request::ChangeTraceLevel { level })?;
        Ok(())
    }

    /// Turn trace forwarding to the host on or off.
    pub fn trace_to_host(&self, enabled: bool, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.shared.send(&Request::TraceToHost { enabled })?;
        Ok(())
    }

    /// Turn trace mirroring to the debug UART on or off.
    pub fn trace_to_uart(&self, enabled: bool, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.shared.send(&Request::TraceToUart { enabled })?;
        Ok(())
    }

    /// Set a developer parameter.
    pub fn set_developer_parameter(
        &self,
        parameter: u16,
        value: u32,
        opts: &OperationOptions,
    ) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.shared
            .send(&Request::DeveloperParameter { parameter, value })?;
        Ok(())
    }

    /// Put the device into debugging mode on `port` and wait for it to come
    /// back.
    pub fn start_debugging_session(&self, port: u16, opts: &OperationOptions) -> HcomResult<()> {
        let _op = self.begin(opts)?;
        self.request_and_reattach(
            Request::StartDebuggingSession {
                port: u32::from(port),
            },
            opts,
        )
    }

    /// Send debugger bytes to the device, chunked to packet size.
    pub fn send_debugger_data(&self, data: &[u8]) -> HcomResult<()> {
        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            self.shared.send(&Request::DebuggerData {
                data: Bytes::copy_from_slice(chunk),
            })?;
        }
        Ok(())
    }

    /// Route device debugger data into a new bounded queue. Replaces any
    /// previous queue. When the queue is full the listener waits.
    pub fn attach_debugger(&self) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(self.shared.config.debugger_queue_capacity());
        *self.shared.debugger.lock() = Some(tx);
        rx
    }

    /// Stop routing device debugger data.
    pub fn detach_debugger(&self) {
        self.shared.debugger.lock().take();
    }

    /// Stop the listener and close the transport.
    pub fn close(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.detach_debugger();

        if let Some(handle) = self.listener.lock().take() {
            if handle.join().is_err() {
                warn!(link = %self.shared.name, "listener thread panicked");
            }
            info!(link = %self.shared.name, "connection closed");
        }

        self.shared.install_writer(None);
        let mut state = self.shared.state.lock();
        state.read = None;
        self.shared
            .transition(&mut state, ConnectionState::Disconnected);
    }

    // ------------------------------------------------------------------------

    /// Take the operation lock, waiting no longer than the operation allows.
    fn begin(&self, opts: &OperationOptions) -> HcomResult<MutexGuard<'_, ()>> {
        let deadline = Instant::now() + opts.timeout;
        loop {
            if let Some(guard) = self.operation.try_lock_for(POLL_INTERVAL) {
                return Ok(guard);
            }
            if opts.cancel.is_cancelled() {
                return Err(HcomError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(HcomError::Timeout {
                    waited: opts.timeout,
                    waiting_for: "another operation to finish",
                });
            }
        }
    }

    /// Wait until `check` yields a value, the deadline passes or the caller
    /// cancels. `check` runs under the state lock after every change.
    fn wait_until<T>(
        &self,
        opts: &OperationOptions,
        waiting_for: &'static str,
        mut check: impl FnMut(&mut State) -> Option<T>,
    ) -> HcomResult<T> {
        let deadline = Instant::now() + opts.timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(value) = check(&mut *state) {
                return Ok(value);
            }
            if opts.cancel.is_cancelled() {
                return Err(HcomError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(HcomError::Timeout {
                    waited: opts.timeout,
                    waiting_for,
                });
            }
            self.shared
                .changed
                .wait_for(&mut state, (deadline - now).min(POLL_INTERVAL));
        }
    }

    fn wait_for_conclusion(
        &self,
        request_type: u16,
        waiting_for: &'static str,
        opts: &OperationOptions,
    ) -> HcomResult<()> {
        self.wait_until(opts, waiting_for, |state| state.take_conclusion(request_type))?
    }

    fn request_and_conclude(
        &self,
        request: Request,
        request_type: u16,
        waiting_for: &'static str,
        opts: &OperationOptions,
    ) -> HcomResult<()> {
        self.shared.state.lock().prepare_conclusion(request_type);
        self.shared.send(&request)?;
        self.wait_for_conclusion(request_type, waiting_for, opts)
    }

    /// Send a request after which the device resets, then wait for the
    /// transport to be reopened and the device to answer again. The reset may
    /// be announced with ReconnectRequired or show up as a dropped link.
    fn request_and_reattach(&self, request: Request, opts: &OperationOptions) -> HcomResult<()> {
        let before = self.shared.state.lock().reconnects;
        self.shared.send(&request)?;
        self.wait_until(opts, "device to reset and reattach", |state| {
            (state.reconnects > before
                && state.connection_state == ConnectionState::MeadowAttached)
                .then_some(())
        })
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("link", &self.shared.name)
            .field("state", &self.state())
            .field("open", &self.shared.has_writer())
            .finish()
    }
}

/// Interpret an information line reporting the runtime state.
fn parse_runtime_state(line: &str) -> Option<bool> {
    let line = line.to_ascii_lowercase();
    if line.contains("disabled") {
        Some(false)
    } else if line.contains("enabled") {
        Some(true)
    } else {
        None
    }
}
